//! Service Configuration Module
//!
//! Operator-tunable settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `NTRP_CONFIG` environment variable (path to TOML file)
//! 2. `ntrp_config.toml` in the current working directory
//! 3. Built-in defaults from [`defaults`]
//!
//! The loaded [`AppConfig`] is wrapped in an `Arc` at startup and handed to
//! every component that needs it.

mod app_config;
pub mod defaults;
pub mod validation;

pub use app_config::*;
