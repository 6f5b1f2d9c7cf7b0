//! Unknown-key detection for `ntrp_config.toml`.
//!
//! The raw document is parsed into a `toml::Value` first and every dotted key
//! path is compared against the fields `AppConfig` actually has. Unknown keys
//! become warnings with a "did you mean" hint; serde then ignores them, so a
//! typo never stops the service from starting.

use std::collections::HashSet;

/// A config key that `AppConfig` does not recognise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey {
    pub key: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for UnknownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown config key '{}'", self.key)?;
        if let Some(s) = &self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Keys
// ============================================================================

/// Every valid dotted key path of `AppConfig`.
///
/// Kept by hand next to `app_config.rs`; a field added there belongs here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    [
        "server",
        "server.addr",
        "server.upload_dir",
        "server.max_upload_bytes",
        "server.request_timeout_secs",
        "analysis",
        "analysis.strategy",
        "sampling",
        "sampling.stride",
        "sampling.min_confidence",
        "sampling.model_path",
        "sampling.ffmpeg_path",
        "sampling.ffprobe_path",
        "sampling.intra_threads",
        "evidence",
        "evidence.max_frames",
        "evidence.precision",
        "remote",
        "remote.poll_interval_secs",
        "remote.processing_timeout_secs",
        "reasoning",
        "reasoning.base_url",
        "reasoning.upload_base_url",
        "reasoning.model",
        "reasoning.api_key_env",
        "reasoning.request_timeout_secs",
        "reasoning.json_response",
        "reasoning.temperature",
    ]
    .into_iter()
    .collect()
}

/// Collect the dotted path of every key in a TOML tree, tables included.
///
/// `{ a = { b = 1 } }` yields `["a", "a.b"]`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let Some(table) = value.as_table() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(table.len());
    for (name, child) in table {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        if child.is_table() {
            let nested = walk_toml_keys(child, &path);
            out.push(path);
            out.extend(nested);
        } else {
            out.push(path);
        }
    }
    out
}

// ============================================================================
// Suggestions
// ============================================================================

/// Edit distance between two strings, counted in chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitute = diag + usize::from(ca != cb);
            row[j + 1] = substitute.min(above + 1).min(row[j] + 1);
            diag = above;
        }
    }
    row[b.len()]
}

/// Closest known key within edit distance 3. Ties go to the lexically smaller key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), *k))
        .filter(|(d, _)| *d <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

/// Report keys in `raw_toml` that `AppConfig` would ignore.
///
/// Syntax errors yield no warnings; the serde pass reports those.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<UnknownKey> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };
    let known = known_config_keys();

    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|k| !known.contains(k.as_str()))
        .map(|key| {
            let suggestion = suggest_correction(&key, &known);
            UnknownKey { key, suggestion }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("stride", "stride"), 0);
        assert_eq!(levenshtein("strid", "stride"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_walk_nested_tables() {
        let v: toml::Value = "[sampling]\nstride = 3\n".parse().unwrap();
        let keys = walk_toml_keys(&v, "");
        assert_eq!(keys, vec!["sampling".to_string(), "sampling.stride".to_string()]);
    }

    #[test]
    fn test_typo_gets_suggestion() {
        let warnings = validate_unknown_keys("[sampling]\nmin_confidance = 0.4\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].key, "sampling.min_confidance");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("sampling.min_confidence")
        );
        assert!(warnings[0].to_string().contains("did you mean"));
    }

    #[test]
    fn test_valid_document_has_no_warnings() {
        let doc = r#"
[server]
addr = "127.0.0.1:5001"

[remote]
poll_interval_secs = 5

[reasoning]
model = "gemini-2.5-flash"
"#;
        assert!(validate_unknown_keys(doc).is_empty());
    }

    #[test]
    fn test_unknown_section_without_close_match() {
        let warnings = validate_unknown_keys("[telemetry_exporter]\nendpoint = \"x\"\n");
        assert!(warnings.iter().any(|w| w.key == "telemetry_exporter"));
        assert!(warnings.iter().all(|w| w.suggestion.is_none()));
    }

    #[test]
    fn test_broken_toml_yields_nothing() {
        assert!(validate_unknown_keys("[sampling\nstride = ").is_empty());
    }
}
