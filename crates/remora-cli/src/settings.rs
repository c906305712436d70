//! Configuration loading with deep merge and environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ConnectOptions::default()`]
//! 2. If `~/.remora/config.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides
//!
//! Command-line flags are applied on top by `main`, so the full precedence
//! is flags > env > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use remora_client::ConnectOptions;

/// Resolve the path to the config file (`~/.remora/config.json`).
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".remora").join("config.json")
}

/// Load options from the default path with env overrides.
pub fn load_options() -> Result<ConnectOptions> {
    load_options_from_path(&config_path())
}

/// Load options from a specific path with env overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_options_from_path(path: &Path) -> Result<ConnectOptions> {
    let defaults = serde_json::to_value(ConnectOptions::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading config file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let user: Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "config file not found, using defaults");
        defaults
    };

    let mut options: ConnectOptions = serde_json::from_value(merged)?;
    apply_env_overrides(&mut options);
    Ok(options)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded options.
///
/// Invalid or out-of-range values are silently ignored, falling back to
/// the file/default value.
pub fn apply_env_overrides(options: &mut ConnectOptions) {
    if let Some(v) = read_env_string("REMORA_URL") {
        options.url = v;
    }
    if let Some(v) = read_env_string("REMORA_PASSWORD") {
        options.password = Some(v);
    }
    if let Some(v) = read_env_u64("REMORA_TIMEOUT_MS", 1, 3_600_000) {
        options.call_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("REMORA_CONNECT_TIMEOUT_MS", 1, 3_600_000) {
        options.connect_timeout_ms = v;
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_u64_in_range(&v, min, max))
}

fn parse_u64_in_range(value: &str, min: u64, max: u64) -> Option<u64> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let options = load_options_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(options.url, ConnectOptions::default().url);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"url": "ws://studio:4455", "callTimeoutMs": 5000}}"#
        )
        .unwrap();

        let options = load_options_from_path(&path).unwrap();
        assert_eq!(options.url, "ws://studio:4455");
        assert_eq!(options.call_timeout_ms, 5000);
        // Untouched fields keep their defaults.
        assert_eq!(
            options.connect_timeout_ms,
            ConnectOptions::default().connect_timeout_ms
        );
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_options_from_path(&path).is_err());
    }

    #[test]
    fn deep_merge_recurses_into_objects() {
        let target = json!({"a": {"x": 1, "y": 2}, "b": 3});
        let source = json!({"a": {"y": 20}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"a": {"x": 1, "y": 20}, "b": 3}));
    }

    #[test]
    fn deep_merge_skips_nulls() {
        let target = json!({"a": 1});
        let source = json!({"a": null, "b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let target = json!({"a": [1, 2, 3]});
        let source = json!({"a": [9]});
        assert_eq!(deep_merge(target, source), json!({"a": [9]}));
    }

    #[test]
    fn parse_u64_respects_range() {
        assert_eq!(parse_u64_in_range("5000", 1, 10_000), Some(5000));
        assert_eq!(parse_u64_in_range(" 42 ", 1, 100), Some(42));
        assert_eq!(parse_u64_in_range("0", 1, 100), None);
        assert_eq!(parse_u64_in_range("101", 1, 100), None);
        assert_eq!(parse_u64_in_range("abc", 1, 100), None);
        assert_eq!(parse_u64_in_range("", 1, 100), None);
    }
}
