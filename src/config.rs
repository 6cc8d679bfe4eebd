use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "MedVision";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Square input side length shared by all three diagnostic models.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Smallest accepted upload edge, in pixels. Smaller chest X-rays were
/// rejected as unreadable; the other domains inherit the same floor.
pub const DEFAULT_MIN_DIMENSION: u32 = 100;

/// Manifest of the general-purpose classifier used when a domain model is missing.
pub const DEFAULT_FALLBACK_MODEL_PATH: &str = "/models/generic/model.json";

const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 20;

/// Debug builds log pipeline internals by default.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// `EnvFilter` directive used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if is_dev() {
        "medvision=debug"
    } else {
        "medvision=info"
    }
}

/// Get the application data directory (~/MedVision/).
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

// ═══════════════════════════════════════════════════════════
// InferenceConfig
// ═══════════════════════════════════════════════════════════

/// Runtime configuration of the diagnostic pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceConfig {
    /// Root the `/models/...` asset paths are resolved against. An
    /// `http://` or `https://` prefix selects HTTP; anything else is a directory.
    pub asset_base: String,
    pub fallback_model_path: String,
    pub input_size: u32,
    pub min_dimension: u32,
    pub max_input_dimension: u32,
    pub load_timeout_secs: u64,
    pub inference_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            asset_base: app_data_dir().display().to_string(),
            fallback_model_path: DEFAULT_FALLBACK_MODEL_PATH.to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            min_dimension: DEFAULT_MIN_DIMENSION,
            max_input_dimension: 2048,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
            inference_timeout_secs: DEFAULT_INFERENCE_TIMEOUT_SECS,
        }
    }
}

impl InferenceConfig {
    /// Defaults overridden by environment variables:
    ///
    /// - `MEDVISION_ASSET_BASE`
    /// - `MEDVISION_FALLBACK_MODEL`
    /// - `MEDVISION_MIN_DIMENSION`
    /// - `MEDVISION_LOAD_TIMEOUT_SECS`
    /// - `MEDVISION_INFERENCE_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(base) = lookup("MEDVISION_ASSET_BASE").filter(|v| !v.trim().is_empty()) {
            config.asset_base = base.trim().to_string();
        }
        if let Some(path) = lookup("MEDVISION_FALLBACK_MODEL").filter(|v| !v.trim().is_empty()) {
            config.fallback_model_path = path.trim().to_string();
        }
        if let Some(v) = parse_var(&lookup, "MEDVISION_MIN_DIMENSION") {
            config.min_dimension = v as u32;
        }
        if let Some(v) = parse_var(&lookup, "MEDVISION_LOAD_TIMEOUT_SECS") {
            config.load_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "MEDVISION_INFERENCE_TIMEOUT_SECS") {
            config.inference_timeout_secs = v;
        }

        config
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn uses_http(&self) -> bool {
        self.asset_base.starts_with("http://") || self.asset_base.starts_with("https://")
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 && v <= u32::MAX as u64 => Some(v),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid numeric setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_name_is_medvision() {
        assert_eq!(APP_NAME, "MedVision");
        assert!(app_data_dir().ends_with(APP_NAME));
    }

    #[test]
    fn defaults() {
        let config = InferenceConfig::default();
        assert_eq!(config.input_size, 224);
        assert_eq!(config.min_dimension, 100);
        assert_eq!(config.fallback_model_path, "/models/generic/model.json");
        assert_eq!(config.load_timeout(), Duration::from_secs(30));
        assert!(!config.uses_http());
    }

    #[test]
    fn env_overrides() {
        let config = InferenceConfig::from_lookup(lookup_from(&[
            ("MEDVISION_ASSET_BASE", "https://assets.example.org"),
            ("MEDVISION_MIN_DIMENSION", "64"),
            ("MEDVISION_LOAD_TIMEOUT_SECS", "5"),
            ("MEDVISION_INFERENCE_TIMEOUT_SECS", "3"),
            ("MEDVISION_FALLBACK_MODEL", "/models/mobilenet/model.json"),
        ]));
        assert_eq!(config.asset_base, "https://assets.example.org");
        assert!(config.uses_http());
        assert_eq!(config.min_dimension, 64);
        assert_eq!(config.load_timeout(), Duration::from_secs(5));
        assert_eq!(config.inference_timeout(), Duration::from_secs(3));
        assert_eq!(config.fallback_model_path, "/models/mobilenet/model.json");
    }

    #[test]
    fn invalid_numbers_keep_defaults() {
        let config = InferenceConfig::from_lookup(lookup_from(&[
            ("MEDVISION_MIN_DIMENSION", "tiny"),
            ("MEDVISION_LOAD_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(config.min_dimension, DEFAULT_MIN_DIMENSION);
        assert_eq!(config.load_timeout_secs, DEFAULT_LOAD_TIMEOUT_SECS);
    }

    #[test]
    fn blank_asset_base_is_ignored() {
        let config = InferenceConfig::from_lookup(lookup_from(&[("MEDVISION_ASSET_BASE", "  ")]));
        assert_eq!(config.asset_base, InferenceConfig::default().asset_base);
    }

    #[test]
    fn default_filter_targets_crate() {
        assert!(default_log_filter().starts_with("medvision="));
    }
}
