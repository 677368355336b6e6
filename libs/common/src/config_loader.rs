//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`<PREFIX>_SECTION__KEY`)
//! 2. Config file (YAML, TOML or JSON by extension)
//! 3. Default values of the target type

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to load configuration: {0}")]
    Extract(#[from] Box<figment::Error>),
}

/// Pick the config file to load.
///
/// An explicit path always wins (and must exist when loaded); otherwise the
/// default path is used only if it exists.
pub fn resolve_config_path(explicit: Option<&Path>, default: &Path) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None if default.exists() => Some(default.to_path_buf()),
        None => None,
    }
}

/// Build the figment for `T`: defaults, then `file`, then env vars with `env_prefix`
pub fn build_figment<T>(file: Option<&Path>, env_prefix: &str) -> Result<Figment, ConfigLoadError>
where
    T: Serialize + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if let Some(path) = file {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        figment = match extension {
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            "toml" => figment.merge(Toml::file(path)),
            "json" => figment.merge(Json::file(path)),
            other => return Err(ConfigLoadError::UnsupportedFormat(other.to_string())),
        };
        info!("Config file: {}", path.display());
    } else {
        debug!("No config file, using defaults and environment");
    }

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load `T` from defaults, an optional file and the environment
pub fn load_layered<T>(file: Option<&Path>, env_prefix: &str) -> Result<T, ConfigLoadError>
where
    T: Serialize + DeserializeOwned + Default,
{
    build_figment::<T>(file, env_prefix)?
        .extract()
        .map_err(|e| ConfigLoadError::Extract(Box::new(e)))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        port: u16,
        inner: Inner,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Inner {
        interval_ms: u64,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "sample".to_string(),
                port: 8000,
                inner: Inner { interval_ms: 1000 },
            }
        }
    }

    #[test]
    fn test_defaults_only() {
        let cfg: Sample = load_layered(None, "CFGLOADER_DEFAULTS_").unwrap();
        assert_eq!(cfg, Sample::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "port: 9000\ninner:\n  interval_ms: 5").unwrap();

        let cfg: Sample = load_layered(Some(&path), "CFGLOADER_FILE_").unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.inner.interval_ms, 5);
        assert_eq!(cfg.name, "sample");
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_layered::<Sample>(Some(Path::new("/nonexistent/x.yaml")), "X_").unwrap_err();
        assert!(matches!(err, ConfigLoadError::NotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.ini");
        std::fs::write(&path, "port=1").unwrap();
        let err = load_layered::<Sample>(Some(&path), "X_").unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_resolve_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let default = dir.path().join("default.yaml");
        assert_eq!(resolve_config_path(None, &default), None);

        std::fs::write(&default, "port: 1").unwrap();
        assert_eq!(resolve_config_path(None, &default), Some(default.clone()));

        let explicit = Path::new("other.yaml");
        assert_eq!(
            resolve_config_path(Some(explicit), &default),
            Some(PathBuf::from("other.yaml"))
        );
    }
}
