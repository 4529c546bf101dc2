use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

pub const CONFIG_FILE: &str = "schoold.toml";
pub const DEFAULT_ROLL_PREFIX: &str = "KS";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchoolSection {
    pub roll_prefix: String,
}

impl Default for SchoolSection {
    fn default() -> Self {
        Self {
            roll_prefix: DEFAULT_ROLL_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchoolConfig {
    pub remote: RemoteConfig,
    pub school: SchoolSection,
}

impl SchoolConfig {
    pub fn from_toml_str(text: &str, path: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn read_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.is_file() {
            return Ok(None);
        }
        let display = path.to_string_lossy().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml_str(&text, &display).map(Some)
    }

    /// Workspace config file, then environment overrides. A broken file is
    /// reported and ignored.
    pub fn load(workspace: &Path) -> Self {
        let mut cfg = match Self::read_file(&workspace.join(CONFIG_FILE)) {
            Ok(Some(c)) => c,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "ignoring workspace config");
                Self::default()
            }
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        cfg
    }

    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("SCHOOLD_REMOTE_ENABLED") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.remote.enabled = true,
                "0" | "false" | "no" | "off" => self.remote.enabled = false,
                other => warn!(value = other, "SCHOOLD_REMOTE_ENABLED is not a boolean"),
            }
        }
        if let Some(v) = var("SCHOOLD_REMOTE_URL").filter(|v| !v.trim().is_empty()) {
            self.remote.url = Some(v.trim().to_string());
        }
        if let Some(v) = var("SCHOOLD_REMOTE_KEY").filter(|v| !v.trim().is_empty()) {
            self.remote.api_key = Some(v.trim().to_string());
        }
        if let Some(v) = var("SCHOOLD_REMOTE_TIMEOUT_SECS") {
            match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.remote.timeout_secs = secs,
                _ => warn!(value = %v, "SCHOOLD_REMOTE_TIMEOUT_SECS must be a positive integer"),
            }
        }
        if let Some(v) = var("SCHOOLD_ROLL_PREFIX").filter(|v| !v.trim().is_empty()) {
            self.school.roll_prefix = v.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = SchoolConfig::from_toml_str("", "schoold.toml").expect("parse");
        assert_eq!(cfg, SchoolConfig::default());
        assert!(!cfg.remote.enabled);
        assert_eq!(cfg.remote.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.school.roll_prefix, "KS");
    }

    #[test]
    fn remote_section_parses() {
        let cfg = SchoolConfig::from_toml_str(
            r#"
            [remote]
            enabled = true
            url = "https://school.example.co"
            api_key = "anon-key"
            "#,
            "schoold.toml",
        )
        .expect("parse");
        assert!(cfg.remote.enabled);
        assert_eq!(cfg.remote.url.as_deref(), Some("https://school.example.co"));
        assert_eq!(cfg.remote.api_key.as_deref(), Some("anon-key"));
        assert_eq!(cfg.remote.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        let e = SchoolConfig::from_toml_str("[remote\nenabled=", "x.toml").unwrap_err();
        assert!(matches!(e, ConfigError::Parse { .. }));
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("SCHOOLD_REMOTE_ENABLED", "yes"),
            ("SCHOOLD_REMOTE_URL", " https://remote.example "),
            ("SCHOOLD_REMOTE_TIMEOUT_SECS", "0"),
            ("SCHOOLD_ROLL_PREFIX", "KSBA"),
        ]
        .into_iter()
        .collect();
        let mut cfg = SchoolConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert!(cfg.remote.enabled);
        assert_eq!(cfg.remote.url.as_deref(), Some("https://remote.example"));
        assert_eq!(cfg.remote.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(cfg.school.roll_prefix, "KSBA");
    }
}
