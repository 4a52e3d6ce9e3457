//! Layered configuration.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`GeopinSettings::default()`]
//! 2. **User file**: `~/.geopin/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `GEOPIN_*` overrides (highest priority)
//!
//! There is no process-wide cache: the loaded value is passed to whoever needs it.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SettingsError;

pub const DEFAULT_SCRIPT_URL: &str = "https://webapi.amap.com/maps";
pub const DEFAULT_REST_BASE_URL: &str = "https://restapi.amap.com";

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeopinSettings {
    pub amap: AmapSettings,
    pub service: ServiceSettings,
    pub logging: LoggingSettings,
}

/// AMap credentials and endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmapSettings {
    /// JS API key, appended to the script URL.
    #[serde(skip_serializing)]
    pub key: Option<SecretString>,
    /// Security code the script requires before it may load.
    #[serde(skip_serializing)]
    pub security_code: Option<SecretString>,
    pub script_url: String,
    pub rest_base_url: String,
}

impl Default for AmapSettings {
    fn default() -> Self {
        Self {
            key: None,
            security_code: None,
            script_url: DEFAULT_SCRIPT_URL.to_string(),
            rest_base_url: DEFAULT_REST_BASE_URL.to_string(),
        }
    }
}

/// The slice of service settings the map consumes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    /// City/region the deployment serves. Empty means nationwide.
    pub region: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Provider credentials, present only when both parts are configured.
#[derive(Clone, Debug)]
pub struct ProviderCredentials {
    pub key: SecretString,
    pub security_code: SecretString,
}

impl GeopinSettings {
    pub fn credentials(&self) -> Option<ProviderCredentials> {
        let key = non_empty(self.amap.key.as_ref())?;
        let security_code = non_empty(self.amap.security_code.as_ref())?;
        Some(ProviderCredentials {
            key: key.clone(),
            security_code: security_code.clone(),
        })
    }

    /// Apply `GEOPIN_*` overrides from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("GEOPIN_AMAP_KEY") {
            self.amap.key = Some(SecretString::from(key));
        }
        if let Some(code) = lookup("GEOPIN_AMAP_SECURITY_CODE") {
            self.amap.security_code = Some(SecretString::from(code));
        }
        if let Some(region) = lookup("GEOPIN_REGION") {
            self.service.region = region;
        }
        if let Some(level) = lookup("GEOPIN_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

fn non_empty(secret: Option<&SecretString>) -> Option<&SecretString> {
    secret.filter(|s| !s.expose_secret().is_empty())
}

/// `~/.geopin/settings.json`
pub fn settings_path() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".geopin")
        .join("settings.json")
}

/// Recursively merge `overlay` into `base`. Objects merge key by key;
/// every other value in `overlay` replaces the one in `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (k, v) in overlay {
                let merged = match base.remove(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v,
                };
                let _ = base.insert(k, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Load from `path` (missing file means defaults), without env overrides.
pub fn load_settings_from_path(path: &Path) -> Result<GeopinSettings, SettingsError> {
    if !path.exists() {
        tracing::debug!(?path, "no settings file, using defaults");
        return Ok(GeopinSettings::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let user: Value = serde_json::from_str(&raw)?;
    let defaults = serde_json::to_value(GeopinSettings::default())?;
    Ok(serde_json::from_value(deep_merge(defaults, user))?)
}

/// Load all three layers.
pub fn load_settings() -> Result<GeopinSettings, SettingsError> {
    let mut settings = load_settings_from_path(&settings_path())?;
    settings.apply_env_overrides(|name| std::env::var(name).ok());
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn exposed(secret: &Option<SecretString>) -> Option<&str> {
        secret.as_ref().map(|s| s.expose_secret())
    }

    #[test]
    fn defaults() {
        let s = GeopinSettings::default();
        assert!(s.amap.key.is_none());
        assert_eq!(s.amap.script_url, DEFAULT_SCRIPT_URL);
        assert_eq!(s.service.region, "");
        assert_eq!(s.logging.level, "info");
        assert!(s.credentials().is_none());
    }

    #[test]
    fn credentials_need_both_parts() {
        let mut s = GeopinSettings::default();
        s.amap.key = Some("k".into());
        assert!(s.credentials().is_none());
        s.amap.security_code = Some(SecretString::default());
        assert!(s.credentials().is_none());
        s.amap.security_code = Some("code".into());
        let creds = s.credentials().unwrap();
        assert_eq!(creds.key.expose_secret(), "k");
        assert_eq!(creds.security_code.expose_secret(), "code");
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut s = GeopinSettings::default();
        s.amap.key = Some("super-secret".into());
        s.amap.security_code = Some("also-secret".into());
        let out = format!("{s:?}");
        assert!(!out.contains("super-secret"));
        assert!(!out.contains("also-secret"));
        assert!(out.contains("[REDACTED]"));
        assert!(!format!("{:?}", s.credentials().unwrap()).contains("super-secret"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"amap": {"key": "abc", "securityCode": "xyz"}, "service": {"region": "杭州市"}}"#,
        )
        .unwrap();

        let s = load_settings_from_path(&path).unwrap();
        assert_eq!(exposed(&s.amap.key), Some("abc"));
        assert_eq!(s.amap.rest_base_url, DEFAULT_REST_BASE_URL);
        assert_eq!(s.service.region, "杭州市");
        assert!(s.credentials().is_some());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("GEOPIN_AMAP_KEY", "env-key"),
            ("GEOPIN_REGION", "上海市"),
            ("GEOPIN_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut s = GeopinSettings::default();
        s.amap.key = Some("file-key".into());
        s.apply_env_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(exposed(&s.amap.key), Some("env-key"));
        assert_eq!(s.service.region, "上海市");
        assert_eq!(s.logging.level, "debug");
        assert!(s.amap.security_code.is_none());
    }

    #[test]
    fn deep_merge_nested() {
        let a = serde_json::json!({"x": {"a": 1, "b": 2}, "y": 1});
        let b = serde_json::json!({"x": {"b": 3}, "z": 4});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"]["a"], 1);
        assert_eq!(merged["x"]["b"], 3);
        assert_eq!(merged["y"], 1);
        assert_eq!(merged["z"], 4);
    }
}
