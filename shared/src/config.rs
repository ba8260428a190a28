use std::env;

pub const DEFAULT_TABLE_NAME: &str = "shigodeki";
pub const DEFAULT_BUCKET_NAME: &str = "shigodeki-app";
pub const DEFAULT_INVITE_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Runtime configuration, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub table_name: String,
    pub bucket_name: String,
    pub region: Option<String>,
    pub start_offline: bool,
    pub log_format: LogFormat,
    pub invite_ttl_days: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            bucket_name: DEFAULT_BUCKET_NAME.to_string(),
            region: None,
            start_offline: false,
            log_format: LogFormat::Text,
            invite_ttl_days: DEFAULT_INVITE_TTL_DAYS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            table_name: lookup("TABLE_NAME").unwrap_or(defaults.table_name),
            bucket_name: lookup("S3_BUCKET_NAME").unwrap_or(defaults.bucket_name),
            region: lookup("AWS_REGION").filter(|r| !r.is_empty()),
            start_offline: lookup("SHIGODEKI_OFFLINE")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            log_format: match lookup("SHIGODEKI_LOG_FORMAT").as_deref().map(str::trim) {
                Some("json") | Some("JSON") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            invite_ttl_days: lookup("SHIGODEKI_INVITE_TTL_DAYS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|days: &i64| *days > 0)
                .unwrap_or(defaults.invite_ttl_days),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(config(&[]), AppConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("TABLE_NAME", "tasks-dev"),
            ("SHIGODEKI_OFFLINE", "true"),
            ("SHIGODEKI_LOG_FORMAT", "json"),
            ("SHIGODEKI_INVITE_TTL_DAYS", "7"),
            ("AWS_REGION", "ap-northeast-1"),
        ]);
        assert_eq!(cfg.table_name, "tasks-dev");
        assert!(cfg.start_offline);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.invite_ttl_days, 7);
        assert_eq!(cfg.region.as_deref(), Some("ap-northeast-1"));
    }

    #[test]
    fn bad_ttl_falls_back() {
        assert_eq!(config(&[("SHIGODEKI_INVITE_TTL_DAYS", "-3")]).invite_ttl_days, 30);
        assert_eq!(config(&[("SHIGODEKI_INVITE_TTL_DAYS", "soon")]).invite_ttl_days, 30);
    }
}
