use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::NodeError;

pub const ENV_COMMAND_TIMEOUT_MS: &str = "CMDQ_COMMAND_TIMEOUT_MS";
pub const ENV_APPLY_POLL_MS: &str = "CMDQ_APPLY_POLL_MS";
pub const ENV_HTTP_BIND: &str = "CMDQ_HTTP_BIND";
pub const ENV_LOG_DIR: &str = "CMDQ_LOG_DIR";
pub const ENV_ALLOW_UNKNOWN_PROPERTIES: &str = "CMDQ_ALLOW_UNKNOWN_PROPERTIES";

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Bounds both the consistency wait and the wait for a submitted
    /// command to apply locally.
    pub command_timeout: Duration,
    /// How often the apply loop re-reads the log when nothing woke it.
    pub apply_poll_interval: Duration,
    /// Root for the filesystem log; `None` keeps the log in memory.
    pub log_dir: Option<PathBuf>,
    /// Accept override keys the property schema does not declare.
    pub allow_unknown_properties: bool,
    pub http: HttpServerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(5),
            apply_poll_interval: Duration::from_millis(100),
            log_dir: None,
            allow_unknown_properties: true,
            http: HttpServerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `CMDQ_*` environment variables.
    pub fn from_env() -> Result<Self, NodeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`NodeConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, NodeError> {
        let mut config = Self::default();
        if let Some(ms) = lookup(ENV_COMMAND_TIMEOUT_MS) {
            config.command_timeout = Duration::from_millis(parse_u64(ENV_COMMAND_TIMEOUT_MS, &ms)?);
        }
        if let Some(ms) = lookup(ENV_APPLY_POLL_MS) {
            let ms = parse_u64(ENV_APPLY_POLL_MS, &ms)?;
            if ms == 0 {
                return Err(NodeError::Config(format!(
                    "{ENV_APPLY_POLL_MS} must be greater than zero"
                )));
            }
            config.apply_poll_interval = Duration::from_millis(ms);
        }
        if let Some(bind) = lookup(ENV_HTTP_BIND) {
            config.http.bind = bind.parse().map_err(|err| {
                NodeError::Config(format!("invalid {ENV_HTTP_BIND} '{bind}': {err}"))
            })?;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|dir| !dir.is_empty()) {
            config.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(ENV_ALLOW_UNKNOWN_PROPERTIES) {
            config.allow_unknown_properties = parse_bool(ENV_ALLOW_UNKNOWN_PROPERTIES, &flag)?;
        }
        Ok(config)
    }
}

/// Configuration for the HTTP API.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub enabled: bool,
    pub bind: SocketAddr,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from(([127, 0, 0, 1], 8088)),
        }
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, NodeError> {
    raw.trim()
        .parse()
        .map_err(|err| NodeError::Config(format!("invalid {key} '{raw}': {err}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, NodeError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(NodeError::Config(format!(
            "invalid {key} '{raw}': expected true or false"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = NodeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert!(config.log_dir.is_none());
        assert!(config.allow_unknown_properties);
        assert_eq!(config.http.bind.port(), 8088);
    }

    #[test]
    fn reads_overrides() {
        let config = NodeConfig::from_lookup(lookup(&[
            (ENV_COMMAND_TIMEOUT_MS, "250"),
            (ENV_APPLY_POLL_MS, "20"),
            (ENV_HTTP_BIND, "0.0.0.0:9000"),
            (ENV_LOG_DIR, "/var/lib/cmdq"),
            (ENV_ALLOW_UNKNOWN_PROPERTIES, "false"),
        ]))
        .unwrap();
        assert_eq!(config.command_timeout, Duration::from_millis(250));
        assert_eq!(config.apply_poll_interval, Duration::from_millis(20));
        assert_eq!(config.http.bind.port(), 9000);
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/lib/cmdq")));
        assert!(!config.allow_unknown_properties);
    }

    #[test]
    fn malformed_values_are_errors() {
        for vars in [
            [(ENV_COMMAND_TIMEOUT_MS, "soon")],
            [(ENV_APPLY_POLL_MS, "0")],
            [(ENV_HTTP_BIND, "localhost")],
            [(ENV_ALLOW_UNKNOWN_PROPERTIES, "maybe")],
        ] {
            let err = NodeConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, NodeError::Config(_)), "{vars:?}");
        }
    }
}
