//! Process-level configuration: bind address, TLS, where the rule document
//! lives, reload cadence, and daemon settings. Distinct from
//! [`crate::rules::RuleSet`], which is the webhook-routing rule data proper.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub tls: TlsConfig,

    /// Path to the persisted YAML rule document (`*_RULES_PATH`).
    pub rules_path: String,
    /// Auto-reload poll interval in seconds; `0` disables (`CONFIG_WATCH_INTERVAL`).
    pub config_watch_interval_secs: u64,
    /// Enables best-effort cluster-configmap persistence (`CONFIGMAP_NAME`).
    pub configmap_name: Option<String>,

    /// Fallback admin credentials used when `RuleSet.auth.basic` has no users.
    pub basic_auth_user: Option<String>,
    pub basic_auth_password: Option<String>,

    pub debug: bool,
    pub logging_to_file: bool,
    pub log_dir: Option<String>,

    pub daemon: DaemonConfig,

    /// Ring-buffer capacity for the recent-requests and recent-payloads feeds.
    pub request_log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            tls: TlsConfig::default(),
            rules_path: "rules.yaml".to_string(),
            config_watch_interval_secs: 30,
            configmap_name: None,
            basic_auth_user: None,
            basic_auth_password: None,
            debug: false,
            logging_to_file: false,
            log_dir: None,
            daemon: DaemonConfig::default(),
            request_log_capacity: 500,
        }
    }
}

impl Config {
    /// Load config from a YAML file. Falls back to env vars for the few
    /// settings the spec names as environment-resolved (`*_RULES_PATH`,
    /// `CONFIG_WATCH_INTERVAL`, `CONFIGMAP_NAME`, `BASIC_AUTH_USER`,
    /// `BASIC_AUTH_PASSWORD`) when the YAML is silent on them.
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let mut config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => serde_yaml_ng::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ALERTBRIDGE_RULES_PATH") {
            self.rules_path = v;
        }
        if let Ok(v) = std::env::var("CONFIG_WATCH_INTERVAL")
            && let Ok(n) = v.parse()
        {
            self.config_watch_interval_secs = n;
        }
        if let Ok(v) = std::env::var("CONFIGMAP_NAME") {
            self.configmap_name = Some(v);
        }
        if let Ok(v) = std::env::var("BASIC_AUTH_USER") {
            self.basic_auth_user = Some(v);
        }
        if let Ok(v) = std::env::var("BASIC_AUTH_PASSWORD") {
            self.basic_auth_password = Some(v);
        }
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.tls.enable {
            anyhow::ensure!(self.tls.cert.is_some(), "TLS enabled but cert path missing");
            anyhow::ensure!(self.tls.key.is_some(), "TLS enabled but key path missing");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct TlsConfig {
    pub enable: bool,
    pub cert: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DaemonConfig {
    pub pid_file: String,
    pub shutdown_timeout: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: "./alertbridge.pid".to_string(),
            shutdown_timeout: 10,
        }
    }
}
