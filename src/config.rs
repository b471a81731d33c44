//! TOML configuration for incidentmedic.
//!
//! Layered lookup: an explicit `--config` path, then `$INCIDENTMEDIC_CONFIG`,
//! then `/etc/incidentmedic/incidentmedic.toml`, then compiled-in defaults.
//! Every section is optional.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::CatalogConfig;
use crate::notify::RetryPolicy;
use crate::triage::classify::{default_rules, SeverityClassifier, SeverityRule};
use crate::triage::SeverityLevel;

pub const CONFIG_ENV: &str = "INCIDENTMEDIC_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/incidentmedic/incidentmedic.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try `$INCIDENTMEDIC_CONFIG`, then the system path, then defaults.
    /// A file that exists but fails to load is logged and skipped.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "INCIDENTMEDIC_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// An explicit path must load; without one, fall back through the layers.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

/// How long a notified incident may stay unacknowledged before escalating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub ack_timeout_low_secs: u64,
    pub ack_timeout_medium_secs: u64,
    pub ack_timeout_high_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            ack_timeout_low_secs: 30 * 60,
            ack_timeout_medium_secs: 15 * 60,
            ack_timeout_high_secs: 5 * 60,
        }
    }
}

impl EscalationConfig {
    /// Critical incidents escalate on intake and never wait for an ack; the
    /// high timeout is returned for them anyway.
    pub fn ack_timeout(&self, severity: SeverityLevel) -> Duration {
        let secs = match severity {
            SeverityLevel::Low => self.ack_timeout_low_secs,
            SeverityLevel::Medium => self.ack_timeout_medium_secs,
            SeverityLevel::High | SeverityLevel::Critical => self.ack_timeout_high_secs,
        };
        Duration::from_secs(secs)
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub send_timeout_ms: u64,
    /// POST notifications here. Unset means notifications go to the log.
    pub webhook_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_attempts: retry.max_attempts,
            initial_backoff_ms: retry.initial_backoff.as_millis() as u64,
            max_backoff_ms: retry.max_backoff.as_millis() as u64,
            send_timeout_ms: retry.send_timeout.as_millis() as u64,
            webhook_url: None,
        }
    }
}

impl DispatchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Extra severity rules, merged with (or replacing) the built-in table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub include_default_rules: bool,
    pub rules: Vec<SeverityRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            include_default_rules: true,
            rules: Vec::new(),
        }
    }
}

impl ClassifierConfig {
    pub fn build(&self) -> SeverityClassifier {
        let mut rules = if self.include_default_rules {
            default_rules()
        } else {
            Vec::new()
        };
        rules.extend(self.rules.iter().cloned());
        SeverityClassifier::new(rules)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
