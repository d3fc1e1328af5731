use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::config::env::EnvSource;
use crate::error::ConfigError;
use crate::platform::PlatformCredentials;

const REDACTED: &str = "********";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub platform: PlatformConfig,
    pub prometheus: PrometheusConfig,
    pub notification: NotificationConfig,
    pub scan: ScanConfig,
    pub server: ServerConfig,
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub api_url: String,
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    /// Guid of this application; its web process count is the replica count.
    pub app_guid: String,
    pub instance_index: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    pub url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Environment name placed in every notification target.
    pub environment: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub interval_secs: u64,
    pub concurrency: usize,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub path: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            username: String::new(),
            password: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            app_guid: String::new(),
            instance_index: 0,
            timeout_secs: 30,
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            environment: String::new(),
            timeout_secs: 15,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            concurrency: 8,
            call_timeout_secs: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: "rules.json".to_string(),
        }
    }
}

/// Environment variables and the configuration key each one sets.
pub const ENV_KEYS: &[(&str, &str)] = &[
    ("CF_API", "platform.api_url"),
    ("CF_USER", "platform.username"),
    ("CF_PASSWORD", "platform.password"),
    ("CF_CLIENT", "platform.client_id"),
    ("CF_SECRET", "platform.client_secret"),
    ("CF_INSTANCE_INDEX", "platform.instance_index"),
    ("PROMETHEUS_URL", "prometheus.url"),
    ("GRAFANA_API_KEY", "prometheus.api_key"),
    ("NOTIFICATION_URL", "notification.url"),
    ("NOTIFICATION_USER", "notification.username"),
    ("NOTIFICATION_PASSWORD", "notification.password"),
    ("ENVIRONMENT_NAME", "notification.environment"),
    ("CHECK_INTERVAL", "scan.interval_secs"),
    ("SCAN_CONCURRENCY", "scan.concurrency"),
    ("PORT", "server.port"),
    ("RULES_PATH", "rules.path"),
];

/// Subset of the platform's `VCAP_APPLICATION` document.
#[derive(Debug, Default, Deserialize)]
struct VcapApplication {
    #[serde(default)]
    application_id: Option<String>,
    #[serde(default)]
    cf_api: Option<String>,
    #[serde(default)]
    instance_index: Option<u32>,
}

impl Config {
    /// Load from a TOML file. Missing sections and keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents, &path.display().to_string())
    }

    pub fn from_toml(contents: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Overlay the process environment. `VCAP_APPLICATION` is applied first
    /// so explicit variables win over it.
    pub fn apply_env(&mut self, env: &impl EnvSource) -> Result<(), ConfigError> {
        if let Some(raw) = env.var("VCAP_APPLICATION") {
            let vcap: VcapApplication =
                serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                    path: "VCAP_APPLICATION".to_string(),
                    reason: e.to_string(),
                })?;
            if let Some(guid) = vcap.application_id {
                self.platform.app_guid = guid;
            }
            if let Some(api) = vcap.cf_api {
                self.platform.api_url = api;
            }
            if let Some(index) = vcap.instance_index {
                self.platform.instance_index = index;
            }
        }

        for (var, key) in ENV_KEYS {
            if let Some(value) = env.var(var) {
                self.set_value(key, &value)?;
            }
        }
        Ok(())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "platform.api_url" => self.platform.api_url = value.to_string(),
            "platform.username" => self.platform.username = value.to_string(),
            "platform.password" => self.platform.password = value.to_string(),
            "platform.client_id" => self.platform.client_id = value.to_string(),
            "platform.client_secret" => self.platform.client_secret = value.to_string(),
            "platform.app_guid" => self.platform.app_guid = value.to_string(),
            "platform.instance_index" => self.platform.instance_index = parse_number(key, value)?,
            "platform.timeout_secs" => self.platform.timeout_secs = parse_positive(key, value)?,
            "prometheus.url" => self.prometheus.url = value.to_string(),
            "prometheus.api_key" => self.prometheus.api_key = value.to_string(),
            "prometheus.timeout_secs" => self.prometheus.timeout_secs = parse_positive(key, value)?,
            "notification.url" => self.notification.url = value.to_string(),
            "notification.username" => self.notification.username = value.to_string(),
            "notification.password" => self.notification.password = value.to_string(),
            "notification.environment" => self.notification.environment = value.to_string(),
            "notification.timeout_secs" => {
                self.notification.timeout_secs = parse_positive(key, value)?
            }
            "scan.interval_secs" => self.scan.interval_secs = parse_positive(key, value)?,
            "scan.concurrency" => self.scan.concurrency = parse_positive(key, value)?,
            "scan.call_timeout_secs" => self.scan.call_timeout_secs = parse_positive(key, value)?,
            "server.port" => self.server.port = parse_number(key, value)?,
            "rules.path" => {
                if value.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        reason: "path must not be empty".to_string(),
                    });
                }
                self.rules.path = value.to_string();
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Check everything the scan loop needs before it starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.select_credentials()?;
        self.api_url()?;
        require(&self.platform.app_guid, "platform.app_guid", "VCAP_APPLICATION")?;
        self.prometheus_url()?;
        require(&self.prometheus.api_key, "prometheus.api_key", "GRAFANA_API_KEY")?;
        require(
            &self.notification.environment,
            "notification.environment",
            "ENVIRONMENT_NAME",
        )?;
        self.notification_url()?;
        require(&self.notification.username, "notification.username", "NOTIFICATION_USER")?;
        require(
            &self.notification.password,
            "notification.password",
            "NOTIFICATION_PASSWORD",
        )?;
        Ok(())
    }

    /// Client credentials take precedence when both kinds are configured.
    pub fn platform_credentials(&self) -> Result<PlatformCredentials, ConfigError> {
        let credentials = self.select_credentials()?;
        if !self.platform.client_id.is_empty() && !self.platform.username.is_empty() {
            tracing::warn!("both CF_USER and CF_CLIENT are set; using CF_CLIENT");
        }
        Ok(credentials)
    }

    fn select_credentials(&self) -> Result<PlatformCredentials, ConfigError> {
        let p = &self.platform;
        let has_client = !p.client_id.is_empty();
        let has_user = !p.username.is_empty();

        if has_client {
            require(&p.client_secret, "platform.client_secret", "CF_SECRET")?;
            return Ok(PlatformCredentials::Client {
                client_id: p.client_id.clone(),
                secret: p.client_secret.clone(),
            });
        }
        if has_user {
            require(&p.password, "platform.password", "CF_PASSWORD")?;
            return Ok(PlatformCredentials::Password {
                username: p.username.clone(),
                password: p.password.clone(),
            });
        }
        Err(ConfigError::MissingPlatformCredentials)
    }

    pub fn api_url(&self) -> Result<Url, ConfigError> {
        require(&self.platform.api_url, "platform.api_url", "CF_API")?;
        parse_url("platform.api_url", &self.platform.api_url)
    }

    pub fn prometheus_url(&self) -> Result<Url, ConfigError> {
        require(&self.prometheus.url, "prometheus.url", "PROMETHEUS_URL")?;
        parse_url("prometheus.url", &self.prometheus.url)
    }

    pub fn notification_url(&self) -> Result<Url, ConfigError> {
        require(&self.notification.url, "notification.url", "NOTIFICATION_URL")?;
        parse_url("notification.url", &self.notification.url)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan.interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.scan.call_timeout_secs)
    }

    /// Copy with every secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [
            &mut copy.platform.password,
            &mut copy.platform.client_secret,
            &mut copy.prometheus.api_key,
            &mut copy.notification.password,
        ] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        copy
    }
}

fn require(value: &str, key: &'static str, env: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing { key, env });
    }
    Ok(())
}

fn parse_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        key: key.to_string(),
        value: value.to_string(),
        source,
    })
}

fn parse_number<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("{value:?}: {e}"),
        })
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let parsed: T = parse_number(key, value)?;
    if parsed == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(parsed)
}
