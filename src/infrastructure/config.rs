// Configuration loading - Service settings from file and environment
use crate::application::settings::{ConnectionSettings, DEFAULT_CLIENT_ID, DEFAULT_KEEP_ALIVE_SECS};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "config/dashboard";
const ENV_PREFIX: &str = "HEATPUMP";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub login: LoginConfig,
    pub broker: BrokerDefaults,
    pub dashboard: DashboardConfig,
    pub settings: SettingsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Connection settings used until the user saves their own
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerDefaults {
    pub url: String,
    pub user: String,
    pub pass: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub tls: bool,
}

impl Default for BrokerDefaults {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            pass: String::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            tls: true,
        }
    }
}

impl BrokerDefaults {
    pub fn to_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            broker: self.url.clone(),
            user: self.user.clone(),
            pass: self.pass.clone(),
            client_id: self.client_id.clone(),
            keep_alive: self.keep_alive_secs,
            tls: self.tls,
            ..ConnectionSettings::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoginConfig {
    pub username: String,
    pub password: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

impl LoginConfig {
    pub fn accepts(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    /// Seconds between auto-refresh publishes; 0 disables
    pub auto_refresh_secs: u64,
    pub auto_connect: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            auto_refresh_secs: 10,
            auto_connect: false,
        }
    }
}

impl DashboardConfig {
    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SettingsConfig {
    pub path: PathBuf,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/settings.json"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

pub fn load_app_config() -> anyhow::Result<AppConfig> {
    load_from(CONFIG_FILE)
}

/// Optional TOML file layered under `HEATPUMP__SECTION__KEY` variables
pub fn load_from(file: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(file).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
