// Settings service - Connection and appearance records over a key-value store
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;

pub const CONNECTION_SETTINGS_KEY: &str = "mqttSettings";
pub const APPEARANCE_SETTINGS_KEY: &str = "appearanceSettings";

pub const DEFAULT_CLIENT_ID: &str = "M5StickC_Dashboard";
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Stands in for a stored password in anything sent back to clients
pub const REDACTED_PASSWORD: &str = "********";

/// Persistent string key-value storage
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerProtocol {
    Ws,
    Wss,
    Mqtt,
    Mqtts,
}

impl BrokerProtocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            BrokerProtocol::Ws => "ws",
            BrokerProtocol::Wss => "wss",
            BrokerProtocol::Mqtt => "mqtt",
            BrokerProtocol::Mqtts => "mqtts",
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "ws" => Some(BrokerProtocol::Ws),
            "wss" => Some(BrokerProtocol::Wss),
            "mqtt" | "tcp" => Some(BrokerProtocol::Mqtt),
            "mqtts" | "ssl" | "tls" => Some(BrokerProtocol::Mqtts),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            BrokerProtocol::Ws => 8000,
            BrokerProtocol::Wss => 8884,
            BrokerProtocol::Mqtt => 1883,
            BrokerProtocol::Mqtts => 8883,
        }
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, BrokerProtocol::Ws | BrokerProtocol::Wss)
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, BrokerProtocol::Wss | BrokerProtocol::Mqtts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    pub broker: String,
    pub user: String,
    pub pass: String,
    pub client_id: String,
    pub keep_alive: u64,
    pub port: Option<u16>,
    pub protocol: Option<BrokerProtocol>,
    pub tls: bool,
    pub accept_invalid_certs: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            broker: String::new(),
            user: String::new(),
            pass: String::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            keep_alive: DEFAULT_KEEP_ALIVE_SECS,
            port: None,
            protocol: None,
            tls: true,
            accept_invalid_certs: false,
        }
    }
}

impl ConnectionSettings {
    /// Enough to attempt a connection without asking the user
    pub fn is_complete(&self) -> bool {
        !self.broker.trim().is_empty() && !self.user.trim().is_empty()
    }

    /// Copy safe to hand back to clients
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.pass.is_empty() {
            copy.pass = REDACTED_PASSWORD.to_string();
        }
        copy
    }

    /// Undo `redacted`: a password still showing the mask means "keep the saved one"
    pub fn restore_password(mut self, saved: &ConnectionSettings) -> Self {
        if self.pass == REDACTED_PASSWORD {
            self.pass = saved.pass.clone();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileLayout {
    #[default]
    Grid,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppearanceSettings {
    pub theme: Theme,
    pub tile_layout: TileLayout,
}

#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    connection_defaults: ConnectionSettings,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>, connection_defaults: ConnectionSettings) -> Self {
        Self {
            store,
            connection_defaults,
        }
    }

    /// Saved connection settings, or the configured defaults
    pub fn load_connection(&self) -> ConnectionSettings {
        self.load_record(CONNECTION_SETTINGS_KEY)
            .unwrap_or_else(|| self.connection_defaults.clone())
    }

    pub fn save_connection(&self, settings: &ConnectionSettings) -> anyhow::Result<()> {
        self.save_record(CONNECTION_SETTINGS_KEY, settings)
    }

    /// Forget the saved record and return the defaults now in effect
    pub fn reset_connection(&self) -> anyhow::Result<ConnectionSettings> {
        self.store.remove(CONNECTION_SETTINGS_KEY)?;
        tracing::info!("Connection settings reset to defaults");
        Ok(self.connection_defaults.clone())
    }

    pub fn load_appearance(&self) -> AppearanceSettings {
        self.load_record(APPEARANCE_SETTINGS_KEY).unwrap_or_default()
    }

    pub fn save_appearance(&self, settings: &AppearanceSettings) -> anyhow::Result<()> {
        self.save_record(APPEARANCE_SETTINGS_KEY, settings)
    }

    fn load_record<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read settings '{}': {:#}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings '{}': {}", key, e);
                None
            }
        }
    }

    fn save_record<T: Serialize>(&self, key: &str, record: &T) -> anyhow::Result<()> {
        let raw = serde_json::to_string(record)?;
        self.store.set(key, &raw)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    #[derive(Default)]
    pub struct MemorySettingsStore {
        values: RwLock<HashMap<String, String>>,
    }

    impl SettingsStore for MemorySettingsStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            Ok(self.values.read().unwrap().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.values
                .write()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.values.write().unwrap().remove(key);
            Ok(())
        }
    }

    pub fn memory_service(defaults: ConnectionSettings) -> SettingsService {
        SettingsService::new(Arc::new(MemorySettingsStore::default()), defaults)
    }

    fn defaults() -> ConnectionSettings {
        ConnectionSettings {
            broker: "wss://broker.example.com:8884/mqtt".to_string(),
            ..ConnectionSettings::default()
        }
    }

    #[test]
    fn test_load_connection_falls_back_to_defaults() {
        let service = memory_service(defaults());
        assert_eq!(service.load_connection(), defaults());
    }

    #[test]
    fn test_save_and_load_connection() {
        let service = memory_service(defaults());
        let settings = ConnectionSettings {
            broker: "broker.local".to_string(),
            user: "pump".to_string(),
            pass: "secret".to_string(),
            keep_alive: 30,
            ..ConnectionSettings::default()
        };

        service.save_connection(&settings).unwrap();
        assert_eq!(service.load_connection(), settings);
    }

    #[test]
    fn test_reset_connection_removes_record() {
        let service = memory_service(defaults());
        let settings = ConnectionSettings {
            broker: "other".to_string(),
            ..ConnectionSettings::default()
        };
        service.save_connection(&settings).unwrap();

        assert_eq!(service.reset_connection().unwrap(), defaults());
        assert_eq!(service.load_connection(), defaults());
    }

    #[test]
    fn test_unreadable_record_is_ignored() {
        let store = Arc::new(MemorySettingsStore::default());
        store.set(APPEARANCE_SETTINGS_KEY, "{not json").unwrap();
        let service = SettingsService::new(store, defaults());

        assert_eq!(service.load_appearance(), AppearanceSettings::default());
    }

    #[test]
    fn test_partial_record_uses_field_defaults() {
        let store = Arc::new(MemorySettingsStore::default());
        store
            .set(CONNECTION_SETTINGS_KEY, r#"{"broker":"h","user":"u"}"#)
            .unwrap();
        let service = SettingsService::new(store, defaults());

        let loaded = service.load_connection();
        assert_eq!(loaded.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(loaded.keep_alive, DEFAULT_KEEP_ALIVE_SECS);
        assert!(loaded.is_complete());
    }

    #[test]
    fn test_appearance_round_trip() {
        let service = memory_service(defaults());
        let appearance = AppearanceSettings {
            theme: Theme::Light,
            tile_layout: TileLayout::List,
        };
        service.save_appearance(&appearance).unwrap();
        assert_eq!(service.load_appearance(), appearance);
    }

    #[test]
    fn test_redacted_hides_password() {
        let settings = ConnectionSettings {
            pass: "secret".to_string(),
            ..ConnectionSettings::default()
        };
        assert_eq!(settings.redacted().pass, "********");
        assert_eq!(ConnectionSettings::default().redacted().pass, "");
    }

    #[test]
    fn test_restore_password_keeps_saved_secret() {
        let saved = ConnectionSettings {
            pass: "secret".to_string(),
            ..ConnectionSettings::default()
        };
        assert_eq!(saved.redacted().restore_password(&saved).pass, "secret");

        let changed = ConnectionSettings {
            pass: "new".to_string(),
            ..ConnectionSettings::default()
        };
        assert_eq!(changed.restore_password(&saved).pass, "new");
    }
}
