// Connection domain model - Broker connection state as shown to the user
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Erroring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub detail: String,
}

impl ConnectionStatus {
    pub fn new(state: ConnectionState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
        }
    }

    pub fn disconnected() -> Self {
        Self::new(ConnectionState::Disconnected, "Disconnected")
    }

    pub fn connecting() -> Self {
        Self::new(ConnectionState::Connecting, "Connecting...")
    }

    pub fn connected() -> Self {
        Self::new(ConnectionState::Connected, "Connected")
    }

    pub fn erroring(message: &str) -> Self {
        Self::new(ConnectionState::Erroring, format!("Error: {}", message))
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::disconnected()
    }
}
