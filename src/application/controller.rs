// Connection controller - Broker connection lifecycle as a pure state machine
//
// The controller never touches the network. It decides what should happen
// and hands back effects for the runtime to carry out in order.
use super::endpoint::{BrokerEndpoint, ConfigError};
use super::settings::ConnectionSettings;
use super::transport::{HandleId, TransportEvent};
use crate::domain::connection::ConnectionStatus;
use crate::domain::message_log::LogEntry;
use crate::domain::timeseries::ChartError;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Not connected to the broker")]
    NotConnected,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error("Broker request failed: {0}")]
    Transport(String),

    #[error("Dashboard runtime has stopped")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlEffect {
    /// End the transport behind `handle` and drop it
    Teardown(HandleId),
    /// Open a new transport identified by `handle`
    Open {
        handle: HandleId,
        endpoint: BrokerEndpoint,
    },
    Status(ConnectionStatus),
    Log(LogEntry),
    ClearSubscriptions,
    Subscribe {
        handle: HandleId,
        topic: String,
    },
    PersistSettings(ConnectionSettings),
    StartTasks,
    CancelTasks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Idle,
    Opening(HandleId),
    Up(HandleId),
    Down(HandleId),
}

pub struct ConnectionController {
    topics: Vec<String>,
    link: Link,
    next_handle: u64,
}

impl ConnectionController {
    pub fn new(topics: Vec<String>) -> Self {
        Self {
            topics,
            link: Link::Idle,
            next_handle: 1,
        }
    }

    pub fn active_handle(&self) -> Option<HandleId> {
        match self.link {
            Link::Idle => None,
            Link::Opening(h) | Link::Up(h) | Link::Down(h) => Some(h),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Up(_))
    }

    /// Validate settings, retire the current connection and open a new one.
    /// Nothing changes when validation fails.
    pub fn connect(
        &mut self,
        settings: &ConnectionSettings,
    ) -> Result<Vec<ControlEffect>, ConfigError> {
        let endpoint = BrokerEndpoint::from_settings(settings)?;

        let mut effects = self.retire();

        let handle = HandleId(self.next_handle);
        self.next_handle += 1;
        self.link = Link::Opening(handle);

        tracing::info!("Connecting to {} as {}", endpoint, handle);
        effects.push(ControlEffect::Status(ConnectionStatus::connecting()));
        effects.push(ControlEffect::Open { handle, endpoint });
        effects.push(ControlEffect::PersistSettings(settings.clone()));
        Ok(effects)
    }

    /// Manual disconnect. Any retired connection ends in `Disconnected`;
    /// only a live one is logged.
    pub fn disconnect(&mut self, now: DateTime<Utc>) -> Vec<ControlEffect> {
        let was_up = self.is_connected();
        let mut effects = self.retire();
        if effects.is_empty() {
            return effects;
        }
        effects.push(ControlEffect::Status(ConnectionStatus::disconnected()));
        if was_up {
            effects.push(ControlEffect::Log(LogEntry::system(now, "Disconnected manually")));
        }
        effects
    }

    /// Logout: drop any connection without announcing it
    pub fn reset(&mut self) -> Vec<ControlEffect> {
        let mut effects = self.retire();
        effects.push(ControlEffect::Status(ConnectionStatus::disconnected()));
        effects
    }

    pub fn handle(
        &mut self,
        handle: HandleId,
        event: &TransportEvent,
        now: DateTime<Utc>,
    ) -> Vec<ControlEffect> {
        if self.active_handle() != Some(handle) {
            tracing::debug!("Ignoring {:?} from stale connection {}", event, handle);
            return Vec::new();
        }

        match event {
            TransportEvent::Connected => {
                self.link = Link::Up(handle);
                let mut effects = vec![
                    ControlEffect::Status(ConnectionStatus::connected()),
                    ControlEffect::Log(LogEntry::system(now, "Connected to the MQTT broker")),
                    ControlEffect::ClearSubscriptions,
                ];
                effects.extend(self.topics.iter().map(|topic| ControlEffect::Subscribe {
                    handle,
                    topic: topic.clone(),
                }));
                effects.push(ControlEffect::StartTasks);
                effects
            }
            TransportEvent::Error(message) => vec![
                ControlEffect::Status(ConnectionStatus::erroring(message)),
                ControlEffect::Log(LogEntry::error(now, format!("Connection error: {}", message))),
            ],
            TransportEvent::Closed | TransportEvent::Offline => {
                self.link = Link::Down(handle);
                vec![
                    ControlEffect::Status(ConnectionStatus::disconnected()),
                    ControlEffect::Log(LogEntry::system(now, "Disconnected from the broker")),
                    ControlEffect::CancelTasks,
                ]
            }
            TransportEvent::Reconnecting => {
                self.link = Link::Opening(handle);
                vec![ControlEffect::Status(ConnectionStatus::connecting())]
            }
            TransportEvent::Ended => {
                let was_up = self.is_connected();
                self.link = Link::Idle;
                let mut effects = vec![ControlEffect::CancelTasks];
                if was_up {
                    effects.push(ControlEffect::Status(ConnectionStatus::disconnected()));
                }
                effects
            }
            // Messages are routed to the session, never here
            TransportEvent::Message { .. } => Vec::new(),
        }
    }

    fn retire(&mut self) -> Vec<ControlEffect> {
        let mut effects = Vec::new();
        if let Some(old) = self.active_handle() {
            tracing::info!("Retiring connection {}", old);
            effects.push(ControlEffect::CancelTasks);
            effects.push(ControlEffect::Teardown(old));
        }
        self.link = Link::Idle;
        effects
    }
}
