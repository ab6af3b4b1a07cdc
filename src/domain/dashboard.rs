// Dashboard domain model
use super::connection::ConnectionStatus;
use super::message_log::LogEntry;
use super::telemetry::{ChartData, TileData};
use serde::{Deserialize, Serialize};

pub const DASHBOARD_TITLE: &str = "Heat pump dashboard";

/// Everything a freshly attached renderer needs to draw the full view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub title: String,
    pub tiles: Vec<TileData>,
    pub charts: Vec<ChartData>,
    pub messages: Vec<LogEntry>,
    pub placeholder: Option<String>,
    pub paused: bool,
    pub message_count: u64,
    pub subscribed_topics: Vec<String>,
    pub connection: ConnectionStatus,
}

impl Dashboard {
    pub fn topic_count(&self) -> usize {
        self.subscribed_topics.len()
    }
}
