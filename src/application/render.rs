// Rendering sink - Where state changes are pushed after every mutation
use crate::domain::channel::SeriesRef;
use crate::domain::connection::ConnectionStatus;
use crate::domain::latest_value::TileUpdate;
use crate::domain::message_log::LogEntry;
use crate::domain::telemetry::TimeSeriesPoint;
use serde::{Deserialize, Serialize};

/// A single change to the rendered view, produced by session handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RenderUpdate {
    Tile(TileUpdate),
    Chart {
        series: SeriesRef,
        point: TimeSeriesPoint,
    },
    ChartsCleared,
    Log(LogEntry),
    LogCleared,
    Connection(ConnectionStatus),
    Counts {
        message_count: u64,
        topic_count: usize,
    },
}

impl RenderUpdate {
    pub fn apply_to(&self, sink: &dyn RenderSink) {
        match self {
            RenderUpdate::Tile(update) => sink.update_tile(update),
            RenderUpdate::Chart { series, point } => sink.update_chart(*series, point),
            RenderUpdate::ChartsCleared => sink.clear_charts(),
            RenderUpdate::Log(entry) => sink.render_log_entry(entry),
            RenderUpdate::LogCleared => sink.clear_log(),
            RenderUpdate::Connection(status) => sink.set_connection_indicator(status),
            RenderUpdate::Counts {
                message_count,
                topic_count,
            } => sink.set_counts(*message_count, *topic_count),
        }
    }
}

pub trait RenderSink: Send + Sync {
    fn update_tile(&self, update: &TileUpdate);

    fn update_chart(&self, series: SeriesRef, point: &TimeSeriesPoint);

    fn render_log_entry(&self, entry: &LogEntry);

    fn set_connection_indicator(&self, status: &ConnectionStatus);

    fn set_counts(&self, message_count: u64, topic_count: usize);

    fn clear_charts(&self) {}

    fn clear_log(&self) {}
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every update it receives
    #[derive(Default)]
    pub struct RecordingSink {
        updates: Mutex<Vec<RenderUpdate>>,
    }

    impl RecordingSink {
        pub fn take(&self) -> Vec<RenderUpdate> {
            std::mem::take(&mut *self.updates.lock().unwrap())
        }

        fn push(&self, update: RenderUpdate) {
            self.updates.lock().unwrap().push(update);
        }
    }

    impl RenderSink for RecordingSink {
        fn update_tile(&self, update: &TileUpdate) {
            self.push(RenderUpdate::Tile(update.clone()));
        }

        fn update_chart(&self, series: SeriesRef, point: &TimeSeriesPoint) {
            self.push(RenderUpdate::Chart {
                series,
                point: *point,
            });
        }

        fn render_log_entry(&self, entry: &LogEntry) {
            self.push(RenderUpdate::Log(entry.clone()));
        }

        fn set_connection_indicator(&self, status: &ConnectionStatus) {
            self.push(RenderUpdate::Connection(status.clone()));
        }

        fn set_counts(&self, message_count: u64, topic_count: usize) {
            self.push(RenderUpdate::Counts {
                message_count,
                topic_count,
            });
        }

        fn clear_charts(&self) {
            self.push(RenderUpdate::ChartsCleared);
        }

        fn clear_log(&self) {
            self.push(RenderUpdate::LogCleared);
        }
    }

    #[test]
    fn test_apply_to_dispatches_every_variant() {
        let sink = RecordingSink::default();
        let updates = vec![
            RenderUpdate::ChartsCleared,
            RenderUpdate::LogCleared,
            RenderUpdate::Connection(ConnectionStatus::connected()),
            RenderUpdate::Counts {
                message_count: 3,
                topic_count: 12,
            },
        ];
        for update in &updates {
            update.apply_to(&sink);
        }
        assert_eq!(sink.take(), updates);
    }

    #[test]
    fn test_update_serializes_tagged() {
        let json = serde_json::to_value(RenderUpdate::Counts {
            message_count: 1,
            topic_count: 2,
        })
        .unwrap();
        assert_eq!(json["type"], "counts");
        assert_eq!(json["data"]["message_count"], 1);
    }
}
