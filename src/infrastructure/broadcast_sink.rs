// Broadcast sink - Fans render updates out to every attached viewer
use crate::application::render::{RenderSink, RenderUpdate};
use crate::domain::channel::SeriesRef;
use crate::domain::connection::ConnectionStatus;
use crate::domain::latest_value::TileUpdate;
use crate::domain::message_log::LogEntry;
use crate::domain::telemetry::TimeSeriesPoint;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<RenderUpdate>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RenderUpdate> {
        self.tx.subscribe()
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn publish(&self, update: RenderUpdate) {
        // No viewers attached is not an error
        let _ = self.tx.send(update);
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSink for BroadcastSink {
    fn update_tile(&self, update: &TileUpdate) {
        self.publish(RenderUpdate::Tile(update.clone()));
    }

    fn update_chart(&self, series: SeriesRef, point: &TimeSeriesPoint) {
        self.publish(RenderUpdate::Chart {
            series,
            point: *point,
        });
    }

    fn render_log_entry(&self, entry: &LogEntry) {
        self.publish(RenderUpdate::Log(entry.clone()));
    }

    fn set_connection_indicator(&self, status: &ConnectionStatus) {
        self.publish(RenderUpdate::Connection(status.clone()));
    }

    fn set_counts(&self, message_count: u64, topic_count: usize) {
        self.publish(RenderUpdate::Counts {
            message_count,
            topic_count,
        });
    }

    fn clear_charts(&self) {
        self.publish(RenderUpdate::ChartsCleared);
    }

    fn clear_log(&self) {
        self.publish(RenderUpdate::LogCleared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updates_reach_every_viewer() {
        let sink = BroadcastSink::new();
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();
        assert_eq!(sink.viewer_count(), 2);

        sink.set_counts(4, 12);
        sink.clear_log();

        for rx in [&mut first, &mut second] {
            assert_eq!(
                rx.try_recv().unwrap(),
                RenderUpdate::Counts {
                    message_count: 4,
                    topic_count: 12
                }
            );
            assert_eq!(rx.try_recv().unwrap(), RenderUpdate::LogCleared);
        }
    }

    #[test]
    fn test_publishing_without_viewers_is_fine() {
        let sink = BroadcastSink::new();
        sink.clear_charts();
        assert_eq!(sink.viewer_count(), 0);
    }
}
