// Dashboard session - Single owner of the live view state
//
// Every handler takes the current time explicitly and returns the render
// updates it caused, so the whole view can be driven without a transport.
use super::render::RenderUpdate;
use crate::domain::channel::{Channel, ChannelKind, SeriesRef, TopicRegistry};
use crate::domain::connection::{ConnectionState, ConnectionStatus};
use crate::domain::dashboard::{Dashboard, DASHBOARD_TITLE};
use crate::domain::latest_value::{replay_max_age, LatestValueStore, TileUpdate};
use crate::domain::message_log::{EntryKind, LogEntry, MessageLog};
use crate::domain::telemetry::ChartExport;
use crate::domain::timeseries::{ChartError, ChartSet};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

pub struct Session {
    registry: TopicRegistry,
    tiles: LatestValueStore,
    charts: ChartSet,
    log: MessageLog,
    message_count: u64,
    subscribed_topics: BTreeSet<String>,
    connection: ConnectionStatus,
}

impl Session {
    pub fn new(registry: TopicRegistry) -> Self {
        let tiles = LatestValueStore::new(&registry);
        Self {
            registry,
            tiles,
            charts: ChartSet::new(),
            log: MessageLog::new(),
            message_count: 0,
            subscribed_topics: BTreeSet::new(),
            connection: ConnectionStatus::disconnected(),
        }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn is_paused(&self) -> bool {
        self.log.is_paused()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state
    }

    /// Process one inbound message. While paused nothing at all changes.
    pub fn ingest(&mut self, topic: &str, payload: &str, now: DateTime<Utc>) -> Vec<RenderUpdate> {
        if self.log.is_paused() {
            return Vec::new();
        }

        let mut updates = Vec::new();
        self.message_count += 1;
        updates.push(self.counts());

        let entry = LogEntry::telemetry(now, topic, payload);
        self.log.append(entry.clone());
        updates.push(RenderUpdate::Log(entry));

        let Some(channel) = self.registry.resolve(topic).cloned() else {
            tracing::debug!("Message on unregistered topic {}", topic);
            return updates;
        };

        match self.apply_to_channel(&channel, payload, now) {
            Ok(mut channel_updates) => updates.append(&mut channel_updates),
            Err(e) => {
                tracing::warn!("Failed to apply message on {}: {}", topic, e);
                let entry = LogEntry::error(now, format!("Parse error: {}", payload));
                self.log.append(entry.clone());
                updates.push(RenderUpdate::Log(entry));
            }
        }

        updates
    }

    fn apply_to_channel(
        &mut self,
        channel: &Channel,
        payload: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RenderUpdate>, ChartError> {
        let mut updates = vec![RenderUpdate::Tile(self.tiles.set(channel.id, payload, now))];

        // Categorical channels only drive their tile
        let Some(series) = channel.binding.series() else {
            return Ok(updates);
        };
        debug_assert_eq!(channel.kind(), ChannelKind::Numeric);

        let value = match payload.trim().parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                // Raw text stays on the tile even though it cannot be plotted
                tracing::debug!(
                    "Non-numeric payload '{}' on {}, chart not updated",
                    payload,
                    channel.topic
                );
                return Ok(updates);
            }
        };

        let chart = self
            .charts
            .get_mut(series.chart)
            .ok_or(ChartError::UnknownChart(series.chart))?;
        if let Some(point) = chart.append(series.series, value, now)? {
            updates.push(RenderUpdate::Chart { series, point });
        }
        Ok(updates)
    }

    /// Record a lifecycle or user-action entry. Suppressed while paused.
    pub fn note(&mut self, entry: LogEntry) -> Vec<RenderUpdate> {
        if self.log.is_paused() {
            return Vec::new();
        }
        self.log.append(entry.clone());
        vec![RenderUpdate::Log(entry)]
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Vec<RenderUpdate> {
        self.log
            .pause(now)
            .map(RenderUpdate::Log)
            .into_iter()
            .collect()
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Vec<RenderUpdate> {
        self.log
            .resume(now)
            .map(RenderUpdate::Log)
            .into_iter()
            .collect()
    }

    pub fn toggle_pause(&mut self, now: DateTime<Utc>) -> Vec<RenderUpdate> {
        if self.log.is_paused() {
            self.resume(now)
        } else {
            self.pause(now)
        }
    }

    /// Empty the log and restart the message counter
    pub fn clear_messages(&mut self) -> Vec<RenderUpdate> {
        self.log.clear();
        self.message_count = 0;
        vec![RenderUpdate::LogCleared, self.counts()]
    }

    pub fn clear_charts(&mut self, now: DateTime<Utc>) -> Vec<RenderUpdate> {
        self.charts.clear();
        let mut updates = vec![RenderUpdate::ChartsCleared];
        updates.extend(self.note(LogEntry::system(now, "Charts cleared")));
        updates
    }

    /// Manual refresh: announce the request and re-show tiles that are still fresh
    pub fn refresh(&mut self, now: DateTime<Utc>) -> Vec<RenderUpdate> {
        let mut updates = self.note(LogEntry::note(
            now,
            EntryKind::Command,
            "Refresh request sent",
        ));
        updates.extend(
            self.tiles
                .replay_all_fresh(now, replay_max_age())
                .into_iter()
                .map(RenderUpdate::Tile),
        );
        updates
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) -> Vec<RenderUpdate> {
        self.connection = status.clone();
        vec![RenderUpdate::Connection(status)]
    }

    /// A new successful connection overwrites the previous subscription record
    pub fn clear_subscriptions(&mut self) -> Vec<RenderUpdate> {
        self.subscribed_topics.clear();
        vec![self.counts()]
    }

    pub fn mark_subscribed(&mut self, topic: &str) -> Vec<RenderUpdate> {
        self.subscribed_topics.insert(topic.to_string());
        vec![self.counts()]
    }

    /// Logout: forget everything observed during the session
    pub fn reset(&mut self, now: DateTime<Utc>) -> Vec<RenderUpdate> {
        self.message_count = 0;
        self.subscribed_topics.clear();
        self.tiles.reset();
        self.charts.clear();

        let mut updates = vec![self.counts(), RenderUpdate::ChartsCleared];
        updates.extend(
            self.tiles
                .tiles(&self.registry)
                .into_iter()
                .map(|tile| {
                    RenderUpdate::Tile(TileUpdate {
                        channel: tile.id,
                        value: tile.value,
                        trend: tile.trend,
                        delta: None,
                        updated_at: now,
                    })
                }),
        );
        updates
    }

    pub fn export_charts(&mut self, now: DateTime<Utc>) -> (ChartExport, Vec<RenderUpdate>) {
        let export = ChartExport {
            exported_at: now,
            charts: self.charts.to_chart_data(),
        };
        let updates = self.note(LogEntry::note(now, EntryKind::Export, "Chart data exported"));
        (export, updates)
    }

    pub fn import_charts(
        &mut self,
        export: &ChartExport,
        now: DateTime<Utc>,
    ) -> Result<Vec<RenderUpdate>, ChartError> {
        self.charts.restore(&export.charts)?;

        let mut updates = vec![RenderUpdate::ChartsCleared];
        for chart in &export.charts {
            for (index, series) in chart.series.iter().enumerate() {
                let series_ref = SeriesRef {
                    chart: chart.id,
                    series: index,
                };
                let kept = self
                    .charts
                    .get(chart.id)
                    .map(|c| c.points(index))
                    .unwrap_or_default();
                debug_assert!(kept.len() <= series.points.len());
                updates.extend(kept.into_iter().map(|point| RenderUpdate::Chart {
                    series: series_ref,
                    point,
                }));
            }
        }
        updates.extend(self.note(LogEntry::system(now, "Chart data imported")));
        Ok(updates)
    }

    pub fn snapshot(&self) -> Dashboard {
        Dashboard {
            title: DASHBOARD_TITLE.to_string(),
            tiles: self.tiles.tiles(&self.registry),
            charts: self.charts.to_chart_data(),
            messages: self.log.entries().cloned().collect(),
            placeholder: self.log.placeholder().map(str::to_string),
            paused: self.log.is_paused(),
            message_count: self.message_count,
            subscribed_topics: self.subscribed_topics.iter().cloned().collect(),
            connection: self.connection.clone(),
        }
    }

    fn counts(&self) -> RenderUpdate {
        RenderUpdate::Counts {
            message_count: self.message_count,
            topic_count: self.subscribed_topics.len(),
        }
    }
}
