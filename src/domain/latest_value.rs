// Latest-value store - Tile display text, last received reading and trend
use super::channel::{ChannelId, TopicRegistry};
use super::telemetry::{TileData, Trend};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Changes at or below this magnitude do not move the trend arrow
pub const TREND_THRESHOLD: f64 = 0.01;

/// Display text of a tile with no value
pub const EMPTY_DISPLAY: &str = "--";

pub fn replay_max_age() -> TimeDelta {
    TimeDelta::seconds(60)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestValue {
    pub raw_value: String,
    pub timestamp: DateTime<Utc>,
}

/// What a renderer needs to redraw one tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileUpdate {
    pub channel: ChannelId,
    pub value: String,
    pub trend: Trend,
    pub delta: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TileState {
    display: String,
    trend: Trend,
    latest: Option<LatestValue>,
}

#[derive(Debug, Clone)]
pub struct LatestValueStore {
    tiles: BTreeMap<ChannelId, TileState>,
}

impl LatestValueStore {
    /// Tiles start out showing each channel's default reading
    pub fn new(registry: &TopicRegistry) -> Self {
        let tiles = registry
            .channels()
            .iter()
            .map(|c| {
                (
                    c.id,
                    TileState {
                        display: c.default_value.to_string(),
                        trend: Trend::Flat,
                        latest: None,
                    },
                )
            })
            .collect();
        Self { tiles }
    }

    pub fn set(&mut self, channel: ChannelId, raw_value: &str, at: DateTime<Utc>) -> TileUpdate {
        let tile = self.tiles.entry(channel).or_insert_with(|| TileState {
            display: EMPTY_DISPLAY.to_string(),
            trend: Trend::Flat,
            latest: None,
        });

        let (trend, delta) = compute_trend(&tile.display, raw_value);
        tile.display = raw_value.to_string();
        tile.trend = trend;
        tile.latest = Some(LatestValue {
            raw_value: raw_value.to_string(),
            timestamp: at,
        });

        TileUpdate {
            channel,
            value: raw_value.to_string(),
            trend,
            delta,
            updated_at: at,
        }
    }

    pub fn get(&self, channel: ChannelId) -> Option<&LatestValue> {
        self.tiles.get(&channel).and_then(|t| t.latest.as_ref())
    }

    pub fn display(&self, channel: ChannelId) -> Option<&str> {
        self.tiles.get(&channel).map(|t| t.display.as_str())
    }

    /// Re-show the last received value if it is younger than `max_age`.
    /// The receipt timestamp is kept so repeated refreshes never make old
    /// data look fresh.
    pub fn replay_if_fresh(
        &mut self,
        channel: ChannelId,
        now: DateTime<Utc>,
        max_age: TimeDelta,
    ) -> Option<TileUpdate> {
        let tile = self.tiles.get_mut(&channel)?;
        let latest = tile.latest.as_ref()?;
        if now - latest.timestamp >= max_age {
            return None;
        }

        let (trend, delta) = compute_trend(&tile.display, &latest.raw_value);
        tile.display = latest.raw_value.clone();
        tile.trend = trend;

        Some(TileUpdate {
            channel,
            value: latest.raw_value.clone(),
            trend,
            delta,
            updated_at: latest.timestamp,
        })
    }

    /// Replay every fresh tile, in channel order
    pub fn replay_all_fresh(&mut self, now: DateTime<Utc>, max_age: TimeDelta) -> Vec<TileUpdate> {
        let ids: Vec<ChannelId> = self.tiles.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.replay_if_fresh(id, now, max_age))
            .collect()
    }

    /// Forget every reading; tiles show the empty marker
    pub fn reset(&mut self) {
        for tile in self.tiles.values_mut() {
            tile.display = EMPTY_DISPLAY.to_string();
            tile.trend = Trend::Flat;
            tile.latest = None;
        }
    }

    pub fn tiles(&self, registry: &TopicRegistry) -> Vec<TileData> {
        registry
            .channels()
            .iter()
            .map(|c| {
                let state = self.tiles.get(&c.id);
                TileData {
                    id: c.id,
                    label: c.label.to_string(),
                    unit: c.unit.to_string(),
                    section: c.section,
                    value: state
                        .map(|t| t.display.clone())
                        .unwrap_or_else(|| EMPTY_DISPLAY.to_string()),
                    trend: state.map(|t| t.trend).unwrap_or_default(),
                    updated_at: state.and_then(|t| t.latest.as_ref().map(|l| l.timestamp)),
                }
            })
            .collect()
    }
}

/// Compare the parse of the displayed text with the parse of the new text.
/// A non-numeric side on either end means no trend.
fn compute_trend(previous: &str, current: &str) -> (Trend, Option<f64>) {
    let parse = |s: &str| s.trim().parse::<f64>().ok().filter(|v| v.is_finite());
    match (parse(previous), parse(current)) {
        (Some(before), Some(after)) => {
            let delta = after - before;
            if delta.abs() > TREND_THRESHOLD {
                let trend = if delta > 0.0 { Trend::Up } else { Trend::Down };
                (trend, Some(delta))
            } else {
                (Trend::Flat, Some(delta))
            }
        }
        _ => (Trend::Flat, None),
    }
}
