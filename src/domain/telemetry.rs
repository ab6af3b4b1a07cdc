// Telemetry data domain models - Tile and chart views handed to renderers
use super::channel::{ChannelId, ChartId, UnitSection};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }

    pub fn at(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self::new(timestamp.timestamp_millis(), value)
    }
}

/// Direction of the last change shown on a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileData {
    pub id: ChannelId,
    pub label: String,
    pub unit: String,
    pub section: UnitSection,
    pub value: String,
    pub trend: Trend,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesData {
    pub name: String,
    pub points: Vec<TimeSeriesPoint>,
}

impl SeriesData {
    pub fn new(name: String, points: Vec<TimeSeriesPoint>) -> Self {
        Self { name, points }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartKind {
    Line,
    MultiLine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub id: ChartId,
    pub title: String,
    pub kind: ChartKind,
    /// Shared x-axis, formatted as local wall-clock time
    pub labels: Vec<String>,
    pub series: Vec<SeriesData>,
}

impl ChartData {
    pub fn new(id: ChartId, labels: Vec<String>, series: Vec<SeriesData>) -> Self {
        let kind = if series.len() > 1 {
            ChartKind::MultiLine
        } else {
            ChartKind::Line
        };
        Self {
            id,
            title: id.title().to_string(),
            kind,
            labels,
            series,
        }
    }
}

/// Serializable dump of every chart, reloadable with the same sequences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartExport {
    pub exported_at: DateTime<Utc>,
    pub charts: Vec<ChartData>,
}

impl ChartExport {
    pub fn file_name(&self) -> String {
        format!(
            "mqtt_dashboard_export_{}.json",
            self.exported_at.format("%Y-%m-%d")
        )
    }
}

/// Format a chart label the way tiles and the log show times
pub fn format_label(time_ms: i64) -> String {
    match Local.timestamp_millis_opt(time_ms).single() {
        Some(local) => local.format("%H:%M:%S").to_string(),
        None => String::from("--:--:--"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_kind_follows_series_count() {
        let single = ChartData::new(
            ChartId::Current,
            vec![],
            vec![SeriesData::new("Current [A]".to_string(), vec![])],
        );
        assert_eq!(single.kind, ChartKind::Line);
        assert_eq!(single.title, "Compressor current");

        let multi = ChartData::new(
            ChartId::Indoor,
            vec![],
            vec![
                SeriesData::new("Room".to_string(), vec![]),
                SeriesData::new("Pipe".to_string(), vec![]),
            ],
        );
        assert_eq!(multi.kind, ChartKind::MultiLine);
    }

    #[test]
    fn test_export_file_name() {
        let export = ChartExport {
            exported_at: Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap(),
            charts: vec![],
        };
        assert_eq!(export.file_name(), "mqtt_dashboard_export_2026-03-14.json");
    }

    #[test]
    fn test_point_serializes_camel_case() {
        let json = serde_json::to_string(&TimeSeriesPoint::new(1000, 21.5)).unwrap();
        assert_eq!(json, r#"{"timeMs":1000,"value":21.5}"#);
    }

    #[test]
    fn test_format_label_shape() {
        let label = format_label(0);
        assert_eq!(label.len(), 8);
        assert_eq!(label.matches(':').count(), 2);
    }
}
