// Bounded timeseries buffers - Rolling chart windows with FIFO eviction
use super::channel::ChartId;
use super::telemetry::{format_label, ChartData, SeriesData, TimeSeriesPoint};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use thiserror::Error;

pub const MAX_CHART_POINTS: usize = 100;

#[derive(Error, Debug, PartialEq)]
pub enum ChartError {
    #[error("chart {chart:?} has no series {series}")]
    UnknownSeries { chart: ChartId, series: usize },

    #[error("chart {0:?} is not part of this dashboard")]
    UnknownChart(ChartId),

    #[error("series '{name}' of chart {chart:?} has non-finite or unordered points")]
    InvalidPoints { chart: ChartId, name: String },
}

#[derive(Debug, Clone)]
struct SeriesBuffer {
    name: &'static str,
    points: VecDeque<TimeSeriesPoint>,
}

/// One chart: several series sharing a single label axis
#[derive(Debug, Clone)]
pub struct ChartBuffer {
    id: ChartId,
    series: Vec<SeriesBuffer>,
    max_points: usize,
}

impl ChartBuffer {
    pub fn new(id: ChartId) -> Self {
        Self::with_capacity(id, MAX_CHART_POINTS)
    }

    pub fn with_capacity(id: ChartId, max_points: usize) -> Self {
        let series = id
            .series_names()
            .iter()
            .map(|&name| SeriesBuffer {
                name,
                points: VecDeque::with_capacity(max_points),
            })
            .collect();
        Self {
            id,
            series,
            max_points,
        }
    }

    pub fn id(&self) -> ChartId {
        self.id
    }

    /// Append a point to one series. Returns the stored point, or None when
    /// the value is not finite.
    pub fn append(
        &mut self,
        series_index: usize,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<TimeSeriesPoint>, ChartError> {
        let max_points = self.max_points;
        let series = self
            .series
            .get_mut(series_index)
            .ok_or(ChartError::UnknownSeries {
                chart: self.id,
                series: series_index,
            })?;

        if !value.is_finite() {
            return Ok(None);
        }

        let point = TimeSeriesPoint::at(at, value);
        series.points.push_back(point);
        // The point carries its own timestamp, so label and value leave together
        while series.points.len() > max_points {
            series.points.pop_front();
        }
        Ok(Some(point))
    }

    pub fn clear(&mut self) {
        for series in &mut self.series {
            series.points.clear();
        }
    }

    pub fn series_len(&self, series_index: usize) -> usize {
        self.series
            .get(series_index)
            .map(|s| s.points.len())
            .unwrap_or(0)
    }

    pub fn points(&self, series_index: usize) -> Vec<TimeSeriesPoint> {
        self.series
            .get(series_index)
            .map(|s| s.points.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Shared x-axis: the timestamps of the longest series
    pub fn label_times(&self) -> Vec<i64> {
        self.series
            .iter()
            .max_by_key(|s| s.points.len())
            .map(|s| s.points.iter().map(|p| p.time_ms).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().all(|s| s.points.is_empty())
    }

    pub fn to_chart_data(&self) -> ChartData {
        let labels = self.label_times().into_iter().map(format_label).collect();
        let series = self
            .series
            .iter()
            .map(|s| SeriesData::new(s.name.to_string(), s.points.iter().copied().collect()))
            .collect();
        ChartData::new(self.id, labels, series)
    }

    /// Replace the contents with previously exported data. Series are matched
    /// by position; only the newest `max_points` points of each are kept.
    pub fn restore(&mut self, data: &ChartData) -> Result<(), ChartError> {
        if data.series.len() > self.series.len() {
            return Err(ChartError::UnknownSeries {
                chart: self.id,
                series: self.series.len(),
            });
        }

        for imported in &data.series {
            let ordered = imported
                .points
                .windows(2)
                .all(|pair| pair[0].time_ms <= pair[1].time_ms);
            let finite = imported.points.iter().all(|p| p.value.is_finite());
            if !ordered || !finite {
                return Err(ChartError::InvalidPoints {
                    chart: self.id,
                    name: imported.name.clone(),
                });
            }
        }

        self.clear();
        for (series, imported) in self.series.iter_mut().zip(&data.series) {
            let skip = imported.points.len().saturating_sub(self.max_points);
            series.points.extend(imported.points.iter().skip(skip).copied());
        }
        Ok(())
    }
}

/// The full chart set of a dashboard session
#[derive(Debug, Clone)]
pub struct ChartSet {
    charts: Vec<ChartBuffer>,
}

impl ChartSet {
    pub fn new() -> Self {
        Self {
            charts: ChartId::ALL.iter().map(|id| ChartBuffer::new(*id)).collect(),
        }
    }

    pub fn get(&self, id: ChartId) -> Option<&ChartBuffer> {
        self.charts.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: ChartId) -> Option<&mut ChartBuffer> {
        self.charts.iter_mut().find(|c| c.id == id)
    }

    pub fn clear(&mut self) {
        for chart in &mut self.charts {
            chart.clear();
        }
    }

    pub fn to_chart_data(&self) -> Vec<ChartData> {
        self.charts.iter().map(ChartBuffer::to_chart_data).collect()
    }

    /// All-or-nothing restore of an export
    pub fn restore(&mut self, charts: &[ChartData]) -> Result<(), ChartError> {
        let mut staged = self.clone();
        for data in charts {
            staged
                .get_mut(data.id)
                .ok_or(ChartError::UnknownChart(data.id))?
                .restore(data)?;
        }
        *self = staged;
        Ok(())
    }
}

impl Default for ChartSet {
    fn default() -> Self {
        Self::new()
    }
}
