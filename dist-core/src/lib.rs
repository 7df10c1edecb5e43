use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading distribution data from the host page.
#[derive(Error, Debug)]
pub enum DistError {
    #[error("invalid distribution json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("interval {index} has non-finite bounds")]
    NonFinite { index: usize },
    #[error("interval {index} ends before it starts ({start} > {end})")]
    Reversed { index: usize, start: f64, end: f64 },
}

/// A visible x-axis window `[from, to)`. Only constructed for finite, non-empty spans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibleRange {
    pub from: f64,
    pub to: f64,
}

impl VisibleRange {
    pub fn new(from: f64, to: f64) -> Option<Self> {
        if from.is_finite() && to.is_finite() && to > from {
            Some(Self { from, to })
        } else {
            None
        }
    }

    pub fn span(&self) -> f64 {
        self.to - self.from
    }

    /// Inclusive on both ends: a marker sitting exactly on `to` is still shown.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.from && x <= self.to
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &VisibleRange) -> VisibleRange {
        VisibleRange {
            from: self.from.min(other.from),
            to: self.to.max(other.to),
        }
    }
}

/// One restart interval: a conflict range and its learnt-clause density per vertical bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalRecord {
    pub confl_start: f64,
    pub confl_end: f64,
    /// Bucket 0 is the bottom of the strip.
    #[serde(default)]
    pub darkness: Vec<f64>,
}

impl IntervalRecord {
    pub fn new(confl_start: f64, confl_end: f64, darkness: Vec<f64>) -> Self {
        Self {
            confl_start,
            confl_end,
            darkness,
        }
    }

    pub fn ends_before(&self, from: f64) -> bool {
        self.confl_end < from
    }

    pub fn starts_after(&self, to: f64) -> bool {
        self.confl_start > to
    }

    pub fn overlaps(&self, range: &VisibleRange) -> bool {
        !self.ends_before(range.from) && !self.starts_after(range.to)
    }

    /// Largest darkness value, never below zero.
    pub fn max_darkness(&self) -> f64 {
        self.darkness
            .iter()
            .copied()
            .filter(|d| d.is_finite())
            .fold(0.0, f64::max)
    }

    /// Highest bucket index whose darkness strictly exceeds `threshold`.
    pub fn highest_bucket_above(&self, threshold: f64) -> Option<usize> {
        self.darkness.iter().rposition(|d| *d > threshold)
    }

    /// Darkness of `bucket` relative to the interval maximum, in `[0, 1]`.
    /// A zero maximum yields zero rather than NaN.
    pub fn relative_darkness(&self, bucket: usize) -> f64 {
        let value = match self.darkness.get(bucket) {
            Some(v) if v.is_finite() && *v > 0.0 => *v,
            _ => return 0.0,
        };
        let max = self.max_darkness();
        if max <= 0.0 {
            0.0
        } else {
            (value / max).clamp(0.0, 1.0)
        }
    }
}

/// Conflict counts at which the solver restarted into simplification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimplificationPoints(pub Vec<f64>);

impl SimplificationPoints {
    pub fn new(points: Vec<f64>) -> Self {
        Self(points)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn within<'a>(&'a self, range: &'a VisibleRange) -> impl Iterator<Item = f64> + 'a {
        self.0.iter().copied().filter(move |p| range.contains(*p))
    }
}

impl From<Vec<f64>> for SimplificationPoints {
    fn from(points: Vec<f64>) -> Self {
        Self(points)
    }
}

/// A clause distribution strip as published by the statistics page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseDistribution {
    pub data: Vec<IntervalRecord>,
    #[serde(rename = "canvasID")]
    pub canvas_id: String,
    #[serde(rename = "blockDivID", default)]
    pub block_div_id: String,
    #[serde(rename = "dataDivID", default)]
    pub data_div_id: String,
    #[serde(rename = "labelDivID", default)]
    pub label_div_id: String,
    /// Clause property shown on the strip, e.g. "size" or "glue".
    #[serde(rename = "lookAt", default)]
    pub look_at: String,
}

impl ClauseDistribution {
    pub fn caption(&self, column: usize) -> String {
        format!(
            "({column}) Newly learnt clause {} distribution. Bottom: 1. Top: max. Black: Many. White: 0.",
            self.look_at
        )
    }

    pub fn validate(&self) -> Result<(), DistError> {
        validate_intervals(&self.data)
    }
}

/// Reject records a renderer could not place on the x-axis.
pub fn validate_intervals(records: &[IntervalRecord]) -> Result<(), DistError> {
    for (index, r) in records.iter().enumerate() {
        if !r.confl_start.is_finite() || !r.confl_end.is_finite() {
            return Err(DistError::NonFinite { index });
        }
        if r.confl_start > r.confl_end {
            return Err(DistError::Reversed {
                index,
                start: r.confl_start,
                end: r.confl_end,
            });
        }
    }
    Ok(())
}

/// Parse a JSON array of `{conflStart, conflEnd, darkness}` records.
pub fn parse_intervals(json: &str) -> Result<Vec<IntervalRecord>, DistError> {
    let records: Vec<IntervalRecord> = serde_json::from_str(json)?;
    validate_intervals(&records)?;
    Ok(records)
}

/// Range covered by all records, if any record spans a non-empty range.
pub fn full_range(records: &[IntervalRecord]) -> Option<VisibleRange> {
    let from = records.iter().map(|r| r.confl_start).fold(f64::INFINITY, f64::min);
    let to = records
        .iter()
        .map(|r| r.confl_end)
        .fold(f64::NEG_INFINITY, f64::max);
    VisibleRange::new(from, to)
}
