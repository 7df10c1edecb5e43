//! Clause distribution heat strips.
//!
//! A strip shows, for every restart interval inside the visible conflict range,
//! how dense each learnt-clause bucket was. Columns follow the x-axis of the
//! linked graphs; rows are buckets, bucket 0 at the bottom.

mod surface;

pub use surface::{PixelSurface, Rgba, StripSurface, DEFAULT_HEIGHT, DEFAULT_WIDTH};

use dist_core::{IntervalRecord, SimplificationPoints, VisibleRange};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Darkness a bucket must exceed to count towards the strip height.
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 20.0;
/// Sub-pixel shift applied to every mapped x-coordinate.
pub const DEFAULT_X_OFFSET: f64 = 0.5;

/// Display tuning for a strip. Every field has a default so hosts may pass `{}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripConfig {
    pub visibility_threshold: f64,
    pub x_offset: f64,
    pub marker_color: Rgba,
    pub background: Rgba,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            x_offset: DEFAULT_X_OFFSET,
            marker_color: Rgba::MARKER,
            background: Rgba::WHITE,
        }
    }
}

/// What a call to [`DistributionStrip::draw_pattern`] put on the surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternSummary {
    /// Number of evenly sized bands the height was split into.
    pub bands: usize,
    /// Filled column spans `[start, end)`, one per painted interval.
    pub spans: Vec<(u32, u32)>,
    /// Columns holding a simplification marker.
    pub markers: Vec<u32>,
}

impl PatternSummary {
    pub fn last_column(&self) -> Option<u32> {
        self.spans
            .iter()
            .filter(|(start, end)| end > start)
            .map(|(_, end)| end - 1)
            .max()
    }
}

/// Map a conflict count to a pixel column, clamped to `[0, width]`.
pub fn column_for(x: f64, from: f64, pixels_per_unit: f64, width: u32, x_offset: f64) -> u32 {
    let px = ((x - from) * pixels_per_unit + x_offset).clamp(0.0, width as f64);
    // NaN casts to 0.
    px.round() as u32
}

/// Grey level for a relative darkness: 255 at 0, 0 at 1.
pub fn grey_level(relative: f64) -> u8 {
    let rel = if relative.is_finite() {
        relative.clamp(0.0, 1.0)
    } else {
        0.0
    };
    (255.0 - rel * 255.0).floor() as u8
}

/// Row span `[top, bottom)` of `bucket` when the height is split into `bands`.
///
/// Bucket 0 is the bottom band. With zero bands the strip degenerates to a
/// single band covering the full height. Buckets at or above `bands` have no
/// height and return `None`.
pub fn band_span(bucket: usize, bands: usize, height: u32) -> Option<(u32, u32)> {
    if bands == 0 {
        return (bucket == 0).then_some((0, height));
    }
    if bucket >= bands {
        return None;
    }
    let step = height as f64 / bands as f64;
    let top = ((bands - bucket - 1) as f64 * step).round() as u32;
    let bottom = ((bands - bucket) as f64 * step).round() as u32;
    Some((top, bottom.min(height)))
}

/// One heat strip: its records, the simplification points of its solver column
/// and display settings.
#[derive(Debug, Clone)]
pub struct DistributionStrip {
    records: Vec<IntervalRecord>,
    points: SimplificationPoints,
    config: StripConfig,
}

impl DistributionStrip {
    pub fn new(
        records: Vec<IntervalRecord>,
        points: impl Into<SimplificationPoints>,
        config: StripConfig,
    ) -> Self {
        Self {
            records,
            points: points.into(),
            config,
        }
    }

    pub fn records(&self) -> &[IntervalRecord] {
        &self.records
    }

    pub fn points(&self) -> &SimplificationPoints {
        &self.points
    }

    pub fn config(&self) -> &StripConfig {
        &self.config
    }

    /// Highest bucket above the visibility threshold among intervals overlapping `[from, to]`.
    pub fn visible_bucket_count(&self, from: f64, to: f64) -> usize {
        let Some(range) = VisibleRange::new(from, to) else {
            return 0;
        };
        self.records
            .iter()
            .filter(|r| r.overlaps(&range))
            .filter_map(|r| r.highest_bucket_above(self.config.visibility_threshold))
            .max()
            .unwrap_or(0)
    }

    /// Repaint `surface` with the intervals overlapping `[from, to]`.
    pub fn draw_pattern(
        &self,
        from: f64,
        to: f64,
        surface: &mut dyn StripSurface,
    ) -> PatternSummary {
        surface.clear(self.config.background);
        let (width, height) = surface.size();
        let Some(range) = VisibleRange::new(from, to) else {
            warn!("strip: blank draw for degenerate range [{from}, {to}]");
            return PatternSummary::default();
        };
        if width == 0 || height == 0 {
            return PatternSummary::default();
        }

        let bands = self.visible_bucket_count(from, to);
        let pixels_per_unit = width as f64 / range.span();
        let mut summary = PatternSummary {
            bands,
            ..PatternSummary::default()
        };

        let mut last_end = 0u32;
        for record in self.records.iter().filter(|r| r.overlaps(&range)) {
            let x_start = last_end;
            let x_end = column_for(
                record.confl_end,
                range.from,
                pixels_per_unit,
                width,
                self.config.x_offset,
            );
            last_end = x_end;
            if x_end <= x_start {
                continue;
            }

            for bucket in 0..record.darkness.len() {
                let Some((y_top, y_bottom)) = band_span(bucket, bands, height) else {
                    continue;
                };
                let level = grey_level(record.relative_darkness(bucket));
                surface.fill_rect(x_start, y_top, x_end, y_bottom, Rgba::grey(level));
            }
            summary.spans.push((x_start, x_end));
        }

        for point in self.points.within(&range) {
            let x = (point - range.from) * pixels_per_unit + self.config.x_offset;
            if x <= 0.0 {
                continue;
            }
            let column = (x.floor() as u32).min(width - 1);
            surface.fill_rect(column, 0, column + 1, height, self.config.marker_color);
            summary.markers.push(column);
        }

        debug!(
            "strip: [{from}, {to}] bands={} spans={} markers={}",
            summary.bands,
            summary.spans.len(),
            summary.markers.len()
        );
        summary
    }
}
