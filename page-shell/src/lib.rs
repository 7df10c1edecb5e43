use std::cell::RefCell;
use std::collections::BTreeMap;

use chart_sync::RangeListener;
use dist_core::{full_range, ClauseDistribution, DistError, SimplificationPoints, VisibleRange};
use log::debug;
use serde::{Deserialize, Serialize};
use strip_render::{DistributionStrip, PatternSummary, PixelSurface, StripConfig};
use thiserror::Error;

#[cfg(target_arch = "wasm32")]
mod shell;
#[cfg(target_arch = "wasm32")]
pub use shell::PageShell;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("invalid page json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Dist(#[from] DistError),
    #[error("graph {graph} refers to unknown solver column {column}")]
    UnknownColumn { graph: usize, column: usize },
    #[error("no simplification points for distribution column {column}")]
    MissingPoints { column: usize },
}

/// One time-series graph of a solver column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(rename = "dataDivID")]
    pub data_div_id: String,
    #[serde(rename = "labelDivID")]
    pub label_div_id: String,
    #[serde(rename = "blockDivID")]
    pub block_div_id: String,
    /// Series handed to the charting library untouched.
    pub data: serde_json::Value,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub stacked: bool,
    /// Draw error bars.
    #[serde(default)]
    pub noisy: bool,
    pub colnum: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnBlock {
    #[serde(rename = "blockDivID")]
    pub block_div_id: String,
}

/// Everything the statistics page publishes, per solver column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageData {
    pub graphs: Vec<GraphSpec>,
    #[serde(default)]
    pub clause_distributions: Vec<Vec<ClauseDistribution>>,
    #[serde(default)]
    pub simplification_points: Vec<SimplificationPoints>,
    #[serde(default)]
    pub max_confl_restart: Vec<f64>,
    /// Blocks stacked in each portal column, top to bottom.
    #[serde(default)]
    pub columns: Vec<Vec<ColumnBlock>>,
    #[serde(default)]
    pub strip: StripConfig,
}

impl PageData {
    pub fn from_json(json: &str) -> Result<Self, PageError> {
        let page: PageData = serde_json::from_str(json)?;
        page.validate()?;
        Ok(page)
    }

    pub fn validate(&self) -> Result<(), PageError> {
        for (graph, spec) in self.graphs.iter().enumerate() {
            if spec.colnum >= self.simplification_points.len() {
                return Err(PageError::UnknownColumn {
                    graph,
                    column: spec.colnum,
                });
            }
        }
        for (column, dists) in self.clause_distributions.iter().enumerate() {
            if !dists.is_empty() && column >= self.simplification_points.len() {
                return Err(PageError::MissingPoints { column });
            }
            for dist in dists {
                dist.validate()?;
            }
        }
        Ok(())
    }

    pub fn points(&self, column: usize) -> SimplificationPoints {
        self.simplification_points
            .get(column)
            .cloned()
            .unwrap_or_default()
    }

    /// Range a column's strips show before any zoom: `[0, maxConflRestart]`.
    pub fn default_range(&self, column: usize) -> Option<VisibleRange> {
        self.max_confl_restart
            .get(column)
            .and_then(|max| VisibleRange::new(0.0, *max))
    }

    pub fn caption(&self, column: usize, index: usize) -> Option<String> {
        self.clause_distributions
            .get(column)
            .and_then(|dists| dists.get(index))
            .map(|d| d.caption(column))
    }

    /// Portal settings: `"column-<i>"` to the block ids stacked in that column.
    pub fn portal_settings(&self) -> BTreeMap<String, Vec<String>> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, blocks)| {
                (
                    format!("column-{i}"),
                    blocks.iter().map(|b| b.block_div_id.clone()).collect(),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortalOptions {
    pub portal: String,
    pub editor_enabled: bool,
}

impl Default for PortalOptions {
    fn default() -> Self {
        Self {
            portal: "columns".to_string(),
            editor_enabled: true,
        }
    }
}

// --- Charting library options ----------------------------------------------

pub const SERIES_COLORS: [&str; 5] = ["#000000", "#05fa03", "#d03332", "#4e4ea8", "#689696"];
/// Prefix of the x value shown in legends.
pub const X_VALUE_PREFIX: &str = "Conflicts: ";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct XAxisOptions {
    pub pixels_per_label: u32,
    pub include_zero: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AxesOptions {
    pub x: XAxisOptions,
}

/// Static part of a graph's options; callbacks and DOM nodes are attached by the shell.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphOptions {
    pub stacked_graph: bool,
    pub include_zero: bool,
    pub labels: Vec<String>,
    pub axes: AxesOptions,
    pub stroke_width: f64,
    pub highlight_circle_size: f64,
    #[serde(rename = "drawXAxis")]
    pub draw_x_axis: bool,
    #[serde(rename = "drawYAxis")]
    pub draw_y_axis: bool,
    #[serde(rename = "drawXGrid")]
    pub draw_x_grid: bool,
    #[serde(rename = "drawYGrid")]
    pub draw_y_grid: bool,
    pub legend: String,
    pub xlabel: bool,
    pub labels_separate_lines: bool,
    #[serde(rename = "labelsKMB")]
    pub labels_kmb: bool,
    pub draw_points: bool,
    pub point_size: f64,
    pub stroke_style: String,
    pub colors: Vec<String>,
    pub fill_alpha: f64,
    pub error_bars: bool,
}

impl GraphOptions {
    pub fn for_graph(graph: &GraphSpec) -> Self {
        Self {
            stacked_graph: graph.stacked,
            include_zero: graph.stacked,
            labels: graph.labels.clone(),
            axes: AxesOptions {
                x: XAxisOptions {
                    pixels_per_label: 100,
                    include_zero: true,
                },
            },
            stroke_width: 0.3,
            highlight_circle_size: 3.0,
            draw_x_axis: false,
            draw_y_axis: false,
            draw_x_grid: false,
            draw_y_grid: false,
            legend: "always".to_string(),
            xlabel: false,
            labels_separate_lines: true,
            labels_kmb: true,
            draw_points: false,
            point_size: 1.0,
            stroke_style: "white".to_string(),
            colors: SERIES_COLORS.iter().map(|c| c.to_string()).collect(),
            fill_alpha: 0.8,
            error_bars: graph.noisy,
        }
    }
}

pub fn format_x_value(x: f64) -> String {
    format!("{X_VALUE_PREFIX}{x}")
}

// --- Graph underlay ---------------------------------------------------------

/// Width of the simplification bars behind a graph.
pub const UNDERLAY_MARKER_WIDTH: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Bars spanning the plot area at each simplification point that lands inside it.
pub fn underlay_markers(
    points: &SimplificationPoints,
    area: PlotArea,
    to_dom_x: impl Fn(f64) -> f64,
) -> Vec<MarkerRect> {
    points
        .as_slice()
        .iter()
        .map(|p| to_dom_x(*p))
        .filter(|x| x.is_finite() && *x >= area.x && *x <= area.x + area.w)
        .map(|x| MarkerRect {
            x,
            y: area.y,
            width: UNDERLAY_MARKER_WIDTH,
            height: area.h,
        })
        .collect()
}

// --- Strips -----------------------------------------------------------------

/// Where a strip gets painted.
pub trait StripTarget {
    fn draw_pattern(&mut self, from: f64, to: f64) -> PatternSummary;
}

impl StripTarget for chart_frontend::StripView {
    fn draw_pattern(&mut self, from: f64, to: f64) -> PatternSummary {
        chart_frontend::StripView::draw_pattern(self, from, to)
    }
}

/// A strip painted into memory; used for previews and tests.
pub struct OffscreenStrip {
    pub strip: DistributionStrip,
    pub surface: PixelSurface,
}

impl OffscreenStrip {
    pub fn new(strip: DistributionStrip) -> Self {
        Self {
            strip,
            surface: PixelSurface::default(),
        }
    }
}

impl StripTarget for OffscreenStrip {
    fn draw_pattern(&mut self, from: f64, to: f64) -> PatternSummary {
        self.strip.draw_pattern(from, to, &mut self.surface)
    }
}

struct PlacedStrip<T> {
    column: usize,
    default_range: Option<VisibleRange>,
    target: T,
}

/// All strips of a page; redrawn together whenever the shared range moves.
pub struct StripSet<T> {
    strips: RefCell<Vec<PlacedStrip<T>>>,
}

impl<T: StripTarget> StripSet<T> {
    /// Build one target per distribution, each carrying its column's simplification points.
    pub fn build<E>(
        page: &PageData,
        mut make: impl FnMut(&ClauseDistribution, DistributionStrip) -> Result<T, E>,
    ) -> Result<Self, E> {
        let mut strips = Vec::new();
        for (column, dists) in page.clause_distributions.iter().enumerate() {
            for dist in dists {
                let strip = DistributionStrip::new(
                    dist.data.clone(),
                    page.points(column),
                    page.strip.clone(),
                );
                let default_range = page
                    .default_range(column)
                    .or_else(|| full_range(&dist.data));
                strips.push(PlacedStrip {
                    column,
                    default_range,
                    target: make(dist, strip)?,
                });
            }
        }
        Ok(Self {
            strips: RefCell::new(strips),
        })
    }

    pub fn len(&self) -> usize {
        self.strips.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strips.borrow().is_empty()
    }

    /// Draw every strip at `range`, or at its column default when `None`.
    pub fn draw_all(&self, range: Option<(f64, f64)>) -> Vec<PatternSummary> {
        let mut strips = self.strips.borrow_mut();
        let summaries: Vec<PatternSummary> = strips
            .iter_mut()
            .map(|placed| {
                let (from, to) = range
                    .or_else(|| placed.default_range.map(|r| (r.from, r.to)))
                    .unwrap_or((0.0, 0.0));
                placed.target.draw_pattern(from, to)
            })
            .collect();
        debug!("strips: redrew {} at {range:?}", summaries.len());
        summaries
    }

    /// Visit the strips of one column.
    pub fn with_column<R>(&self, column: usize, mut f: impl FnMut(&mut T) -> R) -> Vec<R> {
        self.strips
            .borrow_mut()
            .iter_mut()
            .filter(|p| p.column == column)
            .map(|p| f(&mut p.target))
            .collect()
    }
}

impl<T: StripTarget> RangeListener for StripSet<T> {
    fn on_range(&self, from: f64, to: f64) {
        self.draw_all(Some((from, to)));
    }

    fn on_reset(&self) {
        self.draw_all(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_sync::{LinkedChart, SyncGroup};
    use std::cell::Cell;
    use std::rc::Rc;
    use strip_render::Rgba;

    const PAGE: &str = r#"{
        "graphs": [
            {"dataDivID": "d0", "labelDivID": "l0", "blockDivID": "b0",
             "data": [[0, 1], [10, 2]], "labels": ["confl", "restarts"],
             "stacked": true, "noisy": false, "colnum": 0},
            {"dataDivID": "d1", "labelDivID": "l1", "blockDivID": "b1",
             "data": [[0, 5]], "labels": ["confl", "props"],
             "noisy": true, "colnum": 1}
        ],
        "clauseDistributions": [
            [{"data": [{"conflStart": 0, "conflEnd": 100, "darkness": [10, 0]}],
              "canvasID": "c0", "blockDivID": "s0", "lookAt": "size"}],
            [{"data": [{"conflStart": 0, "conflEnd": 50, "darkness": [40]}],
              "canvasID": "c1", "blockDivID": "s1", "lookAt": "glue"}]
        ],
        "simplificationPoints": [[50, 100], [25]],
        "maxConflRestart": [100, 50],
        "columns": [
            [{"blockDivID": "b0"}, {"blockDivID": "s0"}],
            [{"blockDivID": "b1"}, {"blockDivID": "s1"}]
        ]
    }"#;

    fn offscreen(page: &PageData) -> StripSet<OffscreenStrip> {
        StripSet::build(page, |_, strip| Ok::<_, PageError>(OffscreenStrip::new(strip))).unwrap()
    }

    #[test]
    fn page_json_loads() {
        let page = PageData::from_json(PAGE).unwrap();
        assert_eq!(page.graphs.len(), 2);
        assert_eq!(page.clause_distributions[1][0].canvas_id, "c1");
        assert_eq!(page.points(0).as_slice(), &[50.0, 100.0]);
        assert!(page.points(9).is_empty());
        assert_eq!(page.strip, StripConfig::default());
    }

    #[test]
    fn graph_with_unknown_column_is_rejected() {
        let mut page = PageData::from_json(PAGE).unwrap();
        page.graphs[1].colnum = 4;
        match page.validate() {
            Err(PageError::UnknownColumn { graph, column }) => assert_eq!((graph, column), (1, 4)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn default_range_comes_from_max_conflicts() {
        let page = PageData::from_json(PAGE).unwrap();
        assert_eq!(page.default_range(1), VisibleRange::new(0.0, 50.0));
        assert_eq!(page.default_range(2), None);
    }

    #[test]
    fn portal_settings_list_blocks_per_column() {
        let page = PageData::from_json(PAGE).unwrap();
        let settings = page.portal_settings();
        assert_eq!(settings["column-0"], vec!["b0", "s0"]);
        assert_eq!(settings["column-1"], vec!["b1", "s1"]);
        let opts = serde_json::to_value(PortalOptions::default()).unwrap();
        assert_eq!(opts, serde_json::json!({"portal": "columns", "editorEnabled": true}));
    }

    #[test]
    fn graph_options_follow_graph_flags() {
        let page = PageData::from_json(PAGE).unwrap();
        let stacked = serde_json::to_value(GraphOptions::for_graph(&page.graphs[0])).unwrap();
        assert_eq!(stacked["stackedGraph"], true);
        assert_eq!(stacked["includeZero"], true);
        assert_eq!(stacked["errorBars"], false);
        assert_eq!(stacked["labelsKMB"], true);
        assert_eq!(stacked["axes"]["x"]["pixelsPerLabel"], 100);
        let noisy = serde_json::to_value(GraphOptions::for_graph(&page.graphs[1])).unwrap();
        assert_eq!(noisy["stackedGraph"], false);
        assert_eq!(noisy["errorBars"], true);
        assert_eq!(noisy["colors"][1], "#05fa03");
        assert_eq!(format_x_value(1200.0), "Conflicts: 1200");
    }

    #[test]
    fn captions_name_column_and_property() {
        let page = PageData::from_json(PAGE).unwrap();
        let caption = page.caption(1, 0).unwrap();
        assert!(caption.starts_with("(1) Newly learnt clause glue distribution."));
        assert!(page.caption(1, 3).is_none());
    }

    #[test]
    fn underlay_skips_points_off_the_plot() {
        let points = SimplificationPoints::new(vec![-10.0, 0.0, 50.0, 200.0]);
        let area = PlotArea {
            x: 0.0,
            y: 5.0,
            w: 100.0,
            h: 40.0,
        };
        let rects = underlay_markers(&points, area, |x| x);
        assert_eq!(rects.len(), 2);
        assert_eq!(
            rects[1],
            MarkerRect {
                x: 50.0,
                y: 5.0,
                width: UNDERLAY_MARKER_WIDTH,
                height: 40.0,
            }
        );
    }

    #[test]
    fn strips_draw_at_column_defaults() {
        let page = PageData::from_json(PAGE).unwrap();
        let strips = offscreen(&page);
        assert_eq!(strips.len(), 2);
        let summaries = strips.draw_all(None);
        assert_eq!(summaries[0].last_column(), Some(414));
        assert_eq!(summaries[1].last_column(), Some(414));
        // Column 0 has points 50 and 100 inside [0, 100].
        assert_eq!(summaries[0].markers.len(), 2);
        assert_eq!(summaries[1].markers.len(), 1);
    }

    struct FixedChart {
        range: Cell<(f64, f64)>,
    }

    impl LinkedChart for FixedChart {
        fn x_range(&self) -> (f64, f64) {
            self.range.get()
        }
        fn set_date_window(&self, range: (f64, f64)) {
            self.range.set(range);
        }
        fn set_roll_period(&self, _period: u32) {}
    }

    #[test]
    fn zoom_redraws_strips_through_group() {
        let page = PageData::from_json(PAGE).unwrap();
        let strips = Rc::new(offscreen(&page));
        let group = SyncGroup::new();
        group.add_listener(strips.clone());
        let a = Rc::new(FixedChart {
            range: Cell::new((0.0, 100.0)),
        });
        let b = Rc::new(FixedChart {
            range: Cell::new((0.0, 100.0)),
        });
        let id = group.add_chart(a.clone());
        group.add_chart(b.clone());

        a.range.set((60.0, 80.0));
        group.on_draw(id, false);

        assert_eq!(b.range.get(), (60.0, 80.0));
        let whites = strips.with_column(1, |s| s.surface.pixel(10, 10));
        // Column 1 data ends at 50, so nothing is painted in [60, 80].
        assert_eq!(whites, vec![Some(Rgba::WHITE)]);
        let blacks = strips.with_column(0, |s| s.surface.pixel(10, 10));
        assert_eq!(blacks, vec![Some(Rgba::BLACK)]);
    }

    #[test]
    fn reset_zoom_returns_strips_to_column_defaults() {
        let page = PageData::from_json(PAGE).unwrap();
        let strips = Rc::new(offscreen(&page));
        let group = SyncGroup::new();
        group.add_listener(strips.clone());
        let a = Rc::new(FixedChart {
            range: Cell::new((0.0, 100.0)),
        });
        let id = group.add_chart(a.clone());
        group.on_draw(id, true);

        a.range.set((60.0, 80.0));
        group.on_draw(id, false);
        assert_eq!(group.reset_zoom(), VisibleRange::new(0.0, 100.0));

        // Column 1 is back at [0, 50], so its data reaches the right edge.
        let right_edge = strips.with_column(1, |s| s.surface.pixel(400, 10));
        assert_eq!(right_edge, vec![Some(Rgba::BLACK)]);
        let left = strips.with_column(0, |s| s.surface.pixel(10, 10));
        assert_eq!(left, vec![Some(Rgba::BLACK)]);
    }
}
