use std::cell::RefCell;
use std::rc::Rc;

use dist_core::{parse_intervals, SimplificationPoints};
use log::debug;
use strip_render::{
    DistributionStrip, PatternSummary, StripConfig, DEFAULT_HEIGHT, DEFAULT_WIDTH,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

mod canvas;
mod logging;

pub use canvas::CanvasSurface;
pub use logging::{init_logging, parse_level};

/// Painted area for a canvas of the given size: the page strip size, shrunk to fit.
pub fn strip_extent(canvas_width: u32, canvas_height: u32) -> (u32, u32) {
    (
        canvas_width.min(DEFAULT_WIDTH),
        canvas_height.min(DEFAULT_HEIGHT),
    )
}

/// Decode an optional JSON strip config; `None` or blank means defaults.
pub fn parse_config(json: Option<&str>) -> Result<StripConfig, String> {
    match json.map(str::trim) {
        None | Some("") => Ok(StripConfig::default()),
        Some(text) => serde_json::from_str(text).map_err(|e| e.to_string()),
    }
}

/// Look up a canvas element by id and open its 2d context.
pub fn canvas_by_id(
    canvas_id: &str,
) -> Result<(HtmlCanvasElement, CanvasRenderingContext2d), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;
    let element = document
        .get_element_by_id(canvas_id)
        .ok_or_else(|| JsValue::from_str("canvas not found"))?;
    let canvas: HtmlCanvasElement = element
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| JsValue::from_str("element is not a canvas"))?;
    let ctx = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("no 2d context"))?
        .dyn_into::<CanvasRenderingContext2d>()?;
    Ok((canvas, ctx))
}

/// A strip bound to its canvas, remembering the last range it showed.
pub struct StripView {
    canvas_id: String,
    strip: DistributionStrip,
    surface: CanvasSurface,
    last_range: Option<(f64, f64)>,
}

impl StripView {
    pub fn attach(canvas_id: &str, strip: DistributionStrip) -> Result<Self, JsValue> {
        let (canvas, ctx) = canvas_by_id(canvas_id)?;
        let (width, height) = strip_extent(canvas.width(), canvas.height());
        Ok(Self {
            canvas_id: canvas_id.to_string(),
            strip,
            surface: CanvasSurface::new(canvas, ctx, width, height),
            last_range: None,
        })
    }

    pub fn canvas_id(&self) -> &str {
        &self.canvas_id
    }

    pub fn strip(&self) -> &DistributionStrip {
        &self.strip
    }

    pub fn draw_pattern(&mut self, from: f64, to: f64) -> PatternSummary {
        self.last_range = Some((from, to));
        self.strip.draw_pattern(from, to, &mut self.surface)
    }

    /// Repaint at the last drawn range, if any.
    pub fn redraw(&mut self) -> Option<PatternSummary> {
        let (from, to) = self.last_range?;
        Some(self.strip.draw_pattern(from, to, &mut self.surface))
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let canvas = self.surface.canvas_element();
        let (w, h) = (width.min(canvas.width()), height.min(canvas.height()));
        self.surface.resize(w, h);
        debug!("strip {}: painted area now {w}x{h}", self.canvas_id);
    }
}

/// Public strip handle for JS.
#[wasm_bindgen]
pub struct DistributionStripHandle {
    inner: Rc<RefCell<StripView>>,
}

#[wasm_bindgen]
impl DistributionStripHandle {
    /// `records_json` is an array of `{conflStart, conflEnd, darkness}`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        canvas_id: &str,
        records_json: &str,
        simplification_points: Vec<f64>,
        config_json: Option<String>,
    ) -> Result<DistributionStripHandle, JsValue> {
        let records = parse_intervals(records_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let config = parse_config(config_json.as_deref()).map_err(|e| JsValue::from_str(&e))?;
        let strip = DistributionStrip::new(
            records,
            SimplificationPoints::new(simplification_points),
            config,
        );
        let view = StripView::attach(canvas_id, strip)?;
        Ok(DistributionStripHandle {
            inner: Rc::new(RefCell::new(view)),
        })
    }

    /// Repaint for the visible range `[from, to]`.
    pub fn draw_pattern(&self, from: f64, to: f64) {
        self.inner.borrow_mut().draw_pattern(from, to);
    }

    pub fn visible_bucket_count(&self, from: f64, to: f64) -> u32 {
        self.inner.borrow().strip().visible_bucket_count(from, to) as u32
    }

    /// Change the painted area and repaint the last range.
    pub fn resize(&self, width: u32, height: u32) {
        let mut inner = self.inner.borrow_mut();
        inner.resize(width, height);
        inner.redraw();
    }
}
