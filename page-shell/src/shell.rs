use std::cell::Cell;
use std::rc::Rc;

use chart_frontend::StripView;
use chart_sync::{ChartId, LinkedChart, SyncGroup, SyncOutcome};
use js_sys::{Array, Function, Object, Reflect};
use log::{debug, warn};
use serde::Serialize;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{window, CanvasRenderingContext2d, Document};

use crate::{
    format_x_value, underlay_markers, GraphOptions, PageData, PlotArea, PortalOptions, StripSet,
};

/// Fill used for simplification bars behind graphs.
const UNDERLAY_FILL: &str = "rgb(105, 105, 185)";

fn document() -> Result<Document, JsValue> {
    window()
        .ok_or_else(|| JsValue::from_str("no window"))?
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&text)
}

fn call_method(target: &JsValue, name: &str, args: &Array) -> Result<JsValue, JsValue> {
    let method: Function = Reflect::get(target, &JsValue::from_str(name))?
        .dyn_into()
        .map_err(|_| JsValue::from_str("not a function"))?;
    method.apply(target, args)
}

/// A graph object of the charting library, driven through its JS methods.
struct JsGraph {
    graph: JsValue,
}

impl JsGraph {
    fn update_options(&self, key: &str, value: &JsValue) {
        let opts = Object::new();
        let updated = Reflect::set(&opts, &JsValue::from_str(key), value)
            .and_then(|_| call_method(&self.graph, "updateOptions", &Array::of1(&opts)));
        if let Err(err) = updated {
            web_sys::console::error_1(&err);
        }
    }

    fn to_dom_x(&self, x: f64) -> f64 {
        call_method(
            &self.graph,
            "toDomCoords",
            &Array::of2(&JsValue::from_f64(x), &JsValue::from_f64(-20.0)),
        )
        .ok()
        .and_then(|coords| Reflect::get(&coords, &JsValue::from_f64(0.0)).ok())
        .and_then(|x| x.as_f64())
        .unwrap_or(f64::NAN)
    }
}

impl LinkedChart for JsGraph {
    fn x_range(&self) -> (f64, f64) {
        let range = match call_method(&self.graph, "xAxisRange", &Array::new()) {
            Ok(r) => Array::from(&r),
            Err(_) => return (f64::NAN, f64::NAN),
        };
        (
            range.get(0).as_f64().unwrap_or(f64::NAN),
            range.get(1).as_f64().unwrap_or(f64::NAN),
        )
    }

    fn set_date_window(&self, range: (f64, f64)) {
        let window = Array::of2(&JsValue::from_f64(range.0), &JsValue::from_f64(range.1));
        self.update_options("dateWindow", &window);
    }

    fn set_roll_period(&self, period: u32) {
        self.update_options("rollPeriod", &JsValue::from_f64(period as f64));
    }
}

/// Page controller: strips, linked graphs and the portal layout.
#[wasm_bindgen]
pub struct PageShell {
    page: Rc<PageData>,
    group: Rc<SyncGroup>,
    strips: Rc<StripSet<StripView>>,
    graphs: Vec<Rc<JsGraph>>,
    portal: Option<JsValue>,
}

#[wasm_bindgen]
impl PageShell {
    /// Bind every distribution strip to its canvas. The canvases must already exist.
    #[wasm_bindgen(constructor)]
    pub fn new(page_json: &str) -> Result<PageShell, JsValue> {
        let page = PageData::from_json(page_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        let strips =
            StripSet::build(&page, |dist, strip| StripView::attach(&dist.canvas_id, strip))?;
        let strips = Rc::new(strips);
        let group = Rc::new(SyncGroup::new());
        group.add_listener(strips.clone());
        debug!(
            "page: {} graphs, {} strips",
            page.graphs.len(),
            strips.len()
        );
        Ok(PageShell {
            page: Rc::new(page),
            group,
            strips,
            graphs: Vec::new(),
            portal: None,
        })
    }

    /// Build graphs, draw strips at their default ranges and lay out the portal.
    /// Calling it again replaces the graphs of the previous call.
    pub fn do_all(&mut self) -> Result<(), JsValue> {
        self.unlink_graphs();
        self.draw_all_graphs()?;
        self.draw_all_dists();
        self.create_portal()
    }

    /// Draw every strip at its column's full conflict range.
    pub fn draw_all_dists(&self) {
        self.strips.draw_all(None);
    }

    /// Draw every strip at `[from, to]`.
    pub fn draw_all_dists_at(&self, from: f64, to: f64) {
        self.strips.draw_all(Some((from, to)));
    }

    /// Options object for graph `index`, including its callbacks.
    pub fn graph_options(&self, index: usize) -> Result<JsValue, JsValue> {
        let spec = self
            .page
            .graphs
            .get(index)
            .ok_or_else(|| JsValue::from_str("graph index out of range"))?;
        let opts = to_js(&GraphOptions::for_graph(spec))?;

        let labels_div = document()?.get_element_by_id(&spec.label_div_id);
        if let Some(div) = labels_div {
            Reflect::set(&opts, &JsValue::from_str("labelsDiv"), &div)?;
        }

        let formatter = Closure::<dyn Fn(f64) -> String>::wrap(Box::new(format_x_value));
        let axes = Reflect::get(&opts, &JsValue::from_str("axes"))?;
        let x_axis = Reflect::get(&axes, &JsValue::from_str("x"))?;
        Reflect::set(
            &x_axis,
            &JsValue::from_str("valueFormatter"),
            &formatter.into_js_value(),
        )?;
        Ok(opts)
    }

    /// Construct each page graph through the global `Dygraph` constructor and link them.
    pub fn draw_all_graphs(&mut self) -> Result<(), JsValue> {
        let ctor: Function = Reflect::get(&js_sys::global(), &JsValue::from_str("Dygraph"))?
            .dyn_into()
            .map_err(|_| JsValue::from_str("Dygraph is not loaded"))?;
        let doc = document()?;

        for index in 0..self.page.graphs.len() {
            let spec = &self.page.graphs[index];
            let opts = self.graph_options(index)?;
            let id_cell: Rc<Cell<Option<ChartId>>> = Rc::new(Cell::new(None));

            let points = self.page.points(spec.colnum);
            let underlay = Closure::<dyn FnMut(CanvasRenderingContext2d, JsValue, JsValue)>::wrap(
                Box::new(move |ctx: CanvasRenderingContext2d, area: JsValue, g: JsValue| {
                    let area = plot_area(&area);
                    let graph = JsGraph { graph: g };
                    paint_underlay(&ctx, &points, area, &graph);
                }),
            );
            Reflect::set(&opts, &JsValue::from_str("underlayCallback"), underlay.as_ref())?;
            underlay.forget();

            let group = self.group.clone();
            let cb_id = id_cell.clone();
            let draw = Closure::<dyn FnMut(JsValue, bool)>::wrap(Box::new(
                move |_me: JsValue, initial: bool| {
                    // None while the constructor is still running.
                    if let Some(id) = cb_id.get() {
                        group.on_draw(id, initial);
                    }
                },
            ));
            Reflect::set(&opts, &JsValue::from_str("drawCallback"), draw.as_ref())?;
            draw.forget();

            let div = doc
                .get_element_by_id(&spec.data_div_id)
                .ok_or_else(|| JsValue::from_str("graph div not found"))?;
            let data = to_js(&spec.data)?;
            let graph = Reflect::construct(&ctor, &Array::of3(&div, &data, &opts))?;

            let handle = Rc::new(JsGraph { graph });
            let id = self.group.add_chart(handle.clone());
            id_cell.set(Some(id));
            self.group.on_draw(id, true);
            self.graphs.push(handle);
        }
        Ok(())
    }

    /// Drop the graphs of an earlier build. Their callbacks keep the old group,
    /// which no longer knows any chart.
    fn unlink_graphs(&mut self) {
        if self.graphs.is_empty() {
            return;
        }
        debug!("page: replacing {} graphs", self.graphs.len());
        self.group.clear();
        self.group = Rc::new(SyncGroup::new());
        self.group.add_listener(self.strips.clone());
        self.graphs.clear();
    }

    /// Forward a graph's draw callback; returns true when the range was propagated.
    pub fn on_draw(&self, chart_id: usize, initial: bool) -> bool {
        matches!(
            self.group.on_draw(chart_id, initial),
            SyncOutcome::Propagated { .. }
        )
    }

    pub fn set_roll_period(&self, period: u32) {
        self.group.set_roll_period(period);
    }

    /// Zoom every graph back out to its first range.
    pub fn reset_zoom(&self) -> bool {
        self.group.reset_zoom().is_some()
    }

    pub fn caption(&self, column: usize, index: usize) -> Option<String> {
        self.page.caption(column, index)
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    /// The portal widget instance, `undefined` before [`PageShell::create_portal`].
    pub fn portal(&self) -> JsValue {
        self.portal.clone().unwrap_or(JsValue::UNDEFINED)
    }

    /// Lay out the blocks with the global `Portal` widget.
    pub fn create_portal(&mut self) -> Result<(), JsValue> {
        let portal_ctor = Reflect::get(&js_sys::global(), &JsValue::from_str("Portal"))?;
        let ctor: Function = match portal_ctor.dyn_into() {
            Ok(f) => f,
            Err(_) => {
                warn!("page: Portal widget not loaded, blocks keep document order");
                return Ok(());
            }
        };
        let settings = to_js(&self.page.portal_settings())?;
        let options = to_js(&PortalOptions::default())?;
        let portal = Reflect::construct(&ctor, &Array::of3(&settings, &options, &Object::new()))?;
        self.portal = Some(portal);
        Ok(())
    }
}

fn plot_area(area: &JsValue) -> PlotArea {
    let field = |name: &str| {
        Reflect::get(area, &JsValue::from_str(name))
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    };
    PlotArea {
        x: field("x"),
        y: field("y"),
        w: field("w"),
        h: field("h"),
    }
}

fn paint_underlay(
    ctx: &CanvasRenderingContext2d,
    points: &dist_core::SimplificationPoints,
    area: PlotArea,
    graph: &JsGraph,
) {
    ctx.set_fill_style_str(UNDERLAY_FILL);
    for rect in underlay_markers(points, area, |x| graph.to_dom_x(x)) {
        ctx.fill_rect(rect.x, rect.y, rect.width, rect.height);
    }
}
