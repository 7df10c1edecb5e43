use strip_render::{Rgba, StripSurface};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

/// Strip surface backed by a 2d canvas context. Only the top-left
/// `width x height` area of the canvas is painted.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    width: u32,
    height: u32,
}

impl CanvasSurface {
    pub fn new(
        canvas: HtmlCanvasElement,
        ctx: CanvasRenderingContext2d,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            canvas,
            ctx,
            width,
            height,
        }
    }

    pub fn canvas_element(&self) -> HtmlCanvasElement {
        self.canvas.clone()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

impl StripSurface for CanvasSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: Rgba) {
        self.ctx.set_fill_style_str(&color.css());
        self.ctx
            .fill_rect(0.0, 0.0, self.width as f64, self.height as f64);
    }

    fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgba) {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        self.ctx.set_fill_style_str(&color.css());
        self.ctx.fill_rect(
            x0 as f64,
            y0 as f64,
            (x1 - x0) as f64,
            (y1 - y0) as f64,
        );
    }
}
