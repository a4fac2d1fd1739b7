use serde::{Deserialize, Serialize};

use iklayout_core::geometry::{BBox, Point};

/// Multiplier applied by one zoom-in or zoom-out step.
pub const ZOOM_STEP: f64 = 2.0;

/// Maps layout coordinates (y up) to canvas pixels (y down).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Center X in layout coordinates.
    pub center_x: f64,
    /// Center Y in layout coordinates.
    pub center_y: f64,
    /// Zoom level (pixels per layout unit).
    pub zoom: f64,
    /// Canvas width in pixels.
    pub canvas_width: f64,
    /// Canvas height in pixels.
    pub canvas_height: f64,
}

impl Viewport {
    pub fn new(canvas_width: f64, canvas_height: f64) -> Self {
        Self {
            center_x: 0.0,
            center_y: 0.0,
            zoom: 1.0,
            canvas_width,
            canvas_height,
        }
    }

    /// Change the canvas size, keeping centre and zoom.
    pub fn resize(&mut self, canvas_width: f64, canvas_height: f64) {
        self.canvas_width = canvas_width;
        self.canvas_height = canvas_height;
    }

    /// Pan the viewport by a delta in screen pixels, dragging the content along.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.center_x -= dx / self.zoom;
        self.center_y += dy / self.zoom;
    }

    /// Zoom in/out keeping the layout point under `(screen_x, screen_y)` fixed.
    pub fn zoom_at(&mut self, screen_x: f64, screen_y: f64, factor: f64) {
        let before = self.screen_to_layout(screen_x, screen_y);

        self.zoom = (self.zoom * factor).clamp(1e-6, 1e9);

        let after = self.screen_to_layout(screen_x, screen_y);
        self.center_x -= after.x - before.x;
        self.center_y -= after.y - before.y;
    }

    /// Zoom around the canvas centre.
    pub fn zoom_centered(&mut self, factor: f64) {
        self.zoom_at(self.canvas_width / 2.0, self.canvas_height / 2.0, factor);
    }

    /// Zoom to fit a bounding box with a 10% margin.
    pub fn fit_bbox(&mut self, bbox: &BBox) {
        let center = bbox.center();
        self.center_x = center.x;
        self.center_y = center.y;

        let width = bbox.width();
        let height = bbox.height();
        let zoom_x = if width > 0.0 { self.canvas_width / width * 0.9 } else { f64::INFINITY };
        let zoom_y = if height > 0.0 { self.canvas_height / height * 0.9 } else { f64::INFINITY };
        let zoom = zoom_x.min(zoom_y);
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        }
    }

    pub fn screen_to_layout(&self, screen_x: f64, screen_y: f64) -> Point {
        Point::new(
            (screen_x - self.canvas_width / 2.0) / self.zoom + self.center_x,
            self.center_y - (screen_y - self.canvas_height / 2.0) / self.zoom,
        )
    }

    pub fn layout_to_screen(&self, p: &Point) -> (f64, f64) {
        (
            (p.x - self.center_x) * self.zoom + self.canvas_width / 2.0,
            self.canvas_height / 2.0 - (p.y - self.center_y) * self.zoom,
        )
    }

    /// Get the visible bounding box in layout coordinates.
    pub fn visible_bounds(&self) -> BBox {
        let half_w = self.canvas_width / (2.0 * self.zoom);
        let half_h = self.canvas_height / (2.0 * self.zoom);
        BBox::new(
            Point::new(self.center_x - half_w, self.center_y - half_h),
            Point::new(self.center_x + half_w, self.center_y + half_h),
        )
    }
}
