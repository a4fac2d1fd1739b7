use image::{Rgba, RgbaImage};
use tiny_skia::{
    ColorU8, FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pattern, Pixmap, PixmapPaint,
    SpreadMode, Stroke, Transform,
};

use iklayout_core::geometry::Point;
use iklayout_core::layer::FillPattern;

/// Background of an empty canvas.
pub const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Side of the tile fill patterns repeat over; a multiple of every pattern period.
const PATTERN_TILE: u32 = 12;

/// Coordinates beyond this are clamped before path building.
const COORD_LIMIT: f64 = 1e5;

/// Pixel-exact painter over a `tiny_skia` pixmap. All coordinates are canvas
/// pixels; the frame converts to an `RgbaImage` at the boundary.
pub struct Canvas {
    /// `None` for a zero-sized canvas, on which drawing is a no-op.
    pixmap: Option<Pixmap>,
    width: u32,
    height: u32,
}

fn paint_for<'a>(color: [u8; 4]) -> Paint<'a> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = false;
    paint
}

fn clamp(v: f64) -> f32 {
    v.clamp(-COORD_LIMIT, COORD_LIMIT) as f32
}

/// Closed path through `ring`, shifted by `offset` pixels.
fn ring_path(ring: &[Point], offset: f64) -> Option<tiny_skia::Path> {
    let (first, rest) = ring.split_first()?;
    let mut pb = PathBuilder::new();
    pb.move_to(clamp(first.x + offset), clamp(first.y + offset));
    for p in rest {
        pb.line_to(clamp(p.x + offset), clamp(p.y + offset));
    }
    pb.close();
    pb.finish()
}

/// One repeat of `pattern` in `color`, aligned to the canvas origin.
fn pattern_tile(pattern: FillPattern, color: [u8; 4]) -> Option<Pixmap> {
    let mut tile = Pixmap::new(PATTERN_TILE, PATTERN_TILE)?;
    let ink = ColorU8::from_rgba(color[0], color[1], color[2], color[3]).premultiply();
    for (i, px) in tile.pixels_mut().iter_mut().enumerate() {
        let (x, y) = (i as u32 % PATTERN_TILE, i as u32 / PATTERN_TILE);
        if pattern.covers(x, y) {
            *px = ink;
        }
    }
    Some(tile)
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let pixmap = Pixmap::new(width, height).map(|mut pixmap| {
            let [r, g, b, a] = BACKGROUND;
            pixmap.fill(tiny_skia::Color::from_rgba8(r, g, b, a));
            pixmap
        });
        Self {
            pixmap,
            width,
            height,
        }
    }

    /// Paint on top of an existing frame.
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let pixmap = Pixmap::new(width, height).map(|mut pixmap| {
            for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
                let [r, g, b, a] = src.0;
                *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
            }
            pixmap
        });
        Self {
            pixmap,
            width,
            height,
        }
    }

    pub fn into_image(self) -> RgbaImage {
        let Some(pixmap) = self.pixmap else {
            return RgbaImage::new(self.width, self.height);
        };
        let mut image = RgbaImage::new(self.width, self.height);
        for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
            let c = src.demultiply();
            *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        image
    }

    /// Fill a closed ring with the even-odd rule, inking only the pixels
    /// `pattern` covers.
    pub fn fill_ring(&mut self, ring: &[Point], color: [u8; 4], pattern: FillPattern) {
        if ring.len() < 3 || pattern == FillPattern::Outline {
            return;
        }
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        let Some(path) = ring_path(ring, 0.0) else {
            return;
        };

        let tile = match pattern {
            FillPattern::Solid => None,
            _ => pattern_tile(pattern, color),
        };
        let mut paint = paint_for(color);
        if let Some(tile) = &tile {
            paint.shader = Pattern::new(
                tile.as_ref(),
                SpreadMode::Repeat,
                FilterQuality::Nearest,
                1.0,
                Transform::identity(),
            );
        }
        pixmap.fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
    }

    /// Stroke the closed outline of a ring, one pixel wide.
    pub fn stroke_ring(&mut self, ring: &[Point], color: [u8; 4]) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        // Pixel centres sit on half coordinates.
        let Some(path) = ring_path(ring, 0.5) else {
            return;
        };
        let stroke = Stroke {
            width: 1.0,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint_for(color), &stroke, Transform::identity(), None);
    }

    pub fn draw_line(&mut self, a: Point, b: Point, color: [u8; 4]) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        let mut pb = PathBuilder::new();
        pb.move_to(clamp(a.x + 0.5), clamp(a.y + 0.5));
        pb.line_to(clamp(b.x + 0.5), clamp(b.y + 0.5));
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width: 1.0,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint_for(color), &stroke, Transform::identity(), None);
    }

    /// Blend a `width` x `height` coverage mask (one byte per pixel, row
    /// major) in `color`, top left at `(x, y)`. Used for glyph bitmaps.
    pub fn draw_coverage(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        coverage: &[u8],
        color: [u8; 4],
    ) {
        let Some(pixmap) = self.pixmap.as_mut() else {
            return;
        };
        let Some(size) = IntSize::from_wh(width, height) else {
            return;
        };
        if coverage.len() != (width * height) as usize {
            return;
        }
        let mut data = Vec::with_capacity(coverage.len() * 4);
        for &c in coverage {
            let alpha = (color[3] as u32 * c as u32 / 255) as u8;
            let px = ColorU8::from_rgba(color[0], color[1], color[2], alpha).premultiply();
            data.extend_from_slice(&[px.red(), px.green(), px.blue(), px.alpha()]);
        }
        let Some(glyph) = Pixmap::from_vec(data, size) else {
            return;
        };
        pixmap.draw_pixmap(
            x,
            y,
            glyph.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }
}
