//! Figure canvas with zoom buttons drawn on the image and an info box overlay.

use std::cell::Cell;
use std::rc::Rc;

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use iklayout_core::geometry::Point;
use iklayout_core::layer::FillPattern;
use iklayout_renderer::raster::Canvas;

use crate::adapter::Raster;
use crate::error::ViewerError;
use crate::event::{ChromeButton, SurfaceEvent};
use crate::overlay::{InfoBox, OverlayHandle};
use crate::translate::DoubleClickPolicy;

use super::figure::CanvasEvent;
use super::{send, DisplaySurface, EventChannel};

const BUTTON_SIZE: f64 = 28.0;
const BUTTON_MARGIN: f64 = 8.0;
const BUTTON_FILL: [u8; 4] = [64, 64, 64, 220];
const GLYPH_COLOR: [u8; 4] = [240, 240, 240, 255];
const INFO_FILL: [u8; 4] = [0, 0, 0, 160];
const INFO_EDGE: [u8; 4] = [255, 255, 0, 255];

/// Monospace face for info box labels.
const LABEL_FONT: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");
const LABEL_PX: f32 = 12.0;

const BUTTONS: [ChromeButton; 3] = [ChromeButton::ZoomIn, ChromeButton::ZoomOut, ChromeButton::Reset];

/// Top-left corner of `button` on a canvas `width` pixels wide. Buttons are
/// stacked down the right edge.
fn button_origin(button: ChromeButton, width: u32) -> (f64, f64) {
    let slot = match button {
        ChromeButton::ZoomIn => 0.0,
        ChromeButton::ZoomOut => 1.0,
        ChromeButton::Reset => 2.0,
    };
    (
        width as f64 - BUTTON_SIZE - BUTTON_MARGIN,
        BUTTON_MARGIN + slot * (BUTTON_SIZE + BUTTON_MARGIN),
    )
}

fn button_at(x: f64, y: f64, width: u32) -> Option<ChromeButton> {
    BUTTONS.into_iter().find(|&button| {
        let (bx, by) = button_origin(button, width);
        x >= bx && x < bx + BUTTON_SIZE && y >= by && y < by + BUTTON_SIZE
    })
}

fn rect(x: f64, y: f64, w: f64, h: f64) -> Vec<Point> {
    vec![
        Point::new(x, y),
        Point::new(x + w, y),
        Point::new(x + w, y + h),
        Point::new(x, y + h),
    ]
}

fn draw_button(canvas: &mut Canvas, button: ChromeButton, width: u32) {
    let (x, y) = button_origin(button, width);
    let ring = rect(x, y, BUTTON_SIZE, BUTTON_SIZE);
    canvas.fill_ring(&ring, BUTTON_FILL, FillPattern::Solid);
    canvas.stroke_ring(&ring, GLYPH_COLOR);

    let (cx, cy) = (x + BUTTON_SIZE / 2.0, y + BUTTON_SIZE / 2.0);
    let arm = BUTTON_SIZE / 4.0;
    match button {
        ChromeButton::ZoomIn => {
            canvas.draw_line(Point::new(cx - arm, cy), Point::new(cx + arm, cy), GLYPH_COLOR);
            canvas.draw_line(Point::new(cx, cy - arm), Point::new(cx, cy + arm), GLYPH_COLOR);
        }
        ChromeButton::ZoomOut => {
            canvas.draw_line(Point::new(cx - arm, cy), Point::new(cx + arm, cy), GLYPH_COLOR);
        }
        ChromeButton::Reset => {
            canvas.stroke_ring(&rect(cx - arm, cy - arm, 2.0 * arm, 2.0 * arm), GLYPH_COLOR);
        }
    }
}

fn load_label_font() -> Option<Font> {
    match Font::from_bytes(LABEL_FONT, FontSettings::default()) {
        Ok(font) => Some(font),
        Err(e) => {
            log::warn!("Label font unavailable, info boxes drawn without text: {}", e);
            None
        }
    }
}

/// Draw the label lines, left aligned, as a block centred on the box's label
/// centre.
fn draw_label(canvas: &mut Canvas, font: &Font, info: &InfoBox) {
    let mut layout: Layout = Layout::new(CoordinateSystem::PositiveYDown);
    layout.reset(&LayoutSettings::default());
    layout.append(&[font], &TextStyle::new(&info.label(), LABEL_PX, 0));

    let glyphs = layout.glyphs();
    let left = glyphs.iter().map(|g| g.x).fold(f32::INFINITY, f32::min);
    let right = glyphs
        .iter()
        .map(|g| g.x + g.width as f32)
        .fold(f32::NEG_INFINITY, f32::max);
    if !left.is_finite() || !right.is_finite() {
        return;
    }
    let (cx, cy) = info.label_center();
    let dx = cx as f32 - (left + right) / 2.0;
    let dy = cy as f32 - layout.height() / 2.0;

    for glyph in glyphs {
        if glyph.width == 0 || glyph.height == 0 {
            continue;
        }
        let (metrics, coverage) = font.rasterize_config(glyph.key);
        canvas.draw_coverage(
            (glyph.x + dx).round() as i32,
            (glyph.y + dy).round() as i32,
            metrics.width as u32,
            metrics.height as u32,
            &coverage,
            GLYPH_COLOR,
        );
    }
}

fn draw_info(canvas: &mut Canvas, font: Option<&Font>, info: &InfoBox) {
    let ring = rect(info.x, info.y, info.width, info.height);
    canvas.fill_ring(&ring, INFO_FILL, FillPattern::Solid);
    canvas.stroke_ring(&ring, INFO_EDGE);
    if let Some(font) = font {
        draw_label(canvas, font, info);
    }
}

/// Host-side handle. A press on a button becomes a button click and the
/// release that ends that press is swallowed, wherever it lands, so the
/// renderer never sees a half click. Every other event is forwarded, even
/// over a button.
#[derive(Debug, Clone)]
pub struct ChromeEvents {
    tx: UnboundedSender<SurfaceEvent>,
    dims: Rc<Cell<(u32, u32)>>,
    /// Button under the press that is still held.
    pressed: Rc<Cell<Option<ChromeButton>>>,
}

impl ChromeEvents {
    pub fn emit(&self, event: CanvasEvent) -> Result<(), ViewerError> {
        let width = self.dims.get().0;
        match event {
            CanvasEvent::ButtonPress { .. } => {
                let hit = event.position().and_then(|(x, y)| button_at(x, y, width));
                if let Some(button) = hit {
                    self.pressed.set(Some(button));
                    return send(&self.tx, SurfaceEvent::Button(button));
                }
            }
            CanvasEvent::ButtonRelease { .. } => {
                if self.pressed.take().is_some() {
                    return Ok(());
                }
            }
            _ => {}
        }
        match event.to_pointer() {
            Some(pointer) => send(&self.tx, SurfaceEvent::Pointer(pointer)),
            None => Ok(()),
        }
    }
}

pub struct ChromeCanvas {
    dims: Rc<Cell<(u32, u32)>>,
    pressed: Rc<Cell<Option<ChromeButton>>>,
    font: Option<Font>,
    base: Option<Raster>,
    image: Option<Raster>,
    overlays: Vec<(OverlayHandle, InfoBox)>,
    next_overlay: u64,
    double_click: DoubleClickPolicy,
    events: EventChannel,
}

impl ChromeCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dims: Rc::new(Cell::new((width, height))),
            pressed: Rc::new(Cell::new(None)),
            font: load_label_font(),
            base: None,
            image: None,
            overlays: Vec::new(),
            next_overlay: 0,
            double_click: DoubleClickPolicy::Forward,
            events: EventChannel::new(),
        }
    }

    pub fn with_double_click(mut self, policy: DoubleClickPolicy) -> Self {
        self.double_click = policy;
        self
    }

    pub fn connect(&self) -> ChromeEvents {
        ChromeEvents {
            tx: self.events.sender(),
            dims: Rc::clone(&self.dims),
            pressed: Rc::clone(&self.pressed),
        }
    }

    /// Composited image: raster, buttons, then info boxes.
    pub fn image(&self) -> Option<&Raster> {
        self.image.as_ref()
    }

    pub fn overlays(&self) -> impl Iterator<Item = &InfoBox> {
        self.overlays.iter().map(|(_, info)| info)
    }

    fn composite(&mut self) {
        let Some(base) = &self.base else {
            return;
        };
        let width = base.width();
        let mut canvas = Canvas::from_image(base.clone());
        for button in BUTTONS {
            draw_button(&mut canvas, button, width);
        }
        for (_, info) in &self.overlays {
            draw_info(&mut canvas, self.font.as_ref(), info);
        }
        self.image = Some(canvas.into_image());
    }
}

impl DisplaySurface for ChromeCanvas {
    fn dimensions(&self) -> (u32, u32) {
        self.dims.get()
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.dims.set((width, height));
    }

    fn present(&mut self, raster: &Raster) -> Result<(), ViewerError> {
        self.base = Some(raster.clone());
        self.composite();
        Ok(())
    }

    fn subscribe(&mut self) -> Option<UnboundedReceiver<SurfaceEvent>> {
        self.events.take()
    }

    fn double_click_policy(&self) -> DoubleClickPolicy {
        self.double_click
    }

    fn throttles_scroll(&self) -> bool {
        true
    }

    fn supports_overlay(&self) -> bool {
        true
    }

    fn draw_overlay(&mut self, info: InfoBox) -> Option<OverlayHandle> {
        let handle = OverlayHandle(self.next_overlay);
        self.next_overlay += 1;
        self.overlays.push((handle, info));
        self.composite();
        Some(handle)
    }

    fn remove_overlay(&mut self, handle: OverlayHandle) {
        self.overlays.retain(|(h, _)| *h != handle);
        self.composite();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{MouseButton, PointerEvent};

    fn press(x: f64, y: f64) -> CanvasEvent {
        CanvasEvent::ButtonPress {
            xdata: Some(x),
            ydata: Some(y),
            button: MouseButton::Left,
            dblclick: false,
        }
    }

    fn release(x: f64, y: f64) -> CanvasEvent {
        CanvasEvent::ButtonRelease {
            xdata: Some(x),
            ydata: Some(y),
            button: MouseButton::Left,
        }
    }

    fn hover(x: f64, y: f64) -> CanvasEvent {
        CanvasEvent::MotionNotify {
            xdata: Some(x),
            ydata: Some(y),
            button: None,
        }
    }

    fn boxed(lines: &[&str]) -> InfoBox {
        InfoBox {
            x: 10.0,
            y: 10.0,
            width: 60.0,
            height: 30.0,
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn composited_with(info: InfoBox) -> Raster {
        let mut canvas = ChromeCanvas::new(100, 60);
        canvas.present(&Raster::new(100, 60)).unwrap();
        canvas.draw_overlay(info).unwrap();
        canvas.image().unwrap().clone()
    }

    #[test]
    fn test_buttons_stack_down_right_edge() {
        assert_eq!(button_origin(ChromeButton::ZoomIn, 200), (164.0, 8.0));
        assert_eq!(button_origin(ChromeButton::ZoomOut, 200), (164.0, 44.0));
        assert_eq!(button_origin(ChromeButton::Reset, 200), (164.0, 80.0));
        assert_eq!(button_at(170.0, 90.0, 200), Some(ChromeButton::Reset));
        assert_eq!(button_at(100.0, 90.0, 200), None);
    }

    #[test]
    fn test_button_press_becomes_click_and_release_is_swallowed() {
        let mut canvas = ChromeCanvas::new(200, 100);
        let host = canvas.connect();
        let mut rx = canvas.subscribe().unwrap();

        host.emit(press(170.0, 12.0)).unwrap();
        host.emit(release(170.0, 12.0)).unwrap();
        host.emit(press(20.0, 20.0)).unwrap();

        assert_eq!(rx.try_recv().unwrap(), SurfaceEvent::Button(ChromeButton::ZoomIn));
        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceEvent::Pointer(PointerEvent::press(20.0, 20.0))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_release_after_button_press_swallowed_off_button() {
        let mut canvas = ChromeCanvas::new(200, 100);
        let host = canvas.connect();
        let mut rx = canvas.subscribe().unwrap();

        host.emit(press(170.0, 12.0)).unwrap();
        host.emit(release(20.0, 20.0)).unwrap();
        host.emit(release(20.0, 20.0)).unwrap();

        assert_eq!(rx.try_recv().unwrap(), SurfaceEvent::Button(ChromeButton::ZoomIn));
        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceEvent::Pointer(PointerEvent::release(20.0, 20.0))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drag_ending_over_button_is_forwarded() {
        let mut canvas = ChromeCanvas::new(200, 100);
        let host = canvas.connect();
        let mut rx = canvas.subscribe().unwrap();

        host.emit(press(20.0, 20.0)).unwrap();
        host.emit(hover(170.0, 12.0)).unwrap();
        host.emit(release(170.0, 12.0)).unwrap();
        host.emit(hover(175.0, 50.0)).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceEvent::Pointer(PointerEvent::press(20.0, 20.0))
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            SurfaceEvent::Pointer(PointerEvent::Move { x, .. }) if x == 170.0
        ));
        assert_eq!(
            rx.try_recv().unwrap(),
            SurfaceEvent::Pointer(PointerEvent::release(170.0, 12.0))
        );
        assert!(matches!(
            rx.try_recv().unwrap(),
            SurfaceEvent::Pointer(PointerEvent::Move { y, .. }) if y == 50.0
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_hit_testing_follows_resize() {
        let mut canvas = ChromeCanvas::new(200, 100);
        let host = canvas.connect();
        let mut rx = canvas.subscribe().unwrap();
        canvas.set_dimensions(400, 100);

        host.emit(press(170.0, 12.0)).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), SurfaceEvent::Pointer(_)));
    }

    #[test]
    fn test_overlay_drawn_and_removed() {
        let mut canvas = ChromeCanvas::new(100, 100);
        canvas.present(&Raster::new(100, 100)).unwrap();
        let plain = canvas.image().unwrap().clone();

        let info = InfoBox {
            x: 10.0,
            y: 10.0,
            width: 30.0,
            height: 20.0,
            lines: vec!["TOP".into()],
        };
        let handle = canvas.draw_overlay(info).unwrap();
        assert_eq!(canvas.overlays().count(), 1);
        assert_eq!(canvas.image().unwrap().get_pixel(10, 10).0, INFO_EDGE);

        canvas.remove_overlay(handle);
        assert_eq!(canvas.overlays().count(), 0);
        assert_eq!(canvas.image().unwrap(), &plain);
    }

    #[test]
    fn test_label_text_is_rendered() {
        let top = composited_with(boxed(&["TOP"]));
        let waveguide = composited_with(boxed(&["WAVEGUIDE"]));
        let blank = composited_with(boxed(&[]));
        assert_ne!(top, waveguide);
        assert_ne!(top, blank);

        let lit = |img: &Raster| {
            img.enumerate_pixels()
                .filter(|(x, y, p)| (11..69).contains(x) && (11..39).contains(y) && p.0[0] > 100)
                .count()
        };
        assert_eq!(lit(&blank), 0);
        assert!(lit(&top) > 0);
    }

    #[test]
    fn test_label_centred_on_box() {
        let img = composited_with(boxed(&["TOP"]));
        let inked: Vec<(u32, u32)> = img
            .enumerate_pixels()
            .filter(|(x, y, p)| (11..69).contains(x) && (11..39).contains(y) && p.0[0] > 100)
            .map(|(x, y, _)| (x, y))
            .collect();
        let n = inked.len() as f64;
        let mean_x = inked.iter().map(|&(x, _)| x as f64).sum::<f64>() / n;
        let mean_y = inked.iter().map(|&(_, y)| y as f64).sum::<f64>() / n;
        assert!((mean_x - 40.0).abs() < 4.0, "mean x {}", mean_x);
        assert!((mean_y - 25.0).abs() < 4.0, "mean y {}", mean_y);
    }

    #[test]
    fn test_buttons_painted_on_frame() {
        let mut canvas = ChromeCanvas::new(100, 100);
        canvas.present(&Raster::new(100, 100)).unwrap();
        let (x, y) = button_origin(ChromeButton::ZoomIn, 100);
        let corner = canvas.image().unwrap().get_pixel(x as u32, y as u32).0;
        assert_eq!(corner, [GLYPH_COLOR[0], GLYPH_COLOR[1], GLYPH_COLOR[2], 255]);
    }
}
