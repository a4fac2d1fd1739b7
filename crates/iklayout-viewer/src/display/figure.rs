//! Desktop figure canvas hosting the raster as an image layer.
//!
//! The image is shown with its origin at the top left and one data unit per
//! pixel, so data coordinates reported by the canvas are pixel coordinates.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::adapter::Raster;
use crate::error::ViewerError;
use crate::event::{MouseButton, PointerEvent, ScrollDirection, SurfaceEvent};
use crate::translate::DoubleClickPolicy;

use super::{send, DisplaySurface, EventChannel};

/// Native events of a desktop figure canvas. Data coordinates are `None`
/// when the pointer is outside the image axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CanvasEvent {
    ButtonPress {
        xdata: Option<f64>,
        ydata: Option<f64>,
        button: MouseButton,
        dblclick: bool,
    },
    ButtonRelease {
        xdata: Option<f64>,
        ydata: Option<f64>,
        button: MouseButton,
    },
    MotionNotify {
        xdata: Option<f64>,
        ydata: Option<f64>,
        button: Option<MouseButton>,
    },
    FigureEnter,
    FigureLeave,
    /// Positive steps scroll up.
    Scroll { step: f64 },
}

impl CanvasEvent {
    /// Normalise, dropping pointer events outside the axes and zero scrolls.
    pub fn to_pointer(self) -> Option<PointerEvent> {
        match self {
            CanvasEvent::ButtonPress {
                xdata: Some(x),
                ydata: Some(y),
                button,
                dblclick,
            } => Some(PointerEvent::Press {
                x,
                y,
                button,
                double_click: dblclick,
            }),
            CanvasEvent::ButtonRelease {
                xdata: Some(x),
                ydata: Some(y),
                button,
            } => Some(PointerEvent::Release { x, y, button }),
            CanvasEvent::MotionNotify {
                xdata: Some(x),
                ydata: Some(y),
                button,
            } => Some(PointerEvent::Move {
                x,
                y,
                button: button.unwrap_or(MouseButton::Left),
            }),
            CanvasEvent::FigureEnter => Some(PointerEvent::Enter),
            CanvasEvent::FigureLeave => Some(PointerEvent::Leave),
            CanvasEvent::Scroll { step } if step > 0.0 => {
                Some(PointerEvent::scroll(ScrollDirection::Up))
            }
            CanvasEvent::Scroll { step } if step < 0.0 => {
                Some(PointerEvent::scroll(ScrollDirection::Down))
            }
            _ => None,
        }
    }

    /// Pixel position, when inside the axes.
    pub fn position(&self) -> Option<(f64, f64)> {
        match *self {
            CanvasEvent::ButtonPress {
                xdata: Some(x),
                ydata: Some(y),
                ..
            }
            | CanvasEvent::ButtonRelease {
                xdata: Some(x),
                ydata: Some(y),
                ..
            }
            | CanvasEvent::MotionNotify {
                xdata: Some(x),
                ydata: Some(y),
                ..
            } => Some((x, y)),
            _ => None,
        }
    }
}

/// Host-side handle feeding canvas callbacks into the session.
#[derive(Debug, Clone)]
pub struct FigureEvents {
    tx: UnboundedSender<SurfaceEvent>,
}

impl FigureEvents {
    pub fn emit(&self, event: CanvasEvent) -> Result<(), ViewerError> {
        match event.to_pointer() {
            Some(pointer) => send(&self.tx, SurfaceEvent::Pointer(pointer)),
            None => Ok(()),
        }
    }
}

pub struct FigureCanvas {
    width: u32,
    height: u32,
    image: Option<Raster>,
    frames: usize,
    double_click: DoubleClickPolicy,
    events: EventChannel,
}

impl FigureCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            image: None,
            frames: 0,
            double_click: DoubleClickPolicy::Forward,
            events: EventChannel::new(),
        }
    }

    pub fn with_double_click(mut self, policy: DoubleClickPolicy) -> Self {
        self.double_click = policy;
        self
    }

    /// Handle the host connects to the canvas callbacks.
    pub fn connect(&self) -> FigureEvents {
        FigureEvents {
            tx: self.events.sender(),
        }
    }

    /// Image currently shown.
    pub fn image(&self) -> Option<&Raster> {
        self.image.as_ref()
    }

    /// Number of frames presented so far.
    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl DisplaySurface for FigureCanvas {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    fn present(&mut self, raster: &Raster) -> Result<(), ViewerError> {
        self.image = Some(raster.clone());
        self.frames += 1;
        Ok(())
    }

    fn subscribe(&mut self) -> Option<UnboundedReceiver<SurfaceEvent>> {
        self.events.take()
    }

    fn double_click_policy(&self) -> DoubleClickPolicy {
        self.double_click
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(x: Option<f64>, dblclick: bool) -> CanvasEvent {
        CanvasEvent::ButtonPress {
            xdata: x,
            ydata: x,
            button: MouseButton::Right,
            dblclick,
        }
    }

    #[test]
    fn test_press_keeps_coordinates_and_flag() {
        assert_eq!(
            press(Some(4.5), true).to_pointer(),
            Some(PointerEvent::Press {
                x: 4.5,
                y: 4.5,
                button: MouseButton::Right,
                double_click: true,
            })
        );
    }

    #[test]
    fn test_outside_axes_dropped() {
        assert_eq!(press(None, false).to_pointer(), None);
        let motion = CanvasEvent::MotionNotify {
            xdata: Some(1.0),
            ydata: None,
            button: None,
        };
        assert_eq!(motion.to_pointer(), None);
    }

    #[test]
    fn test_scroll_direction_from_step() {
        assert_eq!(
            CanvasEvent::Scroll { step: 1.0 }.to_pointer(),
            Some(PointerEvent::scroll(ScrollDirection::Up))
        );
        assert_eq!(
            CanvasEvent::Scroll { step: -2.0 }.to_pointer(),
            Some(PointerEvent::scroll(ScrollDirection::Down))
        );
        assert_eq!(CanvasEvent::Scroll { step: 0.0 }.to_pointer(), None);
    }

    #[test]
    fn test_events_reach_subscriber_once() {
        let mut canvas = FigureCanvas::new(10, 10);
        let host = canvas.connect();
        let mut rx = canvas.subscribe().unwrap();
        assert!(canvas.subscribe().is_none());

        host.emit(CanvasEvent::FigureEnter).unwrap();
        host.emit(press(None, false)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), SurfaceEvent::Pointer(PointerEvent::Enter));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_after_close_fails() {
        let mut canvas = FigureCanvas::new(10, 10);
        let host = canvas.connect();
        drop(canvas.subscribe());
        assert!(matches!(
            host.emit(CanvasEvent::FigureLeave),
            Err(ViewerError::SurfaceClosed)
        ));
    }

    #[test]
    fn test_present_replaces_image() {
        let mut canvas = FigureCanvas::new(2, 2);
        canvas.present(&Raster::new(2, 2)).unwrap();
        canvas.present(&Raster::new(3, 1)).unwrap();
        assert_eq!(canvas.frames(), 2);
        assert_eq!(canvas.image().unwrap().dimensions(), (3, 1));
    }
}
