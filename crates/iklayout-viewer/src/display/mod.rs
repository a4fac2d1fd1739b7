//! Display surfaces that host the rendered raster and report interaction
//! back to the session.
//!
//! Each binding pairs a [`DisplaySurface`] (owned by the session) with a
//! cloneable event handle that the embedding host feeds with its native
//! events. The handle normalises them into [`SurfaceEvent`]s.

pub mod chrome;
pub mod figure;
pub mod widget;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::adapter::Raster;
use crate::error::ViewerError;
use crate::event::SurfaceEvent;
use crate::overlay::{InfoBox, OverlayHandle};
use crate::translate::DoubleClickPolicy;

pub use chrome::{ChromeCanvas, ChromeEvents};
pub use figure::{CanvasEvent, FigureCanvas, FigureEvents};
pub use widget::{ReactiveWidget, WidgetEvents};

/// Capabilities the session needs from a display surface.
pub trait DisplaySurface {
    /// Pixel size of the image layer.
    fn dimensions(&self) -> (u32, u32);

    fn set_dimensions(&mut self, width: u32, height: u32);

    /// Replace the displayed image.
    fn present(&mut self, raster: &Raster) -> Result<(), ViewerError>;

    /// Stream of interaction events. Yields `None` once it has been taken.
    fn subscribe(&mut self) -> Option<UnboundedReceiver<SurfaceEvent>>;

    fn double_click_policy(&self) -> DoubleClickPolicy {
        DoubleClickPolicy::Forward
    }

    /// Whether scroll-driven zoom is rate limited on this surface.
    fn throttles_scroll(&self) -> bool {
        false
    }

    fn supports_overlay(&self) -> bool {
        false
    }

    /// Draw an info box. Surfaces without overlay support draw nothing.
    fn draw_overlay(&mut self, _info: InfoBox) -> Option<OverlayHandle> {
        None
    }

    fn remove_overlay(&mut self, _handle: OverlayHandle) {}
}

/// Sending half handed to the host plus the receiving half kept until
/// the session subscribes.
struct EventChannel {
    tx: UnboundedSender<SurfaceEvent>,
    rx: Option<UnboundedReceiver<SurfaceEvent>>,
}

impl EventChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }

    fn sender(&self) -> UnboundedSender<SurfaceEvent> {
        self.tx.clone()
    }

    fn take(&mut self) -> Option<UnboundedReceiver<SurfaceEvent>> {
        self.rx.take()
    }
}

fn send(tx: &UnboundedSender<SurfaceEvent>, event: SurfaceEvent) -> Result<(), ViewerError> {
    log::trace!("Surface event {:?}", event);
    tx.send(event).map_err(|_| ViewerError::SurfaceClosed)
}
