//! # iklayout Viewer
//!
//! Bridges a [`LayoutRenderer`](iklayout_renderer::LayoutRenderer) to a
//! display surface: pointer events from the surface are translated into
//! renderer calls, and frames are pushed back whenever the renderer reports
//! that its image changed.
//!
//! A [`ViewSession`] owns the renderer and one [`DisplaySurface`]. Calling
//! [`ViewSession::start`] inside a `tokio::task::LocalSet` spawns the tick
//! driver, the repaint trigger and the event pump.

pub mod adapter;
pub mod cells;
pub mod config;
pub mod display;
pub mod error;
pub mod event;
pub mod logging;
pub mod overlay;
pub mod session;
pub mod throttle;
pub mod translate;

#[cfg(test)]
mod test_support;

pub use adapter::{LayoutSource, Raster, RendererAdapter};
pub use cells::{CellInfo, SelectionPolicy};
pub use config::{ConfigError, ViewerConfig};
pub use display::{ChromeCanvas, DisplaySurface, FigureCanvas, ReactiveWidget};
pub use error::ViewerError;
pub use event::{ChromeButton, MouseButton, PointerEvent, ScrollDirection, SurfaceEvent};
pub use overlay::{InfoBox, OverlayHandle};
pub use session::{SessionHandle, ViewSession};
pub use throttle::RateLimiter;
pub use translate::DoubleClickPolicy;
