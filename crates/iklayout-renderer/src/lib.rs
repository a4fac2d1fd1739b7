//! # iklayout Renderer
//!
//! The renderer boundary consumed by the viewer ([`LayoutRenderer`]) and
//! [`LayoutView`], a software implementation that rasterises a GDS-II
//! layout, handles pan/select/zoom from pointer events and signals when its
//! image changed.

pub mod engine;
pub mod raster;
pub mod view;
pub mod viewport;

pub use engine::{ButtonState, ImageUpdatedCallback, LayoutRenderer, RenderError, SelectedObject};
pub use view::LayoutView;
pub use viewport::Viewport;
