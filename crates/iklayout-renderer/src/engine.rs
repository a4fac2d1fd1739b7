use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use iklayout_core::cell::CellIndex;
use iklayout_core::geometry::{BBox, Point};
use iklayout_io::GdsError;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to load layout {path:?}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: GdsError,
    },

    #[error("Failed to encode screenshot: {0}")]
    Encode(#[from] image::ImageError),
}

/// Mouse button state accompanying a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonState {
    LeftButton,
    MidButton,
    RightButton,
}

/// One selected object, addressed by the chain of cells from a top cell
/// down to the cell that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedObject {
    pub path: Vec<CellIndex>,
}

impl SelectedObject {
    /// The cell owning the selected object.
    pub fn cell_index(&self) -> Option<CellIndex> {
        self.path.last().copied()
    }
}

/// Callback fired by a renderer when its rendered image changed.
pub type ImageUpdatedCallback = Box<dyn FnMut()>;

/// The capabilities a viewer needs from a layout-rendering engine.
///
/// Mouse coordinates are canvas pixels of the size last passed to
/// [`resize`](LayoutRenderer::resize), origin top left.
pub trait LayoutRenderer {
    fn load_layout(&mut self, path: &Path) -> Result<(), RenderError>;

    /// Show every hierarchy level.
    fn max_hier(&mut self);

    fn zoom_fit(&mut self);

    /// Create display entries for layers that carry geometry but have none.
    fn add_missing_layers(&mut self);

    fn resize(&mut self, width: u32, height: u32);

    /// The current frame as PNG bytes. Does not advance the renderer.
    fn screenshot_png(&self) -> Result<Vec<u8>, RenderError>;

    /// Advance internal state; fires the image-updated callback when the
    /// image changed since the last tick.
    fn timer(&mut self);

    fn on_image_updated(&mut self, callback: ImageUpdatedCallback);

    fn send_mouse_press_event(&mut self, p: Point, buttons: ButtonState);
    fn send_mouse_double_clicked_event(&mut self, p: Point, buttons: ButtonState);
    fn send_mouse_release_event(&mut self, p: Point, buttons: ButtonState);
    fn send_mouse_move_event(&mut self, p: Point, buttons: ButtonState);
    fn send_enter_event(&mut self);
    fn send_leave_event(&mut self);

    fn zoom_in(&mut self);
    fn zoom_out(&mut self);

    fn selected_objects(&self) -> Vec<SelectedObject>;

    // ── Cell tree ───────────────────────────────────────────────────

    fn top_cells(&self) -> Vec<CellIndex>;
    fn child_cells(&self, cell: CellIndex) -> Vec<CellIndex>;
    fn cell_name(&self, cell: CellIndex) -> Option<String>;
    fn cell_bbox(&self, cell: CellIndex) -> Option<BBox>;
}
