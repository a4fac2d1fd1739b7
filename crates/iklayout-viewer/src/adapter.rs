//! Owns the renderer handle and turns viewer requests into renderer calls.

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};

use iklayout_core::LayoutDatabase;
use iklayout_io::write_transfer_file;
use iklayout_renderer::{ImageUpdatedCallback, LayoutRenderer};

use crate::error::ViewerError;
use crate::event::PointerEvent;
use crate::translate::{forward_event, Dispatch, DoubleClickPolicy};

/// One decoded frame, RGBA8.
pub type Raster = RgbaImage;

/// Where a layout comes from.
#[derive(Debug, Clone)]
pub enum LayoutSource {
    /// A GDS-II file already on disk.
    File(PathBuf),
    /// An in-memory design, written to a transfer file before loading.
    Design(LayoutDatabase),
}

impl From<PathBuf> for LayoutSource {
    fn from(path: PathBuf) -> Self {
        LayoutSource::File(path)
    }
}

impl From<&Path> for LayoutSource {
    fn from(path: &Path) -> Self {
        LayoutSource::File(path.to_path_buf())
    }
}

impl From<LayoutDatabase> for LayoutSource {
    fn from(db: LayoutDatabase) -> Self {
        LayoutSource::Design(db)
    }
}

impl LayoutSource {
    /// Path the renderer should open, writing a transfer file into
    /// `transfer_dir` for in-memory designs.
    pub fn materialize(&self, transfer_dir: &Path) -> Result<PathBuf, ViewerError> {
        match self {
            LayoutSource::File(path) => Ok(path.clone()),
            LayoutSource::Design(db) => {
                write_transfer_file(db, transfer_dir).map_err(ViewerError::Transfer)
            }
        }
    }
}

pub struct RendererAdapter<R> {
    renderer: R,
    width: u32,
    height: u32,
}

impl<R: LayoutRenderer> RendererAdapter<R> {
    pub fn new(renderer: R, width: u32, height: u32) -> Self {
        Self {
            renderer,
            width,
            height,
        }
    }

    pub fn load(&mut self, source: &LayoutSource, transfer_dir: &Path) -> Result<(), ViewerError> {
        let path = source.materialize(transfer_dir)?;
        self.renderer.load_layout(&path).map_err(ViewerError::Load)?;
        log::info!("Layout loaded from {}", path.display());
        Ok(())
    }

    /// Post-load setup. Missing layers are resolved last so the fully
    /// expanded hierarchy is visible to it.
    pub fn prepare_view(&mut self) {
        self.renderer.zoom_fit();
        self.renderer.max_hier();
        self.renderer.add_missing_layers();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.renderer.resize(width, height);
        log::debug!("Renderer resized to {}x{}", width, height);
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Decode the renderer's current frame. Does not advance the renderer.
    pub fn capture_raster(&self) -> Result<Raster, ViewerError> {
        let png = self.renderer.screenshot_png().map_err(ViewerError::Capture)?;
        let image =
            image::load_from_memory_with_format(&png, ImageFormat::Png).map_err(ViewerError::Decode)?;
        Ok(image.to_rgba8())
    }

    pub fn zoom_in(&mut self) {
        self.renderer.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.renderer.zoom_out();
    }

    pub fn reset_zoom(&mut self) {
        self.renderer.zoom_fit();
    }

    pub fn forward_event(&mut self, event: &PointerEvent, double_click: DoubleClickPolicy) -> Dispatch {
        forward_event(&mut self.renderer, event, double_click)
    }

    pub fn tick(&mut self) {
        self.renderer.timer();
    }

    pub fn on_image_updated(&mut self, callback: ImageUpdatedCallback) {
        self.renderer.on_image_updated(callback);
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}
