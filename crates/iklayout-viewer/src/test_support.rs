//! Recording renderer used by the viewer tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::{ImageFormat, RgbaImage};

use iklayout_core::cell::CellIndex;
use iklayout_core::geometry::{BBox, Point};
use iklayout_io::GdsError;
use iklayout_renderer::{ButtonState, ImageUpdatedCallback, LayoutRenderer, RenderError, SelectedObject};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load(PathBuf),
    MaxHier,
    ZoomFit,
    AddMissingLayers,
    Resize(u32, u32),
    Press(Point, ButtonState),
    DoubleClick(Point, ButtonState),
    Release(Point, ButtonState),
    Move(Point, ButtonState),
    Enter,
    Leave,
    ZoomIn,
    ZoomOut,
}

struct FakeCell {
    name: String,
    bbox: Option<BBox>,
    children: Vec<CellIndex>,
}

/// Records every renderer call. Any call other than `timer` marks the image
/// as changed; the next `timer` fires the image-updated callback.
pub struct FakeRenderer {
    log: Rc<RefCell<Vec<Call>>>,
    ticks: Rc<Cell<usize>>,
    corrupt: Rc<Cell<bool>>,
    fail_load: bool,
    size: (u32, u32),
    cells: BTreeMap<CellIndex, FakeCell>,
    tops: Vec<CellIndex>,
    selection: Vec<SelectedObject>,
    changed: bool,
    callback: Option<ImageUpdatedCallback>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            ticks: Rc::new(Cell::new(0)),
            corrupt: Rc::new(Cell::new(false)),
            fail_load: false,
            size: (1, 1),
            cells: BTreeMap::new(),
            tops: Vec::new(),
            selection: Vec::new(),
            changed: false,
            callback: None,
        }
    }

    pub fn log(&self) -> Rc<RefCell<Vec<Call>>> {
        Rc::clone(&self.log)
    }

    pub fn ticks(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.ticks)
    }

    /// Switch that makes screenshots undecodable while set.
    pub fn corruption(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.corrupt)
    }

    pub fn with_corrupt_png(self) -> Self {
        self.corrupt.set(true);
        self
    }

    pub fn with_failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn with_cell(
        mut self,
        id: CellIndex,
        name: &str,
        bbox: Option<BBox>,
        children: Vec<CellIndex>,
    ) -> Self {
        self.cells.insert(
            id,
            FakeCell {
                name: name.to_string(),
                bbox,
                children,
            },
        );
        self
    }

    pub fn with_top_cells(mut self, tops: Vec<CellIndex>) -> Self {
        self.tops = tops;
        self
    }

    pub fn with_selection(mut self, paths: Vec<Vec<CellIndex>>) -> Self {
        self.selection = paths.into_iter().map(|path| SelectedObject { path }).collect();
        self
    }

    fn record(&mut self, call: Call) {
        self.log.borrow_mut().push(call);
        self.changed = true;
    }
}

impl LayoutRenderer for FakeRenderer {
    fn load_layout(&mut self, path: &Path) -> Result<(), RenderError> {
        self.record(Call::Load(path.to_path_buf()));
        if self.fail_load {
            return Err(RenderError::Load {
                path: path.to_path_buf(),
                source: GdsError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "absent")),
            });
        }
        Ok(())
    }

    fn max_hier(&mut self) {
        self.record(Call::MaxHier);
    }

    fn zoom_fit(&mut self) {
        self.record(Call::ZoomFit);
    }

    fn add_missing_layers(&mut self) {
        self.record(Call::AddMissingLayers);
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.record(Call::Resize(width, height));
    }

    fn screenshot_png(&self) -> Result<Vec<u8>, RenderError> {
        if self.corrupt.get() {
            return Ok(b"not a png".to_vec());
        }
        let image = RgbaImage::new(self.size.0, self.size.1);
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    fn timer(&mut self) {
        self.ticks.set(self.ticks.get() + 1);
        if std::mem::take(&mut self.changed) {
            if let Some(callback) = self.callback.as_mut() {
                callback();
            }
        }
    }

    fn on_image_updated(&mut self, callback: ImageUpdatedCallback) {
        self.callback = Some(callback);
    }

    fn send_mouse_press_event(&mut self, p: Point, buttons: ButtonState) {
        self.record(Call::Press(p, buttons));
    }

    fn send_mouse_double_clicked_event(&mut self, p: Point, buttons: ButtonState) {
        self.record(Call::DoubleClick(p, buttons));
    }

    fn send_mouse_release_event(&mut self, p: Point, buttons: ButtonState) {
        self.record(Call::Release(p, buttons));
    }

    fn send_mouse_move_event(&mut self, p: Point, buttons: ButtonState) {
        self.record(Call::Move(p, buttons));
    }

    fn send_enter_event(&mut self) {
        self.record(Call::Enter);
    }

    fn send_leave_event(&mut self) {
        self.record(Call::Leave);
    }

    fn zoom_in(&mut self) {
        self.record(Call::ZoomIn);
    }

    fn zoom_out(&mut self) {
        self.record(Call::ZoomOut);
    }

    fn selected_objects(&self) -> Vec<SelectedObject> {
        self.selection.clone()
    }

    fn top_cells(&self) -> Vec<CellIndex> {
        self.tops.clone()
    }

    fn child_cells(&self, cell: CellIndex) -> Vec<CellIndex> {
        self.cells
            .get(&cell)
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    fn cell_name(&self, cell: CellIndex) -> Option<String> {
        self.cells.get(&cell).map(|c| c.name.clone())
    }

    fn cell_bbox(&self, cell: CellIndex) -> Option<BBox> {
        self.cells.get(&cell).and_then(|c| c.bbox)
    }
}
