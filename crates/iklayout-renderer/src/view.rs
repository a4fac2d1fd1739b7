use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, RgbaImage};

use iklayout_core::cell::{CellIndex, Transform};
use iklayout_core::geometry::{union_all, BBox, Point};
use iklayout_core::spatial::{SpatialEntry, SpatialIndex};
use iklayout_core::{LayerId, LayoutDatabase};
use iklayout_io::read_gds_file;

use crate::engine::{ButtonState, ImageUpdatedCallback, LayoutRenderer, RenderError, SelectedObject};
use crate::raster::Canvas;
use crate::viewport::{Viewport, ZOOM_STEP};

/// Pointer travel (pixels) below which a press/release pair counts as a click.
const CLICK_TOLERANCE: f64 = 3.0;
const FRAME_COLOR: [u8; 4] = [160, 160, 160, 255];
const SELECTION_COLOR: [u8; 4] = [255, 255, 255, 255];

/// A drawable, pickable piece of the flattened hierarchy, in top-cell coordinates.
#[derive(Debug)]
struct FlatShape {
    /// `None` for the frame of an instance below the displayed depth.
    layer: Option<LayerId>,
    rings: Vec<Vec<Point>>,
    bbox: BBox,
    /// Top cell first, owning cell last.
    path: Vec<CellIndex>,
    /// Placement of the owning cell.
    owner_bbox: BBox,
}

impl FlatShape {
    fn hit(&self, p: &Point) -> bool {
        if !self.bbox.contains_point(p) {
            return false;
        }
        match self.layer {
            None => true,
            Some(_) => self
                .rings
                .iter()
                .any(|ring| iklayout_core::geometry::contains_even_odd(ring, p)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    origin: Point,
    last: Point,
    moved: bool,
}

/// Software implementation of [`LayoutRenderer`] over a GDS-II layout.
pub struct LayoutView {
    db: Option<LayoutDatabase>,
    bboxes: Vec<Option<BBox>>,
    viewport: Viewport,
    max_depth: usize,
    shapes: Vec<FlatShape>,
    index: SpatialIndex,
    /// Shape indices, innermost hit first.
    selection: Vec<usize>,
    drag: Option<Drag>,
    hovering: bool,
    dirty: bool,
    frame: Option<RgbaImage>,
    on_image_updated: Option<ImageUpdatedCallback>,
}

impl Default for LayoutView {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutView {
    pub fn new() -> Self {
        Self {
            db: None,
            bboxes: Vec::new(),
            viewport: Viewport::new(800.0, 600.0),
            max_depth: 0,
            shapes: Vec::new(),
            index: SpatialIndex::new(),
            selection: Vec::new(),
            drag: None,
            hovering: false,
            dirty: true,
            frame: None,
            on_image_updated: None,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn is_hovering(&self) -> bool {
        self.hovering
    }

    /// Layout currently loaded, if any.
    pub fn layout(&self) -> Option<&LayoutDatabase> {
        self.db.as_ref()
    }

    fn rebuild_shapes(&mut self) {
        self.shapes = match &self.db {
            Some(db) => flatten(db, &self.bboxes, self.max_depth),
            None => Vec::new(),
        };
        self.index = SpatialIndex::build(
            self.shapes
                .iter()
                .enumerate()
                .map(|(shape_index, s)| SpatialEntry {
                    shape_index,
                    bbox: s.bbox,
                })
                .collect(),
        );
        self.selection.clear();
        self.dirty = true;
    }

    /// Replace the selection with everything under the pointer.
    fn select_at(&mut self, screen: &Point) {
        let p = self.viewport.screen_to_layout(screen.x, screen.y);
        let mut hits: Vec<usize> = self
            .index
            .query_point(&p)
            .into_iter()
            .map(|e| e.shape_index)
            .filter(|&i| self.shapes[i].hit(&p))
            .collect();
        // Innermost first, then topmost drawn.
        hits.sort_by(|&a, &b| {
            self.shapes[b]
                .path
                .len()
                .cmp(&self.shapes[a].path.len())
                .then(b.cmp(&a))
        });
        log::debug!("Pick at ({:.3}, {:.3}): {} hit(s)", p.x, p.y, hits.len());
        if hits != self.selection {
            self.selection = hits;
            self.dirty = true;
        }
    }

    fn render(&self) -> RgbaImage {
        let width = self.viewport.canvas_width as u32;
        let height = self.viewport.canvas_height as u32;
        let mut canvas = Canvas::new(width, height);
        let Some(db) = &self.db else {
            return canvas.into_image();
        };

        let mut in_view: Vec<usize> = self
            .index
            .query_viewport(&self.viewport.visible_bounds())
            .into_iter()
            .map(|e| e.shape_index)
            .collect();
        in_view.sort_unstable();

        let to_screen = |ring: &[Point]| -> Vec<Point> {
            ring.iter()
                .map(|p| {
                    let (x, y) = self.viewport.layout_to_screen(p);
                    Point::new(x, y)
                })
                .collect()
        };

        for layer in db.layer_stack.visible_layers() {
            let fill = layer.color.to_rgba(layer.opacity);
            let outline = layer.color.to_rgba(1.0);
            for shape in in_view.iter().map(|&i| &self.shapes[i]) {
                if shape.layer != Some(layer.id) {
                    continue;
                }
                for ring in &shape.rings {
                    let screen = to_screen(ring);
                    canvas.fill_ring(&screen, fill, layer.fill_pattern);
                    canvas.stroke_ring(&screen, outline);
                }
            }
        }

        for shape in in_view.iter().map(|&i| &self.shapes[i]) {
            if shape.layer.is_none() {
                for ring in &shape.rings {
                    canvas.stroke_ring(&to_screen(ring), FRAME_COLOR);
                }
            }
        }

        for &i in &self.selection {
            for ring in &self.shapes[i].rings {
                canvas.stroke_ring(&to_screen(ring), SELECTION_COLOR);
            }
        }

        canvas.into_image()
    }
}

fn to_top(chain: &[Transform], p: &Point) -> Point {
    chain.iter().rev().fold(*p, |acc, t| t.apply(&acc))
}

/// Flatten the hierarchy down to `max_depth`; deeper instances become frames.
fn flatten(db: &LayoutDatabase, bboxes: &[Option<BBox>], max_depth: usize) -> Vec<FlatShape> {
    struct Walk<'a> {
        db: &'a LayoutDatabase,
        bboxes: &'a [Option<BBox>],
        max_depth: usize,
        chain: Vec<Transform>,
        path: Vec<CellIndex>,
        out: Vec<FlatShape>,
    }

    impl Walk<'_> {
        fn placed_bbox(&self, cell: CellIndex) -> Option<BBox> {
            let bbox = self.bboxes.get(cell).copied().flatten()?;
            let corners = bbox.corners().map(|c| to_top(&self.chain, &c));
            BBox::from_points(&corners)
        }

        fn visit(&mut self, index: CellIndex) {
            let db = self.db;
            let Some(cell) = db.cell(index) else {
                return;
            };
            let Some(owner_bbox) = self.placed_bbox(index) else {
                return;
            };

            for geom in &cell.geometries {
                let rings: Vec<Vec<Point>> = geom
                    .outlines()
                    .iter()
                    .map(|ring| ring.iter().map(|p| to_top(&self.chain, p)).collect())
                    .collect();
                if let Some(bbox) = union_all(rings.iter().filter_map(|r| BBox::from_points(r))) {
                    self.out.push(FlatShape {
                        layer: Some(geom.layer_id()),
                        rings,
                        bbox,
                        path: self.path.clone(),
                        owner_bbox,
                    });
                }
            }

            let depth = self.path.len() - 1;
            for inst in &cell.instances {
                self.chain.push(inst.transform);
                self.path.push(inst.cell);
                if depth < self.max_depth {
                    self.visit(inst.cell);
                } else if let Some(frame) = self.placed_bbox(inst.cell) {
                    self.out.push(FlatShape {
                        layer: None,
                        rings: vec![frame.corners().to_vec()],
                        bbox: frame,
                        path: self.path.clone(),
                        owner_bbox: frame,
                    });
                }
                self.chain.pop();
                self.path.pop();
            }
        }
    }

    let mut walk = Walk {
        db,
        bboxes,
        max_depth,
        chain: Vec::new(),
        path: Vec::new(),
        out: Vec::new(),
    };
    for top in db.top_cells() {
        walk.path.push(top);
        walk.visit(top);
        walk.path.pop();
    }
    walk.out
}

impl LayoutRenderer for LayoutView {
    fn load_layout(&mut self, path: &Path) -> Result<(), RenderError> {
        let db = read_gds_file(path).map_err(|source| RenderError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!(
            "Loaded layout '{}' from {} ({} cells)",
            db.name,
            path.display(),
            db.cell_count()
        );
        self.bboxes = db.compute_bboxes();
        self.db = Some(db);
        self.max_depth = 0;
        self.drag = None;
        self.frame = None;
        self.rebuild_shapes();
        Ok(())
    }

    fn max_hier(&mut self) {
        let depth = self.db.as_ref().map_or(0, LayoutDatabase::hierarchy_depth);
        if depth != self.max_depth {
            self.max_depth = depth;
            self.rebuild_shapes();
        }
    }

    fn zoom_fit(&mut self) {
        let Some(db) = &self.db else {
            return;
        };
        let extent = union_all(
            db.top_cells()
                .into_iter()
                .filter_map(|top| self.bboxes.get(top).copied().flatten()),
        );
        if let Some(extent) = extent {
            self.viewport.fit_bbox(&extent);
            self.dirty = true;
        }
    }

    fn add_missing_layers(&mut self) {
        let used: BTreeSet<LayerId> = self.shapes.iter().filter_map(|s| s.layer).collect();
        if let Some(db) = &mut self.db {
            let added = db.layer_stack.add_missing(used);
            if added > 0 {
                log::debug!("Added {} missing layer(s)", added);
                self.dirty = true;
            }
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.viewport.resize(width as f64, height as f64);
        self.dirty = true;
    }

    fn screenshot_png(&self) -> Result<Vec<u8>, RenderError> {
        let image = match (&self.frame, self.dirty) {
            (Some(frame), false) => Cow::Borrowed(frame),
            _ => Cow::Owned(self.render()),
        };
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    fn timer(&mut self) {
        if !self.dirty {
            return;
        }
        self.frame = Some(self.render());
        self.dirty = false;
        if let Some(callback) = self.on_image_updated.as_mut() {
            callback();
        }
    }

    fn on_image_updated(&mut self, callback: ImageUpdatedCallback) {
        self.on_image_updated = Some(callback);
    }

    fn send_mouse_press_event(&mut self, p: Point, buttons: ButtonState) {
        if buttons == ButtonState::LeftButton {
            self.drag = Some(Drag {
                origin: p,
                last: p,
                moved: false,
            });
        }
    }

    fn send_mouse_double_clicked_event(&mut self, p: Point, buttons: ButtonState) {
        if buttons != ButtonState::LeftButton {
            return;
        }
        self.drag = None;
        self.select_at(&p);
        if let Some(&first) = self.selection.first() {
            let target = self.shapes[first].owner_bbox;
            self.viewport.fit_bbox(&target);
            self.dirty = true;
        }
    }

    fn send_mouse_release_event(&mut self, p: Point, buttons: ButtonState) {
        if buttons != ButtonState::LeftButton {
            return;
        }
        match self.drag.take() {
            Some(drag) if !drag.moved => self.select_at(&p),
            _ => {}
        }
    }

    fn send_mouse_move_event(&mut self, p: Point, _buttons: ButtonState) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        if !drag.moved && drag.origin.distance_to(&p) > CLICK_TOLERANCE {
            drag.moved = true;
        }
        if drag.moved {
            let (dx, dy) = (p.x - drag.last.x, p.y - drag.last.y);
            drag.last = p;
            self.viewport.pan(dx, dy);
            self.dirty = true;
        }
    }

    fn send_enter_event(&mut self) {
        self.hovering = true;
    }

    fn send_leave_event(&mut self) {
        self.hovering = false;
        self.drag = None;
    }

    fn zoom_in(&mut self) {
        self.viewport.zoom_centered(ZOOM_STEP);
        self.dirty = true;
    }

    fn zoom_out(&mut self) {
        self.viewport.zoom_centered(1.0 / ZOOM_STEP);
        self.dirty = true;
    }

    fn selected_objects(&self) -> Vec<SelectedObject> {
        self.selection
            .iter()
            .map(|&i| SelectedObject {
                path: self.shapes[i].path.clone(),
            })
            .collect()
    }

    fn top_cells(&self) -> Vec<CellIndex> {
        self.db.as_ref().map(LayoutDatabase::top_cells).unwrap_or_default()
    }

    fn child_cells(&self, cell: CellIndex) -> Vec<CellIndex> {
        self.db
            .as_ref()
            .map(|db| db.child_cells(cell))
            .unwrap_or_default()
    }

    fn cell_name(&self, cell: CellIndex) -> Option<String> {
        self.db.as_ref()?.cell(cell).map(|c| c.name.clone())
    }

    fn cell_bbox(&self, cell: CellIndex) -> Option<BBox> {
        self.bboxes.get(cell).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as Counter;
    use std::rc::Rc;

    use iklayout_core::geometry::{GeomPrimitive, Rect};
    use iklayout_core::{Cell, CellInstance};
    use iklayout_io::write_transfer_file;

    /// TOP: 30x10 rect on layer 1, CHILD (4x4 on layer 2) placed at (20, 0).
    fn load_sample(view: &mut LayoutView) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut db = LayoutDatabase::new("sample");
        let mut top = Cell::new("TOP");
        top.add_geometry(GeomPrimitive::Rect(Rect::new(1, 0.0, 0.0, 30.0, 10.0)));
        let top = db.add_cell(top).unwrap();
        let mut child = Cell::new("CHILD");
        child.add_geometry(GeomPrimitive::Rect(Rect::new(2, 0.0, 0.0, 4.0, 4.0)));
        let child = db.add_cell(child).unwrap();
        db.add_instance(top, CellInstance::new(child, Transform::translate(20.0, 0.0)))
            .unwrap();
        let path = write_transfer_file(&db, dir.path()).unwrap();
        view.load_layout(&path).unwrap();
        dir
    }

    fn screen_of(view: &LayoutView, x: f64, y: f64) -> Point {
        let (sx, sy) = view.viewport.layout_to_screen(&Point::new(x, y));
        Point::new(sx, sy)
    }

    fn click(view: &mut LayoutView, p: Point) {
        view.send_mouse_press_event(p, ButtonState::LeftButton);
        view.send_mouse_release_event(p, ButtonState::LeftButton);
    }

    #[test]
    fn test_missing_file_fails_to_load() {
        let mut view = LayoutView::new();
        let err = view.load_layout(Path::new("/nonexistent/layout.gds")).unwrap_err();
        assert!(matches!(err, RenderError::Load { .. }));
    }

    #[test]
    fn test_hierarchy_levels_gate_missing_layers() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        view.add_missing_layers();
        assert_eq!(view.layout().unwrap().layer_stack.layer_count(), 1);

        view.max_hier();
        view.add_missing_layers();
        assert_eq!(view.layout().unwrap().layer_stack.layer_count(), 2);
    }

    #[test]
    fn test_screenshot_tracks_resize() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        view.resize(800, 600);
        view.resize(400, 300);
        let png = view.screenshot_png().unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (400, 300));
    }

    #[test]
    fn test_timer_notifies_only_on_change() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        let fired = Rc::new(Counter::new(0));
        let counter = fired.clone();
        view.on_image_updated(Box::new(move || counter.set(counter.get() + 1)));

        view.timer();
        view.timer();
        assert_eq!(fired.get(), 1);

        view.zoom_in();
        view.timer();
        assert_eq!(fired.get(), 2);

        view.send_enter_event();
        view.timer();
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn test_screenshot_does_not_consume_change() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        let fired = Rc::new(Counter::new(0));
        let counter = fired.clone();
        view.on_image_updated(Box::new(move || counter.set(counter.get() + 1)));
        view.screenshot_png().unwrap();
        view.timer();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_click_selects_innermost_first() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        view.max_hier();
        view.zoom_fit();

        let p = screen_of(&view, 22.0, 2.0);
        click(&mut view, p);
        let selected = view.selected_objects();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].path, vec![0, 1]);
        assert_eq!(selected[1].path, vec![0]);
        assert_eq!(selected[0].cell_index(), Some(1));
    }

    #[test]
    fn test_frames_are_pickable_before_expansion() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        view.zoom_fit();
        let p = screen_of(&view, 22.0, 2.0);
        click(&mut view, p);
        assert_eq!(view.selected_objects()[0].path, vec![0, 1]);
    }

    #[test]
    fn test_click_on_empty_space_clears_selection() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        view.zoom_fit();
        let p = screen_of(&view, 5.0, 5.0);
        click(&mut view, p);
        assert_eq!(view.selected_objects().len(), 1);
        let p = screen_of(&view, 15.0, 15.0);
        click(&mut view, p);
        assert!(view.selected_objects().is_empty());
    }

    #[test]
    fn test_drag_pans_without_selecting() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        view.zoom_fit();
        let center_before = view.viewport.center_x;
        let start = screen_of(&view, 5.0, 5.0);
        view.send_mouse_press_event(start, ButtonState::LeftButton);
        view.send_mouse_move_event(Point::new(start.x + 48.0, start.y), ButtonState::LeftButton);
        view.send_mouse_release_event(Point::new(start.x + 48.0, start.y), ButtonState::LeftButton);
        assert!(view.selected_objects().is_empty());
        // zoom_fit gives 24 px per unit, so 48 px drag moves the centre by 2 units.
        assert!((view.viewport.center_x - (center_before - 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_leave_cancels_drag() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        view.send_enter_event();
        assert!(view.is_hovering());
        view.send_mouse_press_event(Point::new(10.0, 10.0), ButtonState::LeftButton);
        view.send_leave_event();
        view.send_mouse_move_event(Point::new(200.0, 10.0), ButtonState::LeftButton);
        assert!(!view.is_hovering());
        assert_eq!(view.viewport.center_x, 0.0);
    }

    #[test]
    fn test_double_click_zooms_to_cell() {
        let mut view = LayoutView::new();
        let _dir = load_sample(&mut view);
        view.max_hier();
        view.zoom_fit();
        view.send_mouse_double_clicked_event(screen_of(&view, 22.0, 2.0), ButtonState::LeftButton);
        assert_eq!(view.viewport.center_x, 22.0);
        assert_eq!(view.viewport.center_y, 2.0);
    }

    #[test]
    fn test_cell_tree_queries() {
        let mut view = LayoutView::new();
        assert!(view.top_cells().is_empty());
        let _dir = load_sample(&mut view);
        assert_eq!(view.top_cells(), vec![0]);
        assert_eq!(view.child_cells(0), vec![1]);
        assert_eq!(view.cell_name(1).as_deref(), Some("CHILD"));
        assert_eq!(view.cell_bbox(0).unwrap().to_array(), [0.0, 0.0, 30.0, 10.0]);
        assert!(view.cell_name(9).is_none());
    }
}
