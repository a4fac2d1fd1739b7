use serde::{Deserialize, Serialize};

use crate::geometry::{union_all, BBox, GeomPrimitive, Point};
use crate::LayerId;

/// Position of a cell inside its [`LayoutDatabase`](crate::LayoutDatabase).
/// Unique and stable for the lifetime of a loaded layout.
pub type CellIndex = usize;

/// A transformation for placing subcell instances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation offset.
    pub offset: Point,
    /// Rotation in degrees, counter-clockwise.
    pub rotation: f64,
    /// Mirror about X axis (applied before rotation).
    pub mirror_x: bool,
    /// Uniform magnification.
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            offset: Point::new(0.0, 0.0),
            rotation: 0.0,
            mirror_x: false,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            offset: Point::new(x, y),
            ..Default::default()
        }
    }

    pub fn apply(&self, point: &Point) -> Point {
        let mut p = *point;

        p.x *= self.scale;
        p.y *= self.scale;

        if self.mirror_x {
            p.y = -p.y;
        }

        let rad = self.rotation.to_radians();
        let cos_r = rad.cos();
        let sin_r = rad.sin();
        let rx = p.x * cos_r - p.y * sin_r;
        let ry = p.x * sin_r + p.y * cos_r;

        Point::new(rx + self.offset.x, ry + self.offset.y)
    }

    /// Bounding box of a transformed box (exact for 90-degree rotations).
    pub fn apply_bbox(&self, bbox: &BBox) -> BBox {
        let corners = bbox.corners().map(|c| self.apply(&c));
        // Four corners are never empty.
        BBox::from_points(&corners).unwrap_or(*bbox)
    }
}

/// A placement of a child cell within a parent cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellInstance {
    pub cell: CellIndex,
    pub transform: Transform,
}

impl CellInstance {
    pub fn new(cell: CellIndex, transform: Transform) -> Self {
        Self { cell, transform }
    }
}

/// A layout cell containing geometric primitives and subcell references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub name: String,
    pub geometries: Vec<GeomPrimitive>,
    pub instances: Vec<CellInstance>,
}

impl Cell {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            geometries: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub fn add_geometry(&mut self, geom: GeomPrimitive) {
        self.geometries.push(geom);
    }

    pub fn add_instance(&mut self, instance: CellInstance) {
        self.instances.push(instance);
    }

    /// Compute the bounding box of all geometry in this cell (not including subcells).
    pub fn local_bbox(&self) -> Option<BBox> {
        union_all(self.geometries.iter().filter_map(GeomPrimitive::bbox))
    }

    /// Layer numbers used by this cell's own geometry.
    pub fn layers(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.geometries.iter().map(GeomPrimitive::layer_id)
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
