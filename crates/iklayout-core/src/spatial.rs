use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{BBox, Point};

/// An entry in the R-tree spatial index, referencing a flattened shape by its index.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
    /// Index into the owner's flattened shape list.
    pub shape_index: usize,
    /// Bounding box of the shape in top-level coordinates.
    pub bbox: BBox,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.y],
            [self.bbox.max.x, self.bbox.max.y],
        )
    }
}

/// Spatial index for point picking and viewport culling.
#[derive(Default)]
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from a list of shape bounding boxes.
    pub fn build(entries: Vec<SpatialEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Find all entries whose bounding box contains the given point.
    pub fn query_point(&self, point: &Point) -> Vec<&SpatialEntry> {
        let at = AABB::from_point([point.x, point.y]);
        self.tree.locate_in_envelope_intersecting(&at).collect()
    }

    /// Find all entries that intersect with the given viewport bounding box.
    pub fn query_viewport(&self, viewport: &BBox) -> Vec<&SpatialEntry> {
        let envelope = AABB::from_corners(
            [viewport.min.x, viewport.min.y],
            [viewport.max.x, viewport.max.y],
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
