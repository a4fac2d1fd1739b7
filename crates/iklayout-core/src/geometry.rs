use serde::{Deserialize, Serialize};

use crate::LayerId;

/// A 2D point in layout coordinates (micrometers).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        })
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    /// The four corners, counter-clockwise from the lower left.
    pub fn corners(&self) -> [Point; 4] {
        [
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ]
    }

    /// `[left, bottom, right, top]`, the layout-unit rectangle exported to viewers.
    pub fn to_array(&self) -> [f64; 4] {
        [self.min.x, self.min.y, self.max.x, self.max.y]
    }
}

/// Union of an iterator of boxes, `None` when it is empty.
pub fn union_all<I: IntoIterator<Item = BBox>>(boxes: I) -> Option<BBox> {
    boxes.into_iter().reduce(|acc, bb| acc.union(&bb))
}

/// A rectangle defined by lower-left and upper-right corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub layer_id: LayerId,
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rect {
    pub fn new(layer_id: LayerId, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            layer_id,
            lower_left: Point::new(x1.min(x2), y1.min(y2)),
            upper_right: Point::new(x1.max(x2), y1.max(y2)),
        }
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(self.lower_left, self.upper_right)
    }

    pub fn width(&self) -> f64 {
        self.upper_right.x - self.lower_left.x
    }

    pub fn height(&self) -> f64 {
        self.upper_right.y - self.lower_left.y
    }
}

/// A polygon defined by a list of vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub layer_id: LayerId,
    pub vertices: Vec<Point>,
}

impl Polygon {
    pub fn new(layer_id: LayerId, vertices: Vec<Point>) -> Self {
        Self { layer_id, vertices }
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.vertices)
    }

    /// Even-odd containment test.
    pub fn contains_point(&self, p: &Point) -> bool {
        contains_even_odd(&self.vertices, p)
    }
}

/// Even-odd ray casting over an implicitly closed vertex ring.
pub fn contains_even_odd(vertices: &[Point], p: &Point) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (vertices[i], vertices[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// A path (wire) defined by a centerline and width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub layer_id: LayerId,
    pub points: Vec<Point>,
    pub width: f64,
}

impl Path {
    pub fn new(layer_id: LayerId, points: Vec<Point>, width: f64) -> Self {
        Self {
            layer_id,
            points,
            width,
        }
    }

    pub fn bbox(&self) -> Option<BBox> {
        let half_w = self.width / 2.0;
        let expanded: Vec<Point> = self
            .points
            .iter()
            .flat_map(|p| {
                [
                    Point::new(p.x - half_w, p.y - half_w),
                    Point::new(p.x + half_w, p.y + half_w),
                ]
            })
            .collect();
        BBox::from_points(&expanded)
    }

    /// One quad per centerline segment, flush ends.
    pub fn segment_quads(&self) -> Vec<[Point; 4]> {
        let half_w = self.width / 2.0;
        self.points
            .windows(2)
            .filter_map(|w| {
                let (a, b) = (w[0], w[1]);
                let len = a.distance_to(&b);
                if len == 0.0 {
                    return None;
                }
                let nx = -(b.y - a.y) / len * half_w;
                let ny = (b.x - a.x) / len * half_w;
                Some([
                    Point::new(a.x + nx, a.y + ny),
                    Point::new(b.x + nx, b.y + ny),
                    Point::new(b.x - nx, b.y - ny),
                    Point::new(a.x - nx, a.y - ny),
                ])
            })
            .collect()
    }
}

/// A via connecting two layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Via {
    pub bottom_layer: LayerId,
    pub top_layer: LayerId,
    pub cut_layer: LayerId,
    pub position: Point,
    pub width: f64,
    pub height: f64,
}

impl Via {
    pub fn new(
        bottom_layer: LayerId,
        top_layer: LayerId,
        cut_layer: LayerId,
        position: Point,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            bottom_layer,
            top_layer,
            cut_layer,
            position,
            width,
            height,
        }
    }

    pub fn bbox(&self) -> BBox {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        BBox::new(
            Point::new(self.position.x - half_w, self.position.y - half_h),
            Point::new(self.position.x + half_w, self.position.y + half_h),
        )
    }
}

/// A geometric primitive in the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeomPrimitive {
    Rect(Rect),
    Polygon(Polygon),
    Path(Path),
    Via(Via),
}

impl GeomPrimitive {
    pub fn bbox(&self) -> Option<BBox> {
        match self {
            GeomPrimitive::Rect(r) => Some(r.bbox()),
            GeomPrimitive::Polygon(p) => p.bbox(),
            GeomPrimitive::Path(p) => p.bbox(),
            GeomPrimitive::Via(v) => Some(v.bbox()),
        }
    }

    pub fn layer_id(&self) -> LayerId {
        match self {
            GeomPrimitive::Rect(r) => r.layer_id,
            GeomPrimitive::Polygon(p) => p.layer_id,
            GeomPrimitive::Path(p) => p.layer_id,
            GeomPrimitive::Via(v) => v.cut_layer,
        }
    }

    /// The filled outline(s) of this primitive as closed vertex rings.
    pub fn outlines(&self) -> Vec<Vec<Point>> {
        match self {
            GeomPrimitive::Rect(r) => vec![r.bbox().corners().to_vec()],
            GeomPrimitive::Polygon(p) => vec![p.vertices.clone()],
            GeomPrimitive::Path(p) => p.segment_quads().into_iter().map(|q| q.to_vec()).collect(),
            GeomPrimitive::Via(v) => vec![v.bbox().corners().to_vec()],
        }
    }
}
