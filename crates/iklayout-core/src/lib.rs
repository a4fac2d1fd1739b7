//! # iklayout Core
//!
//! Layout database with an indexed cell hierarchy, geometric primitives,
//! technology layers and an R-tree spatial index.
//!
//! A [`LayoutDatabase`] is the in-memory design a viewer session can be
//! started from.

pub mod geometry;
pub mod cell;
pub mod database;
pub mod error;
pub mod layer;
pub mod spatial;

pub use database::LayoutDatabase;
pub use cell::{Cell, CellIndex, CellInstance, Transform};
pub use error::CoreError;
pub use layer::{Layer, LayerId, LayerStack};
pub use geometry::{BBox, Rect, Polygon, Path, Via, Point, GeomPrimitive};
