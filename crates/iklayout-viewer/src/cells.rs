//! Flattened view of the renderer's cell tree and selection resolution.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use iklayout_core::cell::CellIndex;
use iklayout_core::geometry::BBox;
use iklayout_renderer::LayoutRenderer;

/// Snapshot of one node of the cell hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellInfo {
    pub name: String,
    pub id: CellIndex,
    /// `None` for cells without any geometry.
    pub bbox: Option<BBox>,
    pub is_top: bool,
}

/// How several selected objects collapse into the reported cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Only the first selected object that resolves to a cell.
    #[default]
    First,
    /// Every resolving object, deduplicated, in selection order.
    All,
}

/// Every cell reachable from a top cell, depth first, parents before
/// children. A cell placed under several parents appears once.
pub fn all_cells<R: LayoutRenderer + ?Sized>(renderer: &R) -> Vec<CellInfo> {
    let mut cells = Vec::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<(CellIndex, bool)> = renderer
        .top_cells()
        .into_iter()
        .rev()
        .map(|id| (id, true))
        .collect();

    while let Some((id, is_top)) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(name) = renderer.cell_name(id) else {
            log::warn!("Cell {} listed in hierarchy but has no name", id);
            continue;
        };
        cells.push(CellInfo {
            name,
            id,
            bbox: renderer.cell_bbox(id),
            is_top,
        });
        stack.extend(
            renderer
                .child_cells(id)
                .into_iter()
                .rev()
                .filter(|child| !visited.contains(child))
                .map(|child| (child, false)),
        );
    }
    cells
}

/// Cells owning the renderer's current selection, per `policy`.
/// Empty when nothing resolvable is selected.
pub fn resolve_selection<R: LayoutRenderer + ?Sized>(
    renderer: &R,
    policy: SelectionPolicy,
) -> Vec<CellInfo> {
    let selected = renderer.selected_objects();
    if selected.is_empty() {
        return Vec::new();
    }
    let cells = all_cells(renderer);

    let mut found: Vec<CellInfo> = Vec::new();
    for object in &selected {
        let Some(index) = object.cell_index() else {
            continue;
        };
        let Some(info) = cells.iter().find(|c| c.id == index) else {
            continue;
        };
        if found.iter().any(|c| c.id == info.id) {
            continue;
        }
        found.push(info.clone());
        if policy == SelectionPolicy::First {
            break;
        }
    }
    found
}
