use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cell::{Cell, CellIndex, CellInstance};
use crate::error::CoreError;
use crate::geometry::{union_all, BBox};
use crate::layer::LayerStack;

/// The central layout database that holds all cells and the technology layer stack.
///
/// This is the in-memory design handed to a viewer; it is materialised to a
/// GDS-II transfer file before a renderer loads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDatabase {
    /// Database identifier, used to name transfer files.
    pub id: Uuid,
    /// Library name.
    pub name: String,
    /// Technology layers.
    pub layer_stack: LayerStack,
    /// All cells, addressed by their position.
    cells: Vec<Cell>,
    #[serde(skip)]
    name_index: HashMap<String, CellIndex>,
    /// Size of one database unit in micrometers.
    pub dbu_in_um: f64,
}

impl LayoutDatabase {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            layer_stack: LayerStack::new(),
            cells: Vec::new(),
            name_index: HashMap::new(),
            dbu_in_um: 0.001,
        }
    }

    // ── Cell management ──────────────────────────────────────────────

    pub fn add_cell(&mut self, cell: Cell) -> Result<CellIndex, CoreError> {
        if self.name_index.contains_key(&cell.name) {
            return Err(CoreError::DuplicateCell(cell.name));
        }
        let index = self.cells.len();
        self.name_index.insert(cell.name.clone(), index);
        self.cells.push(cell);
        Ok(index)
    }

    /// Place `child` inside `parent`.
    pub fn add_instance(
        &mut self,
        parent: CellIndex,
        instance: CellInstance,
    ) -> Result<(), CoreError> {
        if instance.cell >= self.cells.len() {
            return Err(CoreError::CellOutOfRange(instance.cell));
        }
        let cell = self
            .cells
            .get_mut(parent)
            .ok_or(CoreError::CellOutOfRange(parent))?;
        cell.add_instance(instance);
        Ok(())
    }

    pub fn cell(&self, index: CellIndex) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cell_mut(&mut self, index: CellIndex) -> Option<&mut Cell> {
        self.cells.get_mut(index)
    }

    pub fn find_cell(&self, name: &str) -> Option<CellIndex> {
        self.name_index.get(name).copied()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn all_cells(&self) -> impl Iterator<Item = (CellIndex, &Cell)> {
        self.cells.iter().enumerate()
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    /// Cells that no other cell instantiates, in index order.
    pub fn top_cells(&self) -> Vec<CellIndex> {
        let mut referenced = vec![false; self.cells.len()];
        for cell in &self.cells {
            for inst in &cell.instances {
                if let Some(flag) = referenced.get_mut(inst.cell) {
                    *flag = true;
                }
            }
        }
        (0..self.cells.len()).filter(|&i| !referenced[i]).collect()
    }

    /// Distinct child cells of `index`, in first-instance order.
    pub fn child_cells(&self, index: CellIndex) -> Vec<CellIndex> {
        let mut children: Vec<CellIndex> = Vec::new();
        if let Some(cell) = self.cells.get(index) {
            for inst in &cell.instances {
                if !children.contains(&inst.cell) {
                    children.push(inst.cell);
                }
            }
        }
        children
    }

    /// Fail if any cell (transitively) instantiates itself.
    pub fn validate_hierarchy(&self) -> Result<(), CoreError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(db: &LayoutDatabase, index: CellIndex, marks: &mut [Mark]) -> Result<(), CoreError> {
            match marks[index] {
                Mark::Done => return Ok(()),
                Mark::Active => {
                    return Err(CoreError::RecursiveHierarchy(db.cells[index].name.clone()))
                }
                Mark::New => {}
            }
            marks[index] = Mark::Active;
            for child in db.child_cells(index) {
                if child >= marks.len() {
                    return Err(CoreError::CellOutOfRange(child));
                }
                visit(db, child, marks)?;
            }
            marks[index] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::New; self.cells.len()];
        for index in 0..self.cells.len() {
            visit(self, index, &mut marks)?;
        }
        Ok(())
    }

    /// Hierarchical bounding box of every cell, indexed by [`CellIndex`].
    ///
    /// Expects an acyclic hierarchy (see [`Self::validate_hierarchy`]).
    pub fn compute_bboxes(&self) -> Vec<Option<BBox>> {
        fn resolve(
            db: &LayoutDatabase,
            index: CellIndex,
            memo: &mut Vec<Option<Option<BBox>>>,
        ) -> Option<BBox> {
            if let Some(done) = memo[index] {
                return done;
            }
            let cell = &db.cells[index];
            let mut boxes: Vec<BBox> = cell.local_bbox().into_iter().collect();
            for inst in &cell.instances {
                if let Some(child) = resolve(db, inst.cell, memo) {
                    boxes.push(inst.transform.apply_bbox(&child));
                }
            }
            let bbox = union_all(boxes);
            memo[index] = Some(bbox);
            bbox
        }

        let mut memo = vec![None; self.cells.len()];
        (0..self.cells.len())
            .map(|index| resolve(self, index, &mut memo))
            .collect()
    }

    /// Longest instance chain below any top cell (0 for a flat layout).
    pub fn hierarchy_depth(&self) -> usize {
        fn depth(db: &LayoutDatabase, index: CellIndex, memo: &mut Vec<Option<usize>>) -> usize {
            if let Some(d) = memo[index] {
                return d;
            }
            let d = db
                .child_cells(index)
                .into_iter()
                .map(|child| depth(db, child, memo) + 1)
                .max()
                .unwrap_or(0);
            memo[index] = Some(d);
            d
        }

        let mut memo = vec![None; self.cells.len()];
        self.top_cells()
            .into_iter()
            .map(|top| depth(self, top, &mut memo))
            .max()
            .unwrap_or(0)
    }

    /// Rebuild the name lookup after deserialization.
    pub fn reindex(&mut self) {
        self.name_index = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
    }
}
