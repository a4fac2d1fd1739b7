use thiserror::Error;

use crate::cell::CellIndex;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Cell '{0}' already exists")]
    DuplicateCell(String),

    #[error("Cell index {0} is out of range")]
    CellOutOfRange(CellIndex),

    #[error("Cell '{0}' instantiates itself")]
    RecursiveHierarchy(String),
}
