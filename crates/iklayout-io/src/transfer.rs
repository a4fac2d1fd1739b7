use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use iklayout_core::LayoutDatabase;

use crate::gds::{GdsError, GdsWriter};

/// Materialise an in-memory design as a GDS-II file inside `dir`.
///
/// The file is named after the library and the database id, so writing the
/// same design twice overwrites the previous transfer file.
pub fn write_transfer_file(db: &LayoutDatabase, dir: &Path) -> Result<PathBuf, GdsError> {
    std::fs::create_dir_all(dir)?;
    let stem: String = db
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let path = dir.join(format!("{}-{}.gds", stem, db.id.simple()));

    let file = File::create(&path)?;
    GdsWriter::new(BufWriter::new(file)).write(db)?;
    log::debug!("Wrote transfer file {}", path.display());
    Ok(path)
}
