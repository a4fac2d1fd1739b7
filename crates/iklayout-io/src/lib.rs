//! # iklayout I/O
//!
//! GDS-II stream reader and writer. GDS-II is also the transfer format an
//! in-memory design is materialised to before a renderer loads it.

pub mod gds;
pub mod transfer;

pub use gds::{read_gds_file, GdsError, GdsReader, GdsWriter};
pub use transfer::write_transfer_file;
