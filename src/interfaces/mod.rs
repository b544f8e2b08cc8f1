//! Application-side data shapes: extraction from typed source and mapping
//! onto captured tables.

pub mod archive;
pub mod mapper;
pub mod scanner;

pub use archive::{scan_archive, ArchiveError};
pub use mapper::map_interfaces;
