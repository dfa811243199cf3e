//! Container scanning and class metadata extraction.
//!
//! A [`vfs::Container`] enumerates the entries of a directory tree or an
//! archive, a [`adapters::MetadataAdapter`] turns accepted entries into
//! resolved units and extracts their structure, and [`stats::ScanStats`]
//! accumulates timings for every scan and query.

pub mod adapters;
pub mod config;
pub mod errors;
pub mod metadata;
pub mod scan;
pub mod stats;
pub mod vfs;

pub use adapters::MetadataAdapter;
pub use adapters::bytecode::BytecodeAdapter;
pub use config::ScanConfig;
pub use metadata::UnitMetadata;
pub use scan::{ScanReport, Scanner};
pub use stats::ScanStats;
pub use vfs::{Container, Entry};
