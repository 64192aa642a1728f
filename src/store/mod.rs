//! Metadata store: folders, slides and reports in SQLite.
//!
//! The store only catalogues uploads. Tile serving never consults it; slides
//! are addressed by file name in the slide directory.

mod models;
mod sqlite;

pub use models::{Folder, Report, ReportInput, Slide};
pub use sqlite::{timestamp, MetadataStore};
