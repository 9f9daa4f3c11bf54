// Data Models
pub mod entry;
pub mod folder_spec;

pub use entry::{ArchiveEntry, ArchiveSummary, ScannedEntry};
pub use folder_spec::FolderSpec;
