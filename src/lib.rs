//! 논리 이름 단위로 파일/폴더를 하나의 zip 또는 tar 아카이브에 백업하고 복원한다.
//!
//! ```no_run
//! use boksl_backup::{Backup, BackupConfig, FolderSpec};
//!
//! let backup = Backup::new(BackupConfig::for_file("/var/backups/site.zip"))?;
//! backup.add_file("db", "/tmp/dump.sql".as_ref())?;
//! backup.add_folder("uploads", &FolderSpec::recursive("/srv/app/uploads"))?;
//!
//! backup.extract_file("db/dump.sql", "/tmp/restore/dump.sql".as_ref())?;
//! backup.extract_folder("uploads", &FolderSpec::new("/srv/app/uploads"))?;
//! # Ok::<(), boksl_backup::BackupError>(())
//! ```

pub mod models;
pub mod system;
pub mod utils;

pub use models::{ArchiveEntry, ArchiveSummary, FolderSpec, ScannedEntry};
pub use system::{ArchiveCodec, ArchiveFormat, Backup};
pub use utils::alias::{AliasMap, PathResolver};
pub use utils::config::{BackupConfig, ExtractCheck, ExtractMode};
pub use utils::error::{BackupError, Result};
