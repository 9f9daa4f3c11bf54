//! zip 컨테이너
//!
//! 새 엔트리는 기존 컨테이너 끝에 바로 이어 쓴다. 이미 있는 파일 엔트리를 다시
//! 추가하면 새 내용을 별도 임시 zip에 기록해 두었다가, commit 시 컨테이너를
//! 옛 엔트리 없이 다시 조립한다 (압축 데이터는 raw copy).

use super::{
    container_dir, ensure_parent_dir, persist_container, ArchiveCodec, ArchiveFormat,
    ArchiveReader, ArchiveWriter, CodecOptions, EntryVisitor,
};
use crate::models::ArchiveEntry;
use crate::system::stream::copy_chunked;
use crate::utils::error::{BackupError, Result};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions as ZipFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// 이 크기 이상의 파일은 ZIP64로 기록
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

#[derive(Debug, Clone, Copy)]
pub struct ZipCodec {
    options: CodecOptions,
}

impl ZipCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    fn file_options(&self) -> ZipFileOptions {
        ZipFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(self.options.compression_level.map(i64::from))
    }
}

impl ArchiveCodec for ZipCodec {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn open_writer(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>> {
        ensure_parent_dir(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| BackupError::open(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| BackupError::open(path, e))?
            .len();

        let (writer, existing) = if len == 0 {
            (ZipWriter::new(file), HashSet::new())
        } else {
            let current = File::open(path)
                .map_err(|e| BackupError::open(path, e))
                .and_then(|f| ZipArchive::new(f).map_err(|e| BackupError::open(path, e)))?;
            let existing: HashSet<String> = current.file_names().map(str::to_string).collect();
            let writer = ZipWriter::new_append(file).map_err(|e| BackupError::open(path, e))?;
            (writer, existing)
        };
        debug!("opened zip container {} (existing bytes: {})", path.display(), len);

        Ok(Box::new(ZipArchiveWriter {
            path: path.to_path_buf(),
            writer,
            options: self.file_options(),
            chunk_size: self.options.chunk_size,
            existing,
            added: HashSet::new(),
            replacements: None,
            replaced: HashSet::new(),
        }))
    }

    fn open_reader(&self, path: &Path) -> Result<Box<dyn ArchiveReader>> {
        let file = File::open(path).map_err(|e| BackupError::open(path, e))?;
        let archive = ZipArchive::new(file).map_err(|e| BackupError::open(path, e))?;
        Ok(Box::new(ZipArchiveReader {
            path: path.to_path_buf(),
            archive,
        }))
    }
}

struct ZipArchiveWriter {
    path: PathBuf,
    writer: ZipWriter<File>,
    options: ZipFileOptions,
    chunk_size: usize,
    /// 열 때 컨테이너에 있던 엔트리 이름
    existing: HashSet<String>,
    added: HashSet<String>,
    /// 기존 파일 엔트리를 대신할 새 내용 (익명 임시 파일)
    replacements: Option<ZipWriter<File>>,
    replaced: HashSet<String>,
}

impl ZipArchiveWriter {
    fn duplicate(&self, entry_name: &str) -> BackupError {
        BackupError::stream(&self.path, format!("{}: Duplicate entry name", entry_name))
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn add_directory(&mut self, entry_name: &str) -> Result<()> {
        if self.existing.contains(entry_name) {
            debug!("directory marker {} already present", entry_name);
            return Ok(());
        }
        if self.added.contains(entry_name) {
            return Err(self.duplicate(entry_name));
        }
        self.writer
            .add_directory(entry_name.to_string(), self.options)
            .map_err(|e| BackupError::stream(&self.path, format!("{}: {}", entry_name, e)))?;
        self.added.insert(entry_name.to_string());
        Ok(())
    }

    fn add_file(&mut self, entry_name: &str, source: &Path) -> Result<u64> {
        if self.added.contains(entry_name) {
            return Err(self.duplicate(entry_name));
        }
        let replacing = self.existing.contains(entry_name);
        if replacing && self.replacements.is_none() {
            let staging = tempfile::tempfile().map_err(|e| BackupError::stream(&self.path, e))?;
            self.replacements = Some(ZipWriter::new(staging));
        }

        let target = match self.replacements.as_mut() {
            Some(staging) if replacing => staging,
            _ => &mut self.writer,
        };
        let copied = write_file_entry(
            target,
            &self.path,
            entry_name,
            source,
            self.options,
            self.chunk_size,
        )?;

        self.added.insert(entry_name.to_string());
        if replacing {
            self.replaced.insert(entry_name.to_string());
        }
        Ok(copied)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let ZipArchiveWriter {
            path,
            writer,
            replacements,
            replaced,
            ..
        } = *self;
        let file = writer
            .finish()
            .map_err(|e| BackupError::commit(&path, e))?;
        file.sync_all().map_err(|e| BackupError::commit(&path, e))?;
        drop(file);

        if let Some(staging) = replacements {
            let staged = staging
                .finish()
                .map_err(|e| BackupError::commit(&path, e))
                .and_then(|f| ZipArchive::new(f).map_err(|e| BackupError::commit(&path, e)))?;
            rebuild_with_replacements(&path, staged, &replaced)?;
            debug!("replaced {} entries in {}", replaced.len(), path.display());
        }
        info!("committed zip container {}", path.display());
        Ok(())
    }
}

/// `source`를 새 엔트리로 스트리밍. 복사 도중 실패하면 반쯤 기록된 엔트리는 버린다.
fn write_file_entry(
    writer: &mut ZipWriter<File>,
    archive_path: &Path,
    entry_name: &str,
    source: &Path,
    options: ZipFileOptions,
    chunk_size: usize,
) -> Result<u64> {
    let mut src = File::open(source).map_err(|e| BackupError::stream(source, e))?;
    let size = src
        .metadata()
        .map_err(|e| BackupError::stream(source, e))?
        .len();

    let options = options.large_file(size >= ZIP64_THRESHOLD);
    writer
        .start_file(entry_name.to_string(), options)
        .map_err(|e| BackupError::stream(archive_path, format!("{}: {}", entry_name, e)))?;

    match copy_chunked(&mut src, &mut *writer, chunk_size) {
        Ok(copied) => Ok(copied),
        Err(e) => {
            if let Err(abort) = writer.abort_file() {
                warn!(
                    "failed to discard partial entry {} in {}: {}",
                    entry_name,
                    archive_path.display(),
                    abort
                );
            }
            Err(BackupError::stream(source, e))
        }
    }
}

/// 교체된 엔트리를 뺀 기존 엔트리 + 새 엔트리로 컨테이너를 다시 만든다.
fn rebuild_with_replacements(
    path: &Path,
    mut staged: ZipArchive<File>,
    replaced: &HashSet<String>,
) -> Result<()> {
    let file = File::open(path).map_err(|e| BackupError::commit(path, e))?;
    let mut current = ZipArchive::new(file).map_err(|e| BackupError::commit(path, e))?;
    let temp =
        NamedTempFile::new_in(container_dir(path)).map_err(|e| BackupError::commit(path, e))?;
    let mut out = ZipWriter::new(temp);

    for idx in 0..current.len() {
        let entry = current
            .by_index_raw(idx)
            .map_err(|e| BackupError::commit(path, e))?;
        if replaced.contains(entry.name()) {
            continue;
        }
        out.raw_copy_file(entry).map_err(|e| BackupError::commit(path, e))?;
    }
    for idx in 0..staged.len() {
        let entry = staged
            .by_index_raw(idx)
            .map_err(|e| BackupError::commit(path, e))?;
        out.raw_copy_file(entry).map_err(|e| BackupError::commit(path, e))?;
    }

    let temp = out.finish().map_err(|e| BackupError::commit(path, e))?;
    persist_container(temp, path)
}

struct ZipArchiveReader {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl ArchiveReader for ZipArchiveReader {
    fn visit_entries(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        for idx in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(idx)
                .map_err(|e| BackupError::open(&self.path, e))?;
            let info = ArchiveEntry {
                name: entry.name().to_string(),
                size: entry.size(),
                is_dir: entry.is_dir(),
            };
            if visitor(&info, &mut entry)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}
