//! 아카이브 포맷 / 코덱 인터페이스

use crate::models::ArchiveEntry;
use crate::utils::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use log::warn;
use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

mod tar_codec;
mod zip_codec;

pub use tar_codec::{TarCodec, TarCompression};
pub use zip_codec::ZipCodec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    #[default]
    Zip,
    Tar,
    TarGz,
    TarZst,
}

impl ArchiveFormat {
    pub fn display_name(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarZst => "tar.zst",
        }
    }

    /// 컨테이너 파일 확장자 (점 포함)
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => ".zip",
            ArchiveFormat::Tar => ".tar",
            ArchiveFormat::TarGz => ".tar.gz",
            ArchiveFormat::TarZst => ".tar.zst",
        }
    }
}

pub fn detect_archive_format(path: &Path) -> Option<ArchiveFormat> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        return Some(ArchiveFormat::TarGz);
    }
    if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
        return Some(ArchiveFormat::TarZst);
    }
    match path
        .extension()
        .and_then(OsStr::to_str)?
        .to_lowercase()
        .as_str()
    {
        "zip" => Some(ArchiveFormat::Zip),
        "tar" => Some(ArchiveFormat::Tar),
        _ => None,
    }
}

/// 엔트리 방문 콜백. `ControlFlow::Break`를 돌려주면 순회를 멈춘다.
pub type EntryVisitor<'a> =
    dyn FnMut(&ArchiveEntry, &mut dyn Read) -> Result<ControlFlow<()>> + 'a;

/// 쓰기 모드로 열린 컨테이너
///
/// `commit` 전에는 내용의 영속성이나 유효성을 보장하지 않는다.
pub trait ArchiveWriter {
    /// 빈 디렉토리 마커 추가
    fn add_directory(&mut self, entry_name: &str) -> Result<()>;

    /// `source` 파일 내용을 `entry_name` 엔트리로 스트리밍. 기록한 바이트 수 반환.
    fn add_file(&mut self, entry_name: &str, source: &Path) -> Result<u64>;

    fn commit(self: Box<Self>) -> Result<()>;
}

/// 읽기 모드로 열린 컨테이너
pub trait ArchiveReader {
    /// 컨테이너 순서대로 엔트리를 한 번씩 방문한다.
    ///
    /// 스트림 기반 포맷(tar)은 한 번만 순회할 수 있다.
    fn visit_entries(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<()>;
}

pub trait ArchiveCodec: Send + Sync {
    fn format(&self) -> ArchiveFormat;

    /// 기존 컨테이너를 열거나 새로 만든다.
    fn open_writer(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>>;

    fn open_reader(&self, path: &Path) -> Result<Box<dyn ArchiveReader>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    pub compression_level: Option<i32>,
    pub chunk_size: usize,
}

pub fn codec_for(format: ArchiveFormat, options: CodecOptions) -> Box<dyn ArchiveCodec> {
    match format {
        ArchiveFormat::Zip => Box::new(ZipCodec::new(options)),
        ArchiveFormat::Tar => Box::new(TarCodec::new(TarCompression::None, options)),
        ArchiveFormat::TarGz => Box::new(TarCodec::new(TarCompression::Gzip, options)),
        ArchiveFormat::TarZst => Box::new(TarCodec::new(TarCompression::Zstd, options)),
    }
}

/// 컨테이너 상위 디렉토리가 없으면 생성
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            fs::create_dir_all(parent).map_err(|e| BackupError::open(path, e))?;
        }
    }
    Ok(())
}

/// 재작성용 임시 파일을 둘 디렉토리 (rename이 같은 파일시스템 안에서 일어나도록)
fn container_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// 기존 컨테이너 권한. 컨테이너가 없으면 새로 만든 파일의 권한(umask 적용)을 쓴다.
fn container_permissions(path: &Path) -> io::Result<(fs::Permissions, bool)> {
    match fs::metadata(path) {
        Ok(meta) => Ok((meta.permissions(), false)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let placeholder = OpenOptions::new().write(true).create_new(true).open(path)?;
            Ok((placeholder.metadata()?.permissions(), true))
        }
        Err(e) => Err(e),
    }
}

/// 다 쓴 임시 파일을 컨테이너 위치로 원자적으로 옮긴다.
fn persist_container(temp: NamedTempFile, path: &Path) -> Result<()> {
    let (permissions, placeholder) =
        container_permissions(path).map_err(|e| BackupError::commit(path, e))?;
    let persisted = finish_persist(temp, permissions, path);
    if persisted.is_err() && placeholder {
        if let Err(e) = fs::remove_file(path) {
            warn!("failed to remove placeholder {}: {}", path.display(), e);
        }
    }
    persisted
}

fn finish_persist(temp: NamedTempFile, permissions: fs::Permissions, path: &Path) -> Result<()> {
    temp.as_file()
        .set_permissions(permissions)
        .map_err(|e| BackupError::commit(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| BackupError::commit(path, e))?;
    temp.persist(path)
        .map_err(|e| BackupError::commit(path, e.error))?;
    Ok(())
}
