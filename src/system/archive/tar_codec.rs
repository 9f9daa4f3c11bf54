//! tar / tar.gz / tar.zst 컨테이너
//!
//! tar는 제자리 추가가 불가능하므로 새 엔트리는 익명 임시 파일에 모아 두고,
//! commit 시 컨테이너 옆 임시 파일에 기존 엔트리와 새 엔트리를 이어 쓴 뒤
//! 원본 위치로 rename 한다. commit 되지 않은 writer는 원본 컨테이너를 건드리지 않는다.

use super::{
    container_dir, ensure_parent_dir, persist_container, ArchiveCodec, ArchiveFormat,
    ArchiveReader, ArchiveWriter, CodecOptions, EntryVisitor,
};
use crate::models::ArchiveEntry;
use crate::system::path_mapper::archive_display_path;
use crate::utils::error::{BackupError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tar::{Archive as TarArchive, Builder as TarBuilder, EntryType, Header};
use tempfile::NamedTempFile;
use zstd::stream::read::Decoder as ZstdDecoder;
use zstd::stream::write::Encoder as ZstdEncoder;

const DEFAULT_GZIP_LEVEL: u32 = 6;
const DEFAULT_ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Zstd,
}

#[derive(Debug, Clone, Copy)]
pub struct TarCodec {
    compression: TarCompression,
    options: CodecOptions,
}

impl TarCodec {
    pub fn new(compression: TarCompression, options: CodecOptions) -> Self {
        Self {
            compression,
            options,
        }
    }

    fn open_sink(&self, temp: NamedTempFile) -> io::Result<TarSink> {
        Ok(match self.compression {
            TarCompression::None => TarSink::Plain(temp),
            TarCompression::Gzip => {
                let level = self
                    .options
                    .compression_level
                    .map(|l| l.clamp(0, 9) as u32)
                    .unwrap_or(DEFAULT_GZIP_LEVEL);
                TarSink::Gzip(GzEncoder::new(temp, Compression::new(level)))
            }
            TarCompression::Zstd => {
                let level = self.options.compression_level.unwrap_or(DEFAULT_ZSTD_LEVEL);
                TarSink::Zstd(ZstdEncoder::new(temp, level)?)
            }
        })
    }

    fn open_source(&self, path: &Path) -> io::Result<TarSource> {
        let file = File::open(path)?;
        Ok(match self.compression {
            TarCompression::None => TarSource::Plain(file),
            TarCompression::Gzip => TarSource::Gzip(GzDecoder::new(file)),
            TarCompression::Zstd => TarSource::Zstd(ZstdDecoder::new(file)?),
        })
    }

    fn writer(&self, path: &Path) -> Result<TarArchiveWriter> {
        ensure_parent_dir(path)?;
        let carry_existing = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        let existing = if carry_existing {
            self.existing_names(path)
                .map_err(|e| BackupError::open(path, e))?
        } else {
            HashSet::new()
        };
        let staging = tempfile::tempfile().map_err(|e| BackupError::open(path, e))?;
        debug!(
            "opened tar container {} ({} existing entries)",
            path.display(),
            existing.len()
        );

        Ok(TarArchiveWriter {
            path: path.to_path_buf(),
            codec: *self,
            staged: TarBuilder::new(staging),
            carry_existing,
            existing,
            added: HashSet::new(),
            replaced: HashSet::new(),
            poisoned: false,
        })
    }

    /// 기존 컨테이너의 엔트리 이름 (한 번 끝까지 읽으며 유효성도 확인)
    fn existing_names(&self, path: &Path) -> io::Result<HashSet<String>> {
        let mut archive = TarArchive::new(self.open_source(path)?);
        let mut names = HashSet::new();
        for entry in archive.entries()? {
            let entry = entry?;
            let is_dir = entry.header().entry_type().is_dir();
            names.insert(entry_key(&entry.path()?, is_dir));
        }
        Ok(names)
    }
}

impl ArchiveCodec for TarCodec {
    fn format(&self) -> ArchiveFormat {
        match self.compression {
            TarCompression::None => ArchiveFormat::Tar,
            TarCompression::Gzip => ArchiveFormat::TarGz,
            TarCompression::Zstd => ArchiveFormat::TarZst,
        }
    }

    fn open_writer(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>> {
        Ok(Box::new(self.writer(path)?))
    }

    fn open_reader(&self, path: &Path) -> Result<Box<dyn ArchiveReader>> {
        if !path.is_file() {
            return Err(BackupError::open(path, "No such archive file"));
        }
        let source = self
            .open_source(path)
            .map_err(|e| BackupError::open(path, e))?;
        Ok(Box::new(TarArchiveReader {
            path: path.to_path_buf(),
            archive: TarArchive::new(source),
        }))
    }
}

enum TarSink {
    Plain(NamedTempFile),
    Gzip(GzEncoder<NamedTempFile>),
    Zstd(ZstdEncoder<'static, NamedTempFile>),
}

impl TarSink {
    fn finish(self) -> io::Result<NamedTempFile> {
        match self {
            TarSink::Plain(file) => Ok(file),
            TarSink::Gzip(encoder) => encoder.finish(),
            TarSink::Zstd(encoder) => encoder.finish(),
        }
    }
}

impl Write for TarSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            TarSink::Plain(w) => w.write(buf),
            TarSink::Gzip(w) => w.write(buf),
            TarSink::Zstd(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            TarSink::Plain(w) => w.flush(),
            TarSink::Gzip(w) => w.flush(),
            TarSink::Zstd(w) => w.flush(),
        }
    }
}

enum TarSource {
    Plain(File),
    Gzip(GzDecoder<File>),
    Zstd(ZstdDecoder<'static, BufReader<File>>),
}

impl Read for TarSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TarSource::Plain(r) => r.read(buf),
            TarSource::Gzip(r) => r.read(buf),
            TarSource::Zstd(r) => r.read(buf),
        }
    }
}

/// 헤더에 기록한 크기만큼만 `chunk_size` 단위로 읽는 reader
///
/// 원본이 그보다 먼저 끝나면 `UnexpectedEof`. 그 뒤에 붙은 데이터는 읽지 않는다.
struct SizedSource<R> {
    inner: R,
    remaining: u64,
    copied: u64,
    chunk_size: usize,
}

impl<R: Read> SizedSource<R> {
    fn new(inner: R, len: u64, chunk_size: usize) -> Self {
        Self {
            inner,
            remaining: len,
            copied: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// 헤더 크기 이후에도 읽을 데이터가 남아 있는지
    fn has_trailing_data(&mut self) -> bool {
        let mut probe = [0u8; 1];
        matches!(self.inner.read(&mut probe), Ok(n) if n > 0)
    }
}

impl<R: Read> Read for SizedSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf
            .len()
            .min(self.chunk_size)
            .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let read = loop {
            match self.inner.read(&mut buf[..want]) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "source ended {} bytes short of its recorded size",
                    self.remaining
                ),
            ));
        }
        self.remaining -= read as u64;
        self.copied += read as u64;
        Ok(read)
    }
}

struct TarArchiveWriter {
    path: PathBuf,
    codec: TarCodec,
    /// 이번 세션에 추가된 엔트리 (압축 없는 tar)
    staged: TarBuilder<File>,
    carry_existing: bool,
    /// 열 때 컨테이너에 있던 엔트리 이름
    existing: HashSet<String>,
    added: HashSet<String>,
    /// 새 내용으로 교체될 기존 파일 엔트리
    replaced: HashSet<String>,
    /// 엔트리 기록 도중 실패하면 tar 스트림이 깨지므로 commit을 거부한다
    poisoned: bool,
}

impl TarArchiveWriter {
    fn reserve(&mut self, key: &str) -> Result<()> {
        if !self.added.insert(key.to_string()) {
            return Err(BackupError::stream(
                &self.path,
                format!("{}: Duplicate entry name", key),
            ));
        }
        Ok(())
    }

    /// 헤더 크기와 정확히 같은 바이트만 스테이징 tar에 기록한다.
    fn append_stream<R: Read>(
        &mut self,
        entry_name: &str,
        header: &mut Header,
        source: R,
        len: u64,
        source_path: &Path,
    ) -> Result<u64> {
        header.set_size(len);
        let mut sized = SizedSource::new(source, len, self.codec.options.chunk_size);
        if let Err(e) = self.staged.append_data(header, entry_name, &mut sized) {
            self.poisoned = true;
            return Err(BackupError::stream(source_path, e));
        }
        if sized.has_trailing_data() {
            warn!(
                "{} grew while archiving; stored the first {} bytes",
                source_path.display(),
                sized.copied
            );
        }
        Ok(sized.copied)
    }

    fn carry_entries<R: Read>(
        out: &mut TarBuilder<TarSink>,
        archive: &mut TarArchive<R>,
        skip: &HashSet<String>,
    ) -> io::Result<usize> {
        let mut carried = 0;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let mut header = entry.header().clone();
            let is_dir = header.entry_type().is_dir();
            if skip.contains(&entry_key(&path, is_dir)) {
                continue;
            }
            out.append_data(&mut header, &path, &mut entry)?;
            carried += 1;
        }
        Ok(carried)
    }

    fn write_container(self) -> io::Result<NamedTempFile> {
        let mut staged = self.staged.into_inner()?;
        staged.seek(SeekFrom::Start(0))?;

        let temp = NamedTempFile::new_in(container_dir(&self.path))?;
        let mut out = TarBuilder::new(self.codec.open_sink(temp)?);
        if self.carry_existing {
            let mut current = TarArchive::new(self.codec.open_source(&self.path)?);
            let carried = Self::carry_entries(&mut out, &mut current, &self.replaced)?;
            debug!(
                "carried {} entries of {} ({} replaced)",
                carried,
                self.path.display(),
                self.replaced.len()
            );
        }
        Self::carry_entries(&mut out, &mut TarArchive::new(staged), &HashSet::new())?;
        out.into_inner()?.finish()
    }
}

impl ArchiveWriter for TarArchiveWriter {
    fn add_directory(&mut self, entry_name: &str) -> Result<()> {
        let key = entry_key(Path::new(entry_name), true);
        if self.existing.contains(&key) {
            debug!("directory marker {} already present", key);
            return Ok(());
        }
        self.reserve(&key)?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(0o755);
        header.set_mtime(now_secs());
        if let Err(e) = self
            .staged
            .append_data(&mut header, entry_name.trim_end_matches('/'), io::empty())
        {
            self.poisoned = true;
            return Err(BackupError::stream(&self.path, format!("{}: {}", entry_name, e)));
        }
        Ok(())
    }

    fn add_file(&mut self, entry_name: &str, source: &Path) -> Result<u64> {
        let key = entry_key(Path::new(entry_name), false);
        let src = File::open(source).map_err(|e| BackupError::stream(source, e))?;
        let meta = src.metadata().map_err(|e| BackupError::stream(source, e))?;
        self.reserve(&key)?;

        let mut header = Header::new_gnu();
        header.set_metadata(&meta);
        header.set_entry_type(EntryType::Regular);
        let copied = self.append_stream(entry_name, &mut header, src, meta.len(), source)?;
        if self.existing.contains(&key) {
            self.replaced.insert(key);
        }
        Ok(copied)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let writer = *self;
        let path = writer.path.clone();
        if writer.poisoned {
            return Err(BackupError::commit(
                &path,
                "an entry failed mid-write; container left unchanged",
            ));
        }

        let temp = writer
            .write_container()
            .map_err(|e| BackupError::commit(&path, e))?;
        persist_container(temp, &path)?;
        info!("committed tar container {}", path.display());
        Ok(())
    }
}

struct TarArchiveReader {
    path: PathBuf,
    archive: TarArchive<TarSource>,
}

impl ArchiveReader for TarArchiveReader {
    fn visit_entries(&mut self, visitor: &mut EntryVisitor<'_>) -> Result<()> {
        let entries = self
            .archive
            .entries()
            .map_err(|e| BackupError::open(&self.path, e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| BackupError::open(&self.path, e))?;
            let entry_type = entry.header().entry_type();
            let is_dir = entry_type.is_dir();
            if !is_dir && !entry_type.is_file() {
                debug!("skip tar entry of type {:?}", entry_type);
                continue;
            }

            let path = entry
                .path()
                .map_err(|e| BackupError::open(&self.path, e))?
                .into_owned();
            let info = ArchiveEntry {
                name: entry_key(&path, is_dir),
                size: entry.size(),
                is_dir,
            };
            if visitor(&info, &mut entry)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// tar 경로를 zip과 같은 엔트리 이름 형태로 (디렉토리는 `/`로 끝남)
fn entry_key(path: &Path, is_dir: bool) -> String {
    let mut name = archive_display_path(path);
    if is_dir {
        name.push('/');
    }
    name
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
