//! 백업 컨테이너 파사드
//!
//! 모든 작업은 호출마다 컨테이너를 열고, 끝나기 전에 commit/close 한다.
//! 같은 컨테이너에 대한 동시 쓰기는 호출자가 직렬화해야 한다.

use crate::models::{ArchiveEntry, ArchiveSummary, FolderSpec};
use crate::system::archive::{codec_for, ArchiveCodec, ArchiveFormat, CodecOptions};
use crate::system::path_mapper::{
    extract_destination, file_entry_name, normalize_unit_name, scanned_entry_name,
    strip_unit_prefix,
};
use crate::system::scanner::scan;
use crate::system::stream::copy_to_file;
use crate::utils::alias::{AliasMap, PathResolver};
use crate::utils::config::{BackupConfig, ExtractCheck, ExtractMode};
use crate::utils::error::{BackupError, Result};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};


pub struct Backup {
    backup_path: PathBuf,
    codec: Box<dyn ArchiveCodec>,
    resolver: Box<dyn PathResolver>,
    chunk_size: usize,
    extract_mode: ExtractMode,
    extract_check: ExtractCheck,
}

impl Backup {
    /// 설정 검증 후 생성. 잘못된 설정은 여기서 `Config` 에러로 끝난다.
    pub fn new(config: BackupConfig) -> Result<Self> {
        config.validate()?;
        let codec = codec_for(
            config.resolved_format(),
            CodecOptions {
                compression_level: config.compression_level,
                chunk_size: config.chunk_size,
            },
        );
        Ok(Self {
            backup_path: config.backup_path(),
            codec,
            resolver: Box::new(AliasMap::from(config.aliases)),
            chunk_size: config.chunk_size,
            extract_mode: config.extract_mode,
            extract_check: config.extract_check,
        })
    }

    pub fn with_resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn with_codec(mut self, codec: Box<dyn ArchiveCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_extract_mode(mut self, mode: ExtractMode) -> Self {
        self.extract_mode = mode;
        self
    }

    pub fn with_extract_check(mut self, check: ExtractCheck) -> Self {
        self.extract_check = check;
        self
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn format(&self) -> ArchiveFormat {
        self.codec.format()
    }

    /// 단일 파일을 `name/<basename>` 엔트리로 추가하고 commit
    pub fn add_file(&self, name: &str, file: &Path) -> Result<()> {
        let name = normalize_unit_name(name)?;
        let file = self.resolver.resolve(file);
        let entry_name = file_entry_name(&name, &file)?;

        let mut writer = self.codec.open_writer(&self.backup_path)?;
        let added = writer.add_file(&entry_name, &file);
        // 추가에 실패해도 컨테이너는 유효한 상태로 닫는다
        let committed = writer.commit();
        let copied = added?;
        committed?;

        info!(
            "added {} ({} bytes) to {}",
            entry_name,
            copied,
            self.backup_path.display()
        );
        Ok(())
    }

    /// 폴더를 스캔해 `name/` 아래에 파일과 디렉토리 마커를 추가한다.
    ///
    /// 엔트리별 실패는 요약에 기록하고 계속 진행하며, commit은 마지막에 한 번.
    pub fn add_folder(&self, name: &str, folder: &FolderSpec) -> Result<ArchiveSummary> {
        let name = normalize_unit_name(name)?;
        let root = self.resolver.resolve(folder.path());
        let filter = folder.compile_filter()?;
        let scanned = scan(&root, filter.as_ref(), folder.is_recursive())?;

        let mut writer = self.codec.open_writer(&self.backup_path)?;
        let mut summary = ArchiveSummary::new();
        for item in &scanned {
            let Some(entry_name) = scanned_entry_name(&name, &item.relative, item.is_dir) else {
                continue;
            };
            let result = if item.is_dir {
                writer.add_directory(&entry_name).map(|_| 0)
            } else {
                writer.add_file(&entry_name, &item.path)
            };
            match result {
                Ok(bytes) => {
                    debug!("added {}", entry_name);
                    summary.record_success(bytes);
                }
                Err(e) => {
                    warn!("failed to add {}: {}", entry_name, e);
                    summary.record_failure(&entry_name, e);
                }
            }
        }
        writer.commit()?;

        info!(
            "added folder {} as {}/ to {} ({} entries, {} failed)",
            root.display(),
            name,
            self.backup_path.display(),
            summary.items_processed,
            summary.items_failed
        );
        Ok(summary)
    }

    /// 이름이 정확히 `name`인 파일 엔트리를 `destination`으로 추출
    ///
    /// - `Verified`: 엔트리가 없으면 `Ok(false)`, 복사 바이트 수가 다르면 에러
    /// - `Exists`: 시도 후 `destination` 존재 여부를 그대로 반환
    pub fn extract_file(&self, name: &str, destination: &Path) -> Result<bool> {
        let destination = self.resolver.resolve(destination);
        let mut reader = self.codec.open_reader(&self.backup_path)?;

        let mut outcome: Option<Result<(u64, u64)>> = None;
        reader.visit_entries(&mut |entry, content| {
            if entry.is_dir || entry.name != name {
                return Ok(ControlFlow::Continue(()));
            }
            outcome = Some(
                self.write_file_entry(content, &destination)
                    .map(|copied| (copied, entry.size)),
            );
            Ok(ControlFlow::Break(()))
        })?;

        match self.extract_check {
            ExtractCheck::Exists => {
                if let Some(Err(e)) = &outcome {
                    warn!("extract of {} failed: {}", name, e);
                }
                Ok(destination.exists())
            }
            ExtractCheck::Verified => match outcome {
                None => {
                    debug!("no file entry named {} in {}", name, self.backup_path.display());
                    Ok(false)
                }
                Some(Ok((copied, expected))) => {
                    verify_size(&destination, copied, expected)?;
                    info!("extracted {} to {}", name, destination.display());
                    Ok(true)
                }
                Some(Err(e)) => Err(e),
            },
        }
    }

    /// `name/`로 시작하는 모든 엔트리를 폴더 경로 아래로 추출
    ///
    /// 이미 기록된 파일은 실패 시에도 되돌리지 않는다.
    pub fn extract_folder(&self, name: &str, folder: &FolderSpec) -> Result<ArchiveSummary> {
        let name = normalize_unit_name(name)?;
        let target_root = self.resolver.resolve(folder.path());
        let mut reader = self.codec.open_reader(&self.backup_path)?;
        create_dir_all_open(&target_root).map_err(|e| BackupError::stream(&target_root, e))?;

        let mut summary = ArchiveSummary::new();
        let strict = self.extract_mode == ExtractMode::Strict;
        reader.visit_entries(&mut |entry, content| {
            let Some(remainder) = strip_unit_prefix(&name, &entry.name) else {
                return Ok(ControlFlow::Continue(()));
            };
            match self.extract_entry(entry, remainder, content, &target_root) {
                Ok(bytes) => {
                    debug!("extracted {}", entry.name);
                    summary.record_success(bytes);
                }
                Err(e) if strict => return Err(e),
                Err(e) => {
                    warn!("failed to extract {}: {}", entry.name, e);
                    summary.record_failure(&entry.name, e);
                }
            }
            Ok(ControlFlow::Continue(()))
        })?;

        info!(
            "extracted {}/ from {} into {} ({} entries, {} failed)",
            name,
            self.backup_path.display(),
            target_root.display(),
            summary.items_processed,
            summary.items_failed
        );
        Ok(summary)
    }

    /// 컨테이너의 모든 엔트리 (컨테이너 순서)
    pub fn list_entries(&self) -> Result<Vec<ArchiveEntry>> {
        let mut reader = self.codec.open_reader(&self.backup_path)?;
        let mut entries = Vec::new();
        reader.visit_entries(&mut |entry, _| {
            entries.push(entry.clone());
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(entries)
    }

    /// 컨테이너에 들어 있는 논리 이름 목록 (정렬, 중복 제거)
    pub fn list_units(&self) -> Result<Vec<String>> {
        let units: BTreeSet<String> = self
            .list_entries()?
            .into_iter()
            .filter_map(|entry| {
                entry
                    .name
                    .split_once('/')
                    .map(|(unit, _)| unit.to_string())
            })
            .filter(|unit| !unit.is_empty())
            .collect();
        Ok(units.into_iter().collect())
    }

    fn extract_entry(
        &self,
        entry: &ArchiveEntry,
        remainder: &str,
        content: &mut dyn Read,
        target_root: &Path,
    ) -> Result<u64> {
        let dest = extract_destination(target_root, remainder).ok_or_else(|| {
            BackupError::UnsafeEntryPath {
                entry: entry.name.clone(),
            }
        })?;

        if entry.is_dir {
            create_dir_all_open(&dest).map_err(|e| BackupError::stream(&dest, e))?;
            return Ok(0);
        }

        let copied = self.write_file_entry(content, &dest)?;
        if self.extract_check == ExtractCheck::Verified {
            verify_size(&dest, copied, entry.size)?;
        }
        Ok(copied)
    }

    fn write_file_entry(&self, content: &mut dyn Read, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                create_dir_all_open(parent).map_err(|e| BackupError::stream(parent, e))?;
            }
        }
        copy_to_file(content, dest, self.chunk_size)
    }
}

fn verify_size(dest: &Path, copied: u64, expected: u64) -> Result<()> {
    if copied != expected {
        return Err(BackupError::stream(
            dest,
            format!("short copy: {} of {} bytes", copied, expected),
        ));
    }
    Ok(())
}

/// 누락된 상위 디렉토리까지 생성 (Unix에서는 0o777, umask 적용)
fn create_dir_all_open(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o777);
    }
    builder.create(path)
}
