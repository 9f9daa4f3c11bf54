//! 아카이브 엔트리 / 스캔 결과 / 작업 요약 모델

use std::path::PathBuf;

/// 아카이브 내부 엔트리
///
/// 이름은 항상 `/` 구분자를 사용하며, 디렉토리 마커는 `/`로 끝난다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

impl ArchiveEntry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            is_dir: false,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            size: 0,
            is_dir: true,
        }
    }
}

/// 디렉토리 스캔 결과 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    /// 파일시스템 상의 전체 경로
    pub path: PathBuf,
    /// 스캔 루트 기준 상대 경로
    pub relative: PathBuf,
    pub is_dir: bool,
    /// 바이트 단위 크기 (디렉토리는 0)
    pub size: u64,
}

/// 폴더 추가/추출 작업 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub items_processed: usize,
    pub items_failed: usize,
    pub bytes_processed: u64,
    /// `"<entry>: <reason>"` 형식의 엔트리별 실패 목록
    pub errors: Vec<String>,
}

impl ArchiveSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.items_failed == 0
    }

    pub(crate) fn record_success(&mut self, bytes: u64) {
        self.items_processed += 1;
        self.bytes_processed = self.bytes_processed.saturating_add(bytes);
    }

    pub(crate) fn record_failure(&mut self, entry: &str, reason: impl std::fmt::Display) {
        self.items_processed += 1;
        self.items_failed += 1;
        self.errors.push(format!("{}: {}", entry, reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_entry_gets_trailing_slash() {
        assert_eq!(ArchiveEntry::directory("uploads").name, "uploads/");
        assert_eq!(ArchiveEntry::directory("uploads/").name, "uploads/");
        assert!(ArchiveEntry::directory("uploads").is_dir);
    }

    #[test]
    fn test_summary_tracks_failures() {
        let mut summary = ArchiveSummary::new();
        summary.record_success(10);
        summary.record_failure("unit/a.txt", "permission denied");
        assert_eq!(summary.items_processed, 2);
        assert_eq!(summary.items_failed, 1);
        assert_eq!(summary.bytes_processed, 10);
        assert_eq!(summary.errors, vec!["unit/a.txt: permission denied".to_string()]);
        assert!(!summary.is_success());
    }
}
