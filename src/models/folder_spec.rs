//! 폴더 지정 모델
//!
//! 경로 문자열 하나, 또는 `{ path, recursive, regex }` 레코드를 받는다.

use crate::utils::error::{BackupError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FolderSpec {
    Path(PathBuf),
    Options {
        path: PathBuf,
        #[serde(default)]
        recursive: bool,
        #[serde(default)]
        regex: Option<String>,
    },
}

impl FolderSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FolderSpec::Path(path.into())
    }

    pub fn recursive(path: impl Into<PathBuf>) -> Self {
        FolderSpec::Options {
            path: path.into(),
            recursive: true,
            regex: None,
        }
    }

    /// 필터 패턴 지정 (레코드 형태로 전환)
    pub fn with_regex(self, pattern: impl Into<String>) -> Self {
        let (path, recursive) = match self {
            FolderSpec::Path(path) => (path, false),
            FolderSpec::Options {
                path, recursive, ..
            } => (path, recursive),
        };
        FolderSpec::Options {
            path,
            recursive,
            regex: Some(pattern.into()),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            FolderSpec::Path(path) => path,
            FolderSpec::Options { path, .. } => path,
        }
    }

    pub fn is_recursive(&self) -> bool {
        matches!(
            self,
            FolderSpec::Options {
                recursive: true,
                ..
            }
        )
    }

    pub fn pattern(&self) -> Option<&str> {
        match self {
            FolderSpec::Path(_) => None,
            FolderSpec::Options { regex, .. } => regex.as_deref(),
        }
    }

    /// 필터 정규식 컴파일 (없으면 None)
    pub fn compile_filter(&self) -> Result<Option<Regex>> {
        let Some(pattern) = self.pattern() else {
            return Ok(None);
        };
        Regex::new(pattern)
            .map(Some)
            .map_err(|e| BackupError::InvalidFilter {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }
}

impl From<&str> for FolderSpec {
    fn from(path: &str) -> Self {
        FolderSpec::Path(PathBuf::from(path))
    }
}

impl From<PathBuf> for FolderSpec {
    fn from(path: PathBuf) -> Self {
        FolderSpec::Path(path)
    }
}

impl From<&Path> for FolderSpec {
    fn from(path: &Path) -> Self {
        FolderSpec::Path(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        folder: FolderSpec,
    }

    #[test]
    fn test_bare_path_defaults() {
        let spec = FolderSpec::from("/var/www/uploads");
        assert_eq!(spec.path(), Path::new("/var/www/uploads"));
        assert!(!spec.is_recursive());
        assert!(spec.pattern().is_none());
        assert!(spec.compile_filter().expect("no filter").is_none());
    }

    #[test]
    fn test_deserialize_string_and_table() {
        let bare: Wrapper = toml::from_str(r#"folder = "/data""#).expect("parse bare");
        assert_eq!(bare.folder, FolderSpec::Path(PathBuf::from("/data")));

        let table: Wrapper = toml::from_str(
            r#"
            [folder]
            path = "/data"
            recursive = true
            regex = '\.txt$'
            "#,
        )
        .expect("parse table");
        assert!(table.folder.is_recursive());
        assert_eq!(table.folder.pattern(), Some(r"\.txt$"));

        let minimal: Wrapper = toml::from_str(
            r#"
            [folder]
            path = "/data"
            "#,
        )
        .expect("parse minimal table");
        assert!(!minimal.folder.is_recursive());
        assert!(minimal.folder.pattern().is_none());
    }

    #[test]
    fn test_with_regex_keeps_recursion() {
        let spec = FolderSpec::recursive("/data").with_regex(r"\.log$");
        assert!(spec.is_recursive());
        let filter = spec.compile_filter().expect("compile").expect("filter");
        assert!(filter.is_match("/data/app.log"));
        assert!(!filter.is_match("/data/app.txt"));
    }

    #[test]
    fn test_invalid_regex_is_reported() {
        let spec = FolderSpec::new("/data").with_regex("(unclosed");
        assert!(matches!(
            spec.compile_filter(),
            Err(BackupError::InvalidFilter { pattern, .. }) if pattern == "(unclosed"
        ));
    }
}
