//! 백업 설정 (TOML)

use crate::system::archive::{detect_archive_format, ArchiveFormat};
use crate::system::stream::DEFAULT_CHUNK_SIZE;
use crate::utils::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 폴더 추출 시 엔트리별 실패 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// 실패를 요약에 기록하고 계속 진행
    #[default]
    Lenient,
    /// 첫 실패에서 중단
    Strict,
}

/// 단일 파일 추출 성공 판정 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractCheck {
    /// 복사한 바이트 수가 엔트리 크기와 같아야 성공
    #[default]
    Verified,
    /// 추출 후 대상 파일 존재 여부만 확인 (호환 모드)
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// 컨테이너를 둘 디렉토리
    pub path: PathBuf,
    /// 컨테이너 파일 이름 (확장자 제외)
    pub name: String,
    /// 컨테이너 경로 직접 지정 (path + name 보다 우선)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub format: ArchiveFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_level: Option<i32>,
    pub chunk_size: usize,
    pub extract_mode: ExtractMode,
    pub extract_check: ExtractCheck,
    pub aliases: BTreeMap<String, PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            name: "backup".to_string(),
            file: None,
            format: ArchiveFormat::Zip,
            compression_level: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            extract_mode: ExtractMode::Lenient,
            extract_check: ExtractCheck::Verified,
            aliases: BTreeMap::new(),
        }
    }
}

impl BackupConfig {
    /// 컨테이너 파일 하나를 직접 지정하는 설정
    pub fn for_file(file: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BackupConfig =
            toml::from_str(content).map_err(|e| BackupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정 로드
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BackupError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BackupError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(BackupError::Config("chunk_size must be positive".to_string()));
        }
        match &self.file {
            Some(file) => {
                if detect_archive_format(file).is_none() {
                    return Err(BackupError::Config(format!(
                        "Unsupported archive extension: {}",
                        file.display()
                    )));
                }
            }
            None => {
                if self.name.trim().is_empty() {
                    return Err(BackupError::Config("name must not be empty".to_string()));
                }
            }
        }
        Ok(())
    }

    /// 실제 사용할 포맷: `file` 확장자가 우선
    pub fn resolved_format(&self) -> ArchiveFormat {
        self.file
            .as_deref()
            .and_then(detect_archive_format)
            .unwrap_or(self.format)
    }

    /// 컨테이너 경로: `file`, 없으면 `path/name.<ext>`
    pub fn backup_path(&self) -> PathBuf {
        match &self.file {
            Some(file) => file.clone(),
            None => self
                .path
                .join(format!("{}{}", self.name, self.format.extension())),
        }
    }
}
