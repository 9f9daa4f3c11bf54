//! 논리 이름 + 파일시스템 경로 <-> 아카이브 엔트리 이름 변환
//!
//! 엔트리 이름은 플랫폼과 무관하게 `/` 구분자를 사용한다.

use crate::utils::error::{BackupError, Result};
use std::path::{Component, Path, PathBuf};

pub const ENTRY_SEPARATOR: char = '/';

/// 논리 이름 정규화: 앞뒤 `/` 제거, 빈 이름 / `\` / `.`·`..` 세그먼트 거부
pub fn normalize_unit_name(name: &str) -> Result<String> {
    let trimmed = name.trim_matches(ENTRY_SEPARATOR);
    let invalid = trimmed.is_empty()
        || trimmed.contains('\\')
        || trimmed
            .split(ENTRY_SEPARATOR)
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if invalid {
        return Err(BackupError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// `name/`
pub fn unit_prefix(name: &str) -> String {
    format!("{}{}", name, ENTRY_SEPARATOR)
}

/// 단일 파일 엔트리 이름: `name/<basename>`
pub fn file_entry_name(name: &str, file_path: &Path) -> Result<String> {
    let base = file_path
        .file_name()
        .ok_or_else(|| BackupError::stream(file_path, "Invalid source file name"))?;
    Ok(format!(
        "{}{}",
        unit_prefix(name),
        base.to_string_lossy()
    ))
}

/// 스캔된 경로의 엔트리 이름. 루트 자신(빈 상대 경로)이면 None.
///
/// 디렉토리는 `/`로 끝나는 디렉토리 마커 이름을 만든다.
pub fn scanned_entry_name(name: &str, relative: &Path, is_dir: bool) -> Option<String> {
    let relative = archive_display_path(relative);
    if relative.is_empty() {
        return None;
    }
    let mut entry = format!("{}{}", unit_prefix(name), relative);
    if is_dir {
        entry.push(ENTRY_SEPARATOR);
    }
    Some(entry)
}

/// `entry_name`이 오프셋 0에서 `name/`로 시작할 때만 나머지를 돌려준다.
pub fn strip_unit_prefix<'a>(name: &str, entry_name: &'a str) -> Option<&'a str> {
    entry_name
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix(ENTRY_SEPARATOR))
}

/// 추출 대상 경로 계산. 루트 밖으로 벗어나는 경로는 None.
pub fn extract_destination(dest_root: &Path, remainder: &str) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for comp in Path::new(remainder).components() {
        match comp {
            Component::Normal(v) => clean.push(v),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let out = dest_root.join(clean);
    if out.starts_with(dest_root) {
        Some(out)
    } else {
        None
    }
}

/// 경로 구성요소를 `/`로 이어 붙인 표시용 문자열
pub fn archive_display_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(v) => Some(v.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
