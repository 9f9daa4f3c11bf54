//! 백업 대상 디렉토리 스캔

use crate::models::ScannedEntry;
use crate::utils::error::{BackupError, Result};
use log::debug;
use regex::Regex;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// `root` 하위 엔트리를 파일 이름 순 깊이 우선으로 나열한다.
///
/// - `recursive == false`면 직계 자식만 방문
/// - `filter`는 파일의 전체 경로에만 적용되고, 디렉토리는 항상 포함된다
/// - 루트 자신은 결과에 포함되지 않는다
pub fn scan(root: &Path, filter: Option<&Regex>, recursive: bool) -> Result<Vec<ScannedEntry>> {
    let meta = fs::metadata(root).map_err(|e| BackupError::Scan {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(BackupError::Scan {
            path: root.to_path_buf(),
            reason: "Not a directory".to_string(),
        });
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(true)
        .sort_by_file_name();

    let mut entries = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| BackupError::Scan {
            path: e.path().unwrap_or(root).to_path_buf(),
            reason: e.to_string(),
        })?;

        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            debug!("skip special file {}", entry.path().display());
            continue;
        }

        let is_dir = file_type.is_dir();
        if !is_dir {
            if let Some(filter) = filter {
                if !filter.is_match(&entry.path().to_string_lossy()) {
                    continue;
                }
            }
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let size = if is_dir {
            0
        } else {
            entry
                .metadata()
                .map_err(|e| BackupError::Scan {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                })?
                .len()
        };

        entries.push(ScannedEntry {
            path: entry.path().to_path_buf(),
            relative: relative.to_path_buf(),
            is_dir,
            size,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn prepare_tree(base: &Path) {
        fs::create_dir_all(base.join("b_dir/inner")).expect("create nested dirs");
        fs::create_dir_all(base.join("empty")).expect("create empty dir");
        fs::create_dir_all(base.join("only_logs")).expect("create logs dir");
        fs::write(base.join("a.txt"), b"a").expect("write a.txt");
        fs::write(base.join("c.bin"), b"ccc").expect("write c.bin");
        fs::write(base.join("b_dir/b.txt"), b"bb").expect("write b.txt");
        fs::write(base.join("b_dir/inner/deep.txt"), b"deep").expect("write deep.txt");
        fs::write(base.join("only_logs/app.log"), b"log").expect("write app.log");
    }

    fn relatives(entries: &[ScannedEntry]) -> Vec<PathBuf> {
        entries.iter().map(|e| e.relative.clone()).collect()
    }

    #[test]
    fn test_non_recursive_lists_direct_children_only() {
        let temp = tempdir().expect("create tempdir");
        prepare_tree(temp.path());

        let entries = scan(temp.path(), None, false).expect("scan");
        assert_eq!(
            relatives(&entries),
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b_dir"),
                PathBuf::from("c.bin"),
                PathBuf::from("empty"),
                PathBuf::from("only_logs"),
            ]
        );
        assert!(entries.iter().find(|e| e.relative == Path::new("b_dir")).expect("b_dir").is_dir);
    }

    #[test]
    fn test_recursive_is_depth_first_and_sorted() {
        let temp = tempdir().expect("create tempdir");
        prepare_tree(temp.path());

        let entries = scan(temp.path(), None, true).expect("scan");
        assert_eq!(
            relatives(&entries),
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b_dir"),
                PathBuf::from("b_dir/b.txt"),
                PathBuf::from("b_dir/inner"),
                PathBuf::from("b_dir/inner/deep.txt"),
                PathBuf::from("c.bin"),
                PathBuf::from("empty"),
                PathBuf::from("only_logs"),
                PathBuf::from("only_logs/app.log"),
            ]
        );
        let deep = entries
            .iter()
            .find(|e| e.relative == Path::new("b_dir/inner/deep.txt"))
            .expect("deep.txt");
        assert_eq!(deep.size, 4);
        assert_eq!(deep.path, temp.path().join("b_dir/inner/deep.txt"));
    }

    #[test]
    fn test_filter_applies_to_files_not_directories() {
        let temp = tempdir().expect("create tempdir");
        prepare_tree(temp.path());

        let filter = Regex::new(r"\.txt$").expect("regex");
        let entries = scan(temp.path(), Some(&filter), true).expect("scan");
        let rels = relatives(&entries);

        assert!(rels.contains(&PathBuf::from("a.txt")));
        assert!(rels.contains(&PathBuf::from("b_dir/inner/deep.txt")));
        assert!(!rels.contains(&PathBuf::from("c.bin")));
        assert!(!rels.contains(&PathBuf::from("only_logs/app.log")));
        // 필터에 걸린 파일만 있는 디렉토리도 유지
        assert!(rels.contains(&PathBuf::from("only_logs")));
        assert!(rels.contains(&PathBuf::from("empty")));
    }

    #[test]
    fn test_scan_is_deterministic() {
        let temp = tempdir().expect("create tempdir");
        prepare_tree(temp.path());
        let first = scan(temp.path(), None, true).expect("first scan");
        let second = scan(temp.path(), None, true).expect("second scan");
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_root_is_scan_error() {
        let temp = tempdir().expect("create tempdir");
        let missing = temp.path().join("nope");
        assert!(matches!(
            scan(&missing, None, true),
            Err(BackupError::Scan { path, .. }) if path == missing
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_followed() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().expect("create tempdir");
        let outside = temp.path().join("outside");
        fs::create_dir_all(outside.join("sub")).expect("create outside dir");
        fs::write(outside.join("sub/linked.txt"), b"through link").expect("write linked file");
        fs::write(outside.join("target.bin"), b"12345").expect("write target file");

        let root = temp.path().join("root");
        fs::create_dir_all(&root).expect("create root");
        symlink(outside.join("target.bin"), root.join("file_link")).expect("link file");
        symlink(outside.join("sub"), root.join("dir_link")).expect("link dir");

        let entries = scan(&root, None, true).expect("scan");
        assert_eq!(
            relatives(&entries),
            vec![
                PathBuf::from("dir_link"),
                PathBuf::from("dir_link/linked.txt"),
                PathBuf::from("file_link"),
            ]
        );
        let dir_link = &entries[0];
        assert!(dir_link.is_dir);
        let file_link = &entries[2];
        assert!(!file_link.is_dir);
        assert_eq!(file_link.size, 5);
        assert_eq!(
            fs::read(&entries[1].path).expect("read through link"),
            b"through link"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_scan_error() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().expect("create tempdir");
        let root = temp.path().join("root");
        fs::create_dir_all(root.join("inner")).expect("create inner");
        symlink(&root, root.join("inner/back")).expect("link back to root");

        assert!(matches!(
            scan(&root, None, true),
            Err(BackupError::Scan { .. })
        ));
        // 비재귀 스캔은 루프까지 내려가지 않는다
        assert_eq!(
            relatives(&scan(&root, None, false).expect("shallow scan")),
            vec![PathBuf::from("inner")]
        );
    }

    #[test]
    fn test_file_root_is_scan_error() {
        let temp = tempdir().expect("create tempdir");
        let file = temp.path().join("file.txt");
        fs::write(&file, b"x").expect("write file");
        assert!(matches!(scan(&file, None, false), Err(BackupError::Scan { .. })));
    }
}
