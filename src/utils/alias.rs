//! 경로 별칭 해석
//!
//! `@name` 또는 `@name/하위/경로` 형태의 경로를 설정된 실제 경로로 바꾼다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 스캔/추출 전에 논리 경로를 파일시스템 경로로 바꾸는 협력자
pub trait PathResolver: Send + Sync {
    fn resolve(&self, raw: &Path) -> PathBuf;
}

impl<F> PathResolver for F
where
    F: Fn(&Path) -> PathBuf + Send + Sync,
{
    fn resolve(&self, raw: &Path) -> PathBuf {
        self(raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    aliases: BTreeMap<String, PathBuf>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 별칭 등록. 이름 앞의 `@`는 있어도 되고 없어도 된다.
    pub fn insert(&mut self, alias: &str, path: impl Into<PathBuf>) {
        let key = alias.trim_start_matches('@').to_string();
        self.aliases.insert(key, path.into());
    }

    pub fn get(&self, alias: &str) -> Option<&Path> {
        self.aliases
            .get(alias.trim_start_matches('@'))
            .map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl From<BTreeMap<String, PathBuf>> for AliasMap {
    fn from(table: BTreeMap<String, PathBuf>) -> Self {
        let mut map = AliasMap::new();
        for (alias, path) in table {
            map.insert(&alias, path);
        }
        map
    }
}

impl PathResolver for AliasMap {
    fn resolve(&self, raw: &Path) -> PathBuf {
        let text = raw.to_string_lossy();
        let Some(stripped) = text.strip_prefix('@') else {
            return raw.to_path_buf();
        };
        let (alias, rest) = match stripped.split_once(['/', '\\']) {
            Some((alias, rest)) => (alias, Some(rest)),
            None => (stripped, None),
        };
        // 모르는 별칭은 그대로 둔다
        let Some(base) = self.get(alias) else {
            return raw.to_path_buf();
        };
        match rest {
            Some(rest) if !rest.is_empty() => base.join(rest),
            _ => base.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AliasMap {
        let mut map = AliasMap::new();
        map.insert("@app", "/srv/app");
        map.insert("uploads", "/srv/app/web/uploads");
        map
    }

    #[test]
    fn test_resolve_alias_prefix() {
        let map = sample();
        assert_eq!(map.resolve(Path::new("@app")), PathBuf::from("/srv/app"));
        assert_eq!(
            map.resolve(Path::new("@app/runtime/logs")),
            PathBuf::from("/srv/app/runtime/logs")
        );
        assert_eq!(
            map.resolve(Path::new("@uploads/")),
            PathBuf::from("/srv/app/web/uploads")
        );
    }

    #[test]
    fn test_plain_and_unknown_paths_pass_through() {
        let map = sample();
        assert_eq!(map.resolve(Path::new("/var/data")), PathBuf::from("/var/data"));
        assert_eq!(map.resolve(Path::new("@nope/x")), PathBuf::from("@nope/x"));
        assert_eq!(map.resolve(Path::new("rel/@app")), PathBuf::from("rel/@app"));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |p: &Path| Path::new("/root").join(p);
        assert_eq!(
            PathResolver::resolve(&resolver, Path::new("data")),
            PathBuf::from("/root/data")
        );
    }

    #[test]
    fn test_from_table() {
        let mut table = BTreeMap::new();
        table.insert("@db".to_string(), PathBuf::from("/var/db"));
        let map = AliasMap::from(table);
        assert_eq!(map.get("db"), Some(Path::new("/var/db")));
        assert!(!map.is_empty());
    }
}
