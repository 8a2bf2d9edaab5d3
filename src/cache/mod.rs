//! Push-target cache
//!
//! Remembers which push targets already had a package registered. The file is
//! a flat JSON object mapping push-target URL to package SUUID:
//!
//! ```json
//! {
//!   "https://api.example.com/v1/projects/p1/": "pkg42"
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to access cache file '{0}': {1}")]
    IoError(String, #[source] std::io::Error),

    #[error("Cache file '{0}' is not a flat JSON object: {1}")]
    ParseError(String, #[source] serde_json::Error),
}

/// On-disk map of push-target URL to registered package SUUID
#[derive(Debug, Clone)]
pub struct PushTargetCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl PushTargetCache {
    /// Load the cache; a missing file is an empty cache
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| CacheError::ParseError(path.display().to_string(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(CacheError::IoError(path.display().to_string(), e)),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Package SUUID registered for `url`
    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn insert(&mut self, url: impl Into<String>, package_suuid: impl Into<String>) {
        self.entries.insert(url.into(), package_suuid.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache, creating parent directories as needed
    pub fn save(&self) -> Result<(), CacheError> {
        let io_err = |e| CacheError::IoError(self.path.display().to_string(), e);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| CacheError::ParseError(self.path.display().to_string(), e))?;
        std::fs::write(&self.path, content).map_err(io_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PushTargetCache::load(dir.path().join("none.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/push_targets.json");

        let mut cache = PushTargetCache::load(&path).unwrap();
        cache.insert("http://api/projects/p1/", "pkg1");
        cache.save().unwrap();

        let reloaded = PushTargetCache::load(&path).unwrap();
        assert_eq!(reloaded.get("http://api/projects/p1/"), Some("pkg1"));
        assert_eq!(reloaded.len(), 1);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["http://api/projects/p1/"], "pkg1");
    }

    #[test]
    fn test_rejects_nested_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"url": {"nested": true}}"#).unwrap();
        assert!(matches!(
            PushTargetCache::load(&path),
            Err(CacheError::ParseError(_, _))
        ));
    }
}
