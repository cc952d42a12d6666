//! Change detection for watched files and directories
//!
//! A fingerprint is the sorted (name, length, mtime) listing of a directory,
//! or the same triple for a single file. Comparing fingerprints between
//! polls tells which data sets were changed on disk.

use otiat_core::DataSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint(Vec<(String, u64, Option<SystemTime>)>);

impl Fingerprint {
    /// Fingerprint a file or directory. Missing paths have an empty fingerprint.
    pub fn of(path: &Path) -> Self {
        let Ok(meta) = std::fs::metadata(path) else {
            return Self::default();
        };

        if meta.is_file() {
            let name = path.to_string_lossy().into_owned();
            return Self(vec![(name, meta.len(), meta.modified().ok())]);
        }

        let Ok(entries) = std::fs::read_dir(path) else {
            return Self::default();
        };
        let mut listing: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                Some((
                    e.file_name().to_string_lossy().into_owned(),
                    meta.len(),
                    meta.modified().ok(),
                ))
            })
            .collect();
        listing.sort();
        Self(listing)
    }
}

#[derive(Debug)]
struct Target {
    path: PathBuf,
    data: DataSet,
    fingerprint: Fingerprint,
}

/// Tracks a set of paths, each tagged with the data set it holds
#[derive(Debug, Default)]
pub struct ChangeTracker {
    targets: Vec<Target>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching `path`, taking its current state as the baseline
    pub fn watch(&mut self, path: impl Into<PathBuf>, data: DataSet) {
        let path = path.into();
        let fingerprint = Fingerprint::of(&path);
        self.targets.push(Target { path, data, fingerprint });
    }

    /// Report which data sets changed since the last poll or refresh
    pub fn poll(&mut self) -> DataSet {
        let mut changed = DataSet::empty();
        for target in &mut self.targets {
            let current = Fingerprint::of(&target.path);
            if current != target.fingerprint {
                target.fingerprint = current;
                changed |= target.data;
            }
        }
        changed
    }

    /// Take the current state of every target holding `data` as the new baseline
    pub fn refresh(&mut self, data: DataSet) {
        for target in &mut self.targets {
            if data.contains(target.data) {
                target.fingerprint = Fingerprint::of(&target.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_path_is_empty() {
        assert_eq!(Fingerprint::of(Path::new("/no/such/path")), Fingerprint::default());
    }

    #[test]
    fn test_detects_new_file() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ChangeTracker::new();
        tracker.watch(dir.path(), DataSet::IMAGES);
        assert!(tracker.poll().is_empty());

        std::fs::write(dir.path().join("new.png"), b"data").unwrap();
        assert_eq!(tracker.poll(), DataSet::IMAGES);
        assert!(tracker.poll().is_empty());
    }

    #[test]
    fn test_refresh_hides_change() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("poses.json");
        let mut tracker = ChangeTracker::new();
        tracker.watch(dir.path().join("models"), DataSet::OBJECT_MODELS);
        tracker.watch(&file, DataSet::POSES);

        std::fs::write(&file, b"{}").unwrap();
        tracker.refresh(DataSet::POSES);
        assert!(tracker.poll().is_empty());

        std::fs::write(&file, b"{\"a.png\": []}").unwrap();
        assert_eq!(tracker.poll(), DataSet::POSES);
    }
}
