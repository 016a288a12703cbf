//! Local inventory: which files under the root take part in mirroring.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::error::MirrorError;

use super::filter::ExclusionFilter;
use super::state::PathKey;

/// One local file as seen by the current scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Forward-slash path relative to the local root, no leading/trailing slash.
    pub relative: String,
    pub absolute: PathBuf,
    /// Later of creation and last write time.
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// Files found by a scan, keyed case-insensitively.
///
/// Two local paths differing only by case collapse onto one key; the one
/// inserted last wins.
#[derive(Debug, Default, Clone)]
pub struct Inventory {
    files: BTreeMap<PathKey, FileRecord>,
}

impl Inventory {
    pub fn insert(&mut self, record: FileRecord) {
        self.files.insert(PathKey::new(&record.relative), record);
    }

    #[cfg(test)]
    pub fn get(&self, relative: &str) -> Option<&FileRecord> {
        self.files.get(&PathKey::new(relative))
    }

    #[cfg(test)]
    pub fn contains(&self, relative: &str) -> bool {
        self.files.contains_key(&PathKey::new(relative))
    }

    pub fn contains_key(&self, key: &PathKey) -> bool {
        self.files.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Distinct parent directories of the inventoried files, in key order.
    /// Files at the top level contribute the empty path.
    pub fn parent_dirs(&self) -> Vec<String> {
        let mut seen = BTreeMap::new();
        for record in self.files.values() {
            let parent = parent_of(&record.relative);
            seen.entry(PathKey::new(parent))
                .or_insert_with(|| parent.to_string());
        }
        seen.into_values().collect()
    }
}

/// Directory part of a relative path, `""` at the top level.
pub fn parent_of(relative: &str) -> &str {
    relative.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Walk `root` and collect every file not matched by `filter`.
///
/// Without `recursive` only the top level is read. Entries that cannot be
/// read are logged and skipped.
pub fn scan(root: &Path, recursive: bool, filter: &ExclusionFilter) -> Result<Inventory, MirrorError> {
    if !root.exists() {
        return Err(MirrorError::LocalRootNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(MirrorError::LocalRootNotDirectory {
            path: root.to_path_buf(),
        });
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut inventory = Inventory::default();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .follow_links(false)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(relative) = relative_path(root, entry.path())? else {
            tracing::warn!(
                "Skipping file with a name that is not valid UTF-8: {}",
                entry.path().display()
            );
            continue;
        };
        if filter.is_excluded(&relative) {
            tracing::trace!(path = %relative, "Excluded");
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(path = %relative, "Skipping file without metadata: {}", e);
                continue;
            }
        };

        inventory.insert(FileRecord {
            relative,
            absolute: entry.path().to_path_buf(),
            modified: file_time(&metadata),
            size: metadata.len(),
        });
    }

    tracing::debug!(root = %root.display(), files = inventory.len(), "Scanned local tree");
    Ok(inventory)
}

/// Forward-slash path of `path` below `root`. `None` when a component is
/// not valid UTF-8 and so has no faithful remote name.
fn relative_path(root: &Path, path: &Path) -> Result<Option<String>, MirrorError> {
    let stripped = path.strip_prefix(root)?;
    let components = stripped
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>();
    Ok(components.map(|parts| parts.join("/").trim_matches('/').to_string()))
}

/// Later of creation and modification time. Platforms without a birth time
/// fall back to the modification time alone.
fn file_time(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let created = metadata.created().ok().map(DateTime::<Utc>::from);
    match (created, modified) {
        (Some(c), Some(m)) => c.max(m),
        (Some(t), None) | (None, Some(t)) => t,
        (None, None) => DateTime::<Utc>::from(std::time::UNIX_EPOCH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_filter() -> ExclusionFilter {
        ExclusionFilter::new(None, &[]).unwrap()
    }

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
    }

    #[test]
    fn recursive_scan_uses_forward_slash_relative_paths() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "index.html", "<html>");
        create_file(dir.path(), "img/a.png", "png");
        create_file(dir.path(), "img/icons/b.svg", "svg");

        let inventory = scan(dir.path(), true, &no_filter()).unwrap();
        assert_eq!(inventory.len(), 3);
        assert!(inventory.contains("index.html"));
        assert!(inventory.contains("img/a.png"));
        let svg = inventory.get("img/icons/b.svg").unwrap();
        assert_eq!(svg.relative, "img/icons/b.svg");
        assert_eq!(svg.absolute, dir.path().join("img/icons/b.svg"));
        assert_eq!(svg.size, 3);
    }

    #[test]
    fn flat_scan_reads_top_level_only() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "top.txt", "x");
        create_file(dir.path(), "sub/nested.txt", "y");

        let inventory = scan(dir.path(), false, &no_filter()).unwrap();
        assert_eq!(inventory.len(), 1);
        assert!(inventory.contains("top.txt"));
    }

    #[test]
    fn excluded_paths_are_dropped() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "keep.txt", "x");
        create_file(dir.path(), "scratch.TMP", "y");
        create_file(dir.path(), "logs/app.log", "z");

        let filter = ExclusionFilter::new(Some(r"\.tmp$"), &["logs/**".to_string()]).unwrap();
        let inventory = scan(dir.path(), true, &filter).unwrap();
        assert_eq!(inventory.len(), 1);
        assert!(inventory.contains("keep.txt"));
    }

    #[test]
    fn lookups_ignore_case() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "Docs/ReadMe.md", "x");

        let inventory = scan(dir.path(), true, &no_filter()).unwrap();
        assert!(inventory.contains("docs/readme.md"));
        assert_eq!(inventory.get("DOCS/README.MD").unwrap().relative, "Docs/ReadMe.md");
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = scan(&dir.path().join("missing"), true, &no_filter());
        match result {
            Err(MirrorError::LocalRootNotFound { .. }) => {}
            other => panic!("Expected LocalRootNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn file_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "file.txt", "x");
        let result = scan(&dir.path().join("file.txt"), true, &no_filter());
        assert!(matches!(result, Err(MirrorError::LocalRootNotDirectory { .. })));
    }

    #[test]
    fn parent_dirs_are_distinct() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "a.txt", "x");
        create_file(dir.path(), "img/a.png", "x");
        create_file(dir.path(), "img/b.png", "x");
        create_file(dir.path(), "img/icons/c.svg", "x");

        let inventory = scan(dir.path(), true, &no_filter()).unwrap();
        assert_eq!(inventory.parent_dirs(), vec!["", "img", "img/icons"]);
    }

    #[test]
    fn parent_of_top_level_is_empty() {
        assert_eq!(parent_of("a.txt"), "");
        assert_eq!(parent_of("img/a.png"), "img");
        assert_eq!(parent_of("a/b/c.txt"), "a/b");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_skipped_not_merged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "cafe.txt", "ok");
        for raw in [&b"caf\xe9.txt"[..], &b"caf\xff.txt"[..]] {
            let path = dir.path().join(OsStr::from_bytes(raw));
            if std::fs::write(&path, "x").is_err() {
                // Filesystems that enforce UTF-8 names cannot hold these files.
                return;
            }
        }

        let inventory = scan(dir.path(), true, &no_filter()).unwrap();
        assert_eq!(inventory.len(), 1);
        assert!(inventory.contains("cafe.txt"));
        assert!(inventory.iter().all(|r| !r.relative.contains('\u{fffd}')));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_does_not_abort_the_scan() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "ok.txt", "x");
        create_file(dir.path(), "locked/secret.txt", "y");
        let locked = dir.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let result = scan(dir.path(), true, &no_filter());
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let inventory = result.unwrap();
        assert!(inventory.contains("ok.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn relative_path_rejects_non_utf8_components() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new("/srv/site");
        let bad = root.join("img").join(OsStr::from_bytes(b"\xff.png"));
        assert_eq!(relative_path(root, &bad).unwrap(), None);
        assert_eq!(
            relative_path(root, &root.join("img/a.png")).unwrap(),
            Some("img/a.png".to_string())
        );
    }

    #[test]
    fn file_time_is_not_before_modification() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "a.txt", "x");
        let metadata = std::fs::metadata(dir.path().join("a.txt")).unwrap();
        let modified = DateTime::<Utc>::from(metadata.modified().unwrap());
        assert!(file_time(&metadata) >= modified);
    }
}
