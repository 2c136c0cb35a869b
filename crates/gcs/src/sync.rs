//! Directory ↔ bucket sync planning
//!
//! Builds a transfer plan by diffing a local tree against a remote listing.
//! The comparison is a heuristic: sizes plus modification times truncated
//! to whole seconds (the remote API does not round-trip sub-second
//! precision). Two same-size files whose times land in the same second are
//! treated as already synced even if their content differs; there is no
//! content-hash mode. Planning is pure: callers gather the inputs, the
//! planner only decides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gs_core::Result;

use crate::object::ObjectEntry;

/// One planned transfer, immutable once created
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Upload {
        local: PathBuf,
        bucket: String,
        key: String,
    },
    Download {
        bucket: String,
        key: String,
        local: PathBuf,
    },
    Skip {
        key: String,
        reason: &'static str,
    },
}

/// Size and mtime of one local file, keyed by its `/`-separated relative path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalFileMeta {
    pub size: u64,
    pub mtime_secs: i64,
}

/// Walk a local directory into relative-key → metadata entries
pub fn walk_local_tree(root: &Path) -> Result<HashMap<String, LocalFileMeta>> {
    let mut files = HashMap::new();
    if !root.exists() {
        return Ok(files);
    }
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            std::io::Error::other(format!("walking {}: {e}", root.display()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walkdir yields children of root")
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let metadata = entry.metadata().map_err(|e| {
            std::io::Error::other(format!("stat {}: {e}", entry.path().display()))
        })?;
        files.insert(
            rel,
            LocalFileMeta {
                size: metadata.len(),
                mtime_secs: mtime_secs(&metadata),
            },
        );
    }
    Ok(files)
}

fn mtime_secs(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Strip a remote prefix from an object name to get its relative key
fn relative_key<'a>(name: &'a str, prefix: &str) -> &'a str {
    name.strip_prefix(prefix)
        .unwrap_or(name)
        .trim_start_matches('/')
}

pub struct SyncPlanner;

impl SyncPlanner {
    /// Plan bucket/prefix → directory.
    ///
    /// Skip iff sizes are equal and the local file is not older than the
    /// remote object; anything missing locally downloads.
    pub fn plan_pull(
        remote: &[ObjectEntry],
        local: &HashMap<String, LocalFileMeta>,
        bucket: &str,
        prefix: &str,
        dest: &Path,
    ) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        for entry in remote {
            if entry.is_prefix || entry.name.ends_with('/') {
                continue;
            }
            let rel = relative_key(&entry.name, prefix);
            if rel.is_empty() {
                continue;
            }
            let up_to_date = local.get(rel).is_some_and(|meta| {
                Some(meta.size) == entry.size
                    && entry
                        .updated_secs()
                        .is_some_and(|remote_secs| meta.mtime_secs >= remote_secs)
            });
            if up_to_date {
                actions.push(SyncAction::Skip {
                    key: entry.name.clone(),
                    reason: "size/mtime match",
                });
            } else {
                actions.push(SyncAction::Download {
                    bucket: bucket.to_string(),
                    key: entry.name.clone(),
                    local: dest.join(rel),
                });
            }
        }
        actions
    }

    /// Plan directory → bucket/prefix.
    ///
    /// Skip iff sizes are equal and the remote object is not older than the
    /// local file; anything missing remotely uploads.
    pub fn plan_push(
        local: &HashMap<String, LocalFileMeta>,
        remote: &HashMap<String, ObjectEntry>,
        src: &Path,
        bucket: &str,
        prefix: &str,
    ) -> Vec<SyncAction> {
        let mut rels: Vec<&String> = local.keys().collect();
        rels.sort();

        let mut actions = Vec::new();
        for rel in rels {
            let meta = &local[rel];
            let key = join_key(prefix, rel);
            let up_to_date = remote.get(&key).is_some_and(|entry| {
                Some(meta.size) == entry.size
                    && entry
                        .updated_secs()
                        .is_some_and(|remote_secs| remote_secs >= meta.mtime_secs)
            });
            if up_to_date {
                actions.push(SyncAction::Skip {
                    key,
                    reason: "size/mtime match",
                });
            } else {
                actions.push(SyncAction::Upload {
                    local: src.join(rel.replace('/', std::path::MAIN_SEPARATOR_STR)),
                    bucket: bucket.to_string(),
                    key,
                });
            }
        }
        actions
    }

    /// Remote keys under `prefix` with no local counterpart (push `--delete`)
    pub fn remote_extras(
        local: &HashMap<String, LocalFileMeta>,
        remote: &HashMap<String, ObjectEntry>,
        prefix: &str,
    ) -> Vec<String> {
        let mut extras: Vec<String> = remote
            .keys()
            .filter(|key| !local.contains_key(relative_key(key, prefix)))
            .cloned()
            .collect();
        extras.sort();
        extras
    }
}

fn join_key(prefix: &str, rel: &str) -> String {
    if prefix.is_empty() {
        rel.to_string()
    } else if prefix.ends_with('/') {
        format!("{prefix}{rel}")
    } else {
        format!("{prefix}/{rel}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::Timestamp;

    fn remote_entry(name: &str, size: u64, updated_secs: i64) -> ObjectEntry {
        ObjectEntry {
            name: name.to_string(),
            size: Some(size),
            content_type: None,
            updated: Some(Timestamp::from_second(updated_secs).unwrap()),
            md5_hash: None,
            crc32c: None,
            generation: None,
            is_prefix: false,
        }
    }

    fn local_meta(size: u64, mtime_secs: i64) -> LocalFileMeta {
        LocalFileMeta { size, mtime_secs }
    }

    const T: i64 = 1_700_000_000;

    #[test]
    fn test_pull_skips_when_size_matches_and_local_not_older() {
        let remote = vec![remote_entry("f.txt", 10, T)];
        let local = HashMap::from([("f.txt".to_string(), local_meta(10, T))]);
        let plan =
            SyncPlanner::plan_pull(&remote, &local, "b", "", Path::new("/dest"));
        assert_eq!(
            plan,
            vec![SyncAction::Skip {
                key: "f.txt".to_string(),
                reason: "size/mtime match"
            }]
        );

        // Local strictly newer still skips
        let local = HashMap::from([("f.txt".to_string(), local_meta(10, T + 1))]);
        let plan =
            SyncPlanner::plan_pull(&remote, &local, "b", "", Path::new("/dest"));
        assert!(matches!(plan[0], SyncAction::Skip { .. }));
    }

    #[test]
    fn test_pull_downloads_when_local_older_by_one_second() {
        let remote = vec![remote_entry("f.txt", 10, T)];
        let local = HashMap::from([("f.txt".to_string(), local_meta(10, T - 1))]);
        let plan =
            SyncPlanner::plan_pull(&remote, &local, "b", "", Path::new("/dest"));
        assert!(matches!(plan[0], SyncAction::Download { .. }));
    }

    #[test]
    fn test_pull_downloads_on_size_mismatch() {
        let remote = vec![remote_entry("f.txt", 10, T)];
        let local = HashMap::from([("f.txt".to_string(), local_meta(11, T + 100))]);
        let plan =
            SyncPlanner::plan_pull(&remote, &local, "b", "", Path::new("/dest"));
        assert!(matches!(plan[0], SyncAction::Download { .. }));
    }

    #[test]
    fn test_pull_downloads_missing_local() {
        let remote = vec![remote_entry("pre/f.txt", 10, T)];
        let local = HashMap::new();
        let plan =
            SyncPlanner::plan_pull(&remote, &local, "b", "pre/", Path::new("/dest"));
        assert_eq!(
            plan,
            vec![SyncAction::Download {
                bucket: "b".to_string(),
                key: "pre/f.txt".to_string(),
                local: PathBuf::from("/dest/f.txt"),
            }]
        );
    }

    #[test]
    fn test_pull_ignores_prefix_placeholders() {
        let remote = vec![ObjectEntry::prefix("dir/"), remote_entry("dir/", 0, T)];
        let plan = SyncPlanner::plan_pull(
            &remote,
            &HashMap::new(),
            "b",
            "",
            Path::new("/dest"),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_push_skips_when_remote_not_older() {
        let local = HashMap::from([("f.txt".to_string(), local_meta(10, T))]);
        let remote = HashMap::from([("pre/f.txt".to_string(), remote_entry("pre/f.txt", 10, T))]);
        let plan =
            SyncPlanner::plan_push(&local, &remote, Path::new("/src"), "b", "pre");
        assert!(matches!(plan[0], SyncAction::Skip { .. }));
    }

    #[test]
    fn test_push_uploads_when_remote_older_by_one_second() {
        let local = HashMap::from([("f.txt".to_string(), local_meta(10, T))]);
        let remote = HashMap::from([(
            "pre/f.txt".to_string(),
            remote_entry("pre/f.txt", 10, T - 1),
        )]);
        let plan =
            SyncPlanner::plan_push(&local, &remote, Path::new("/src"), "b", "pre");
        assert_eq!(
            plan,
            vec![SyncAction::Upload {
                local: PathBuf::from("/src/f.txt"),
                bucket: "b".to_string(),
                key: "pre/f.txt".to_string(),
            }]
        );
    }

    #[test]
    fn test_push_uploads_missing_remote() {
        let local = HashMap::from([("new.txt".to_string(), local_meta(5, T))]);
        let plan = SyncPlanner::plan_push(
            &local,
            &HashMap::new(),
            Path::new("/src"),
            "b",
            "",
        );
        assert!(matches!(plan[0], SyncAction::Upload { .. }));
    }

    #[test]
    fn test_same_second_same_size_content_difference_is_invisible() {
        // Documented heuristic limit: equal size + equal whole-second
        // mtime is treated as synced regardless of content.
        let remote = vec![remote_entry("f.txt", 10, T)];
        let local = HashMap::from([("f.txt".to_string(), local_meta(10, T))]);
        let plan =
            SyncPlanner::plan_pull(&remote, &local, "b", "", Path::new("/dest"));
        assert!(matches!(plan[0], SyncAction::Skip { .. }));
    }

    #[test]
    fn test_remote_extras() {
        let local = HashMap::from([("keep.txt".to_string(), local_meta(1, T))]);
        let remote = HashMap::from([
            (
                "pre/keep.txt".to_string(),
                remote_entry("pre/keep.txt", 1, T),
            ),
            (
                "pre/extra.txt".to_string(),
                remote_entry("pre/extra.txt", 2, T),
            ),
        ]);
        let extras = SyncPlanner::remote_extras(&local, &remote, "pre/");
        assert_eq!(extras, vec!["pre/extra.txt".to_string()]);
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "a/b"), "a/b");
        assert_eq!(join_key("p", "a"), "p/a");
        assert_eq!(join_key("p/", "a"), "p/a");
    }

    #[test]
    fn test_walk_local_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"bb").unwrap();

        let files = walk_local_tree(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files["a.txt"].size, 3);
        assert_eq!(files["sub/b.txt"].size, 2);
    }

    #[test]
    fn test_walk_missing_root_is_empty() {
        let files = walk_local_tree(Path::new("/definitely/not/here")).unwrap();
        assert!(files.is_empty());
    }
}
