//! Per-task workspace manager.
//!
//! Each root-initiated task gets an isolated file tree under
//! `<workspaces>/<task_id>/`. Directories are created lazily: only
//! writes create them, so listing a never-written workspace returns an
//! empty list rather than an error.
//!
//! # Path safety
//!
//! Every relative path is normalized lexically before it touches the
//! filesystem: absolute paths, drive-qualified paths, and any path
//! whose normal form climbs out of the workspace root are rejected
//! with [`WorkspaceError::PathTraversal`]. Normalization is lexical
//! (component by component) rather than `canonicalize`-based because
//! write targets do not exist yet.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// Failures from workspace operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WorkspaceError {
    /// The path escapes the workspace root (absolute, drive-qualified,
    /// or `..` past the root).
    #[error("path traversal blocked: {0}")]
    PathTraversal(String),

    /// The task id itself is not a safe directory name.
    #[error("invalid task id: {0}")]
    InvalidTaskId(String),

    /// The requested file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Underlying I/O failure.
    #[error("workspace io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkspaceError {
    /// Stable error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            WorkspaceError::PathTraversal(_) => "path_traversal_blocked",
            WorkspaceError::InvalidTaskId(_) => "invalid_path",
            WorkspaceError::FileNotFound(_) => "file_not_found",
            WorkspaceError::Io(_) => "execution_failed",
        }
    }
}

/// One entry from [`WorkspaceManager::list_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Path relative to the listed directory.
    pub path: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Aggregate stats from [`WorkspaceManager::workspace_info`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkspaceInfo {
    /// Number of regular files.
    pub file_count: usize,
    /// Number of directories.
    pub dir_count: usize,
    /// Total size of all files, in bytes.
    pub total_size: u64,
    /// Most recent modification time across the tree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Per-task file sandbox rooted at `<root>/<task_id>/`.
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at `root`. The root directory itself is
    /// created eagerly; per-task directories are not.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The directory a task's workspace lives in (not created).
    pub fn workspace_path(&self, task_id: &str) -> Result<PathBuf, WorkspaceError> {
        validate_task_id(task_id)?;
        Ok(self.root.join(task_id))
    }

    /// Create the workspace directory for a task.
    pub fn create_workspace(&self, task_id: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.workspace_path(task_id)?;
        std::fs::create_dir_all(&path)?;
        debug!(task = %task_id, "created workspace");
        Ok(path)
    }

    /// Resolve a relative path inside a task's workspace, enforcing
    /// the containment contract. The target does not need to exist.
    fn resolve(&self, task_id: &str, rel_path: &str) -> Result<PathBuf, WorkspaceError> {
        let workspace = self.workspace_path(task_id)?;
        let normalized = normalize_rel_path(rel_path)?;
        Ok(workspace.join(normalized))
    }

    /// Read a file from the workspace.
    pub fn read_file(&self, task_id: &str, rel_path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.resolve(task_id, rel_path)?;
        if !path.is_file() {
            return Err(WorkspaceError::FileNotFound(rel_path.to_string()));
        }
        Ok(std::fs::read(&path)?)
    }

    /// Write a file into the workspace, creating parent directories
    /// (this is the only operation that creates the workspace lazily).
    pub fn write_file(
        &self,
        task_id: &str,
        rel_path: &str,
        content: &[u8],
    ) -> Result<(), WorkspaceError> {
        let path = self.resolve(task_id, rel_path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        debug!(task = %task_id, path = %rel_path, bytes = content.len(), "wrote workspace file");
        Ok(())
    }

    /// List the entries of a directory inside the workspace, sorted by
    /// path. A never-written workspace (or missing subdirectory) yields
    /// an empty list.
    pub fn list_files(
        &self,
        task_id: &str,
        rel_path: &str,
    ) -> Result<Vec<FileEntry>, WorkspaceError> {
        let dir = self.resolve(task_id, rel_path)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(FileEntry {
                path: entry.file_name().to_string_lossy().into_owned(),
                size: if metadata.is_file() { metadata.len() } else { 0 },
                is_dir: metadata.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Aggregate stats over a task's whole workspace tree.
    pub fn workspace_info(&self, task_id: &str) -> Result<WorkspaceInfo, WorkspaceError> {
        let workspace = self.workspace_path(task_id)?;
        let mut info = WorkspaceInfo::default();
        if !workspace.is_dir() {
            return Ok(info);
        }
        walk(&workspace, &mut info)?;
        Ok(info)
    }
}

fn walk(dir: &Path, info: &mut WorkspaceInfo) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            info.dir_count += 1;
            walk(&entry.path(), info)?;
        } else {
            info.file_count += 1;
            info.total_size += metadata.len();
            if let Ok(modified) = metadata.modified() {
                let modified: DateTime<Utc> = modified.into();
                if info.last_modified.map(|m| modified > m).unwrap_or(true) {
                    info.last_modified = Some(modified);
                }
            }
        }
    }
    Ok(())
}

/// A task id must be a plain directory name: no separators, no `..`,
/// no leading dot, nothing empty.
fn validate_task_id(task_id: &str) -> Result<(), WorkspaceError> {
    if task_id.is_empty()
        || task_id == "."
        || task_id == ".."
        || task_id.contains('/')
        || task_id.contains('\\')
        || task_id.contains(':')
    {
        return Err(WorkspaceError::InvalidTaskId(task_id.to_string()));
    }
    Ok(())
}

/// Lexically normalize a relative path, rejecting anything that is
/// absolute, drive-qualified, or climbs out of the root.
fn normalize_rel_path(rel_path: &str) -> Result<PathBuf, WorkspaceError> {
    let path = Path::new(rel_path);
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(WorkspaceError::PathTraversal(rel_path.to_string()));
            }
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(WorkspaceError::PathTraversal(rel_path.to_string()));
                }
            }
            Component::CurDir => {}
            Component::Normal(part) => stack.push(part),
        }
    }

    Ok(stack.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_manager() -> (TempDir, WorkspaceManager) {
        let dir = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(dir.path().join("workspaces")).unwrap();
        (dir, manager)
    }

    #[test]
    fn write_read_roundtrip() {
        let (_tmp, ws) = make_manager();
        ws.write_file("t1", "notes/plan.md", b"step one").unwrap();
        let content = ws.read_file("t1", "notes/plan.md").unwrap();
        assert_eq!(content, b"step one");
    }

    #[test]
    fn workspaces_are_isolated() {
        let (_tmp, ws) = make_manager();
        ws.write_file("t1", "shared.txt", b"in t1").unwrap();
        let err = ws.read_file("t2", "shared.txt").unwrap_err();
        assert_eq!(err.code(), "file_not_found");
    }

    #[test]
    fn parent_traversal_blocked() {
        let (_tmp, ws) = make_manager();
        for bad in [
            "../escape.txt",
            "a/../../escape.txt",
            "../../../../etc/passwd",
            "..",
        ] {
            let err = ws.write_file("t1", bad, b"x").unwrap_err();
            assert_eq!(err.code(), "path_traversal_blocked", "path: {bad}");
            let err = ws.read_file("t1", bad).unwrap_err();
            assert_eq!(err.code(), "path_traversal_blocked", "path: {bad}");
            let err = ws.list_files("t1", bad).unwrap_err();
            assert_eq!(err.code(), "path_traversal_blocked", "path: {bad}");
        }
    }

    #[test]
    fn absolute_paths_blocked() {
        let (_tmp, ws) = make_manager();
        let err = ws.write_file("t1", "/etc/passwd", b"x").unwrap_err();
        assert_eq!(err.code(), "path_traversal_blocked");
    }

    #[test]
    fn nothing_written_outside_workspace_on_traversal_attempt() {
        let (tmp, ws) = make_manager();
        let _ = ws.write_file("t1", "../escape.txt", b"x");
        assert!(!tmp.path().join("workspaces/escape.txt").exists());
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn interior_dotdot_that_stays_inside_is_allowed() {
        let (_tmp, ws) = make_manager();
        ws.write_file("t1", "a/b/../c.txt", b"ok").unwrap();
        let content = ws.read_file("t1", "a/c.txt").unwrap();
        assert_eq!(content, b"ok");
    }

    #[test]
    fn invalid_task_ids_rejected() {
        let (_tmp, ws) = make_manager();
        for bad in ["", "..", "a/b", "a\\b", "C:"] {
            let err = ws.write_file(bad, "f.txt", b"x").unwrap_err();
            assert_eq!(err.code(), "invalid_path", "task id: {bad}");
        }
    }

    #[test]
    fn getting_workspace_path_does_not_create_it() {
        let (_tmp, ws) = make_manager();
        let path = ws.workspace_path("t1").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn list_on_unwritten_workspace_is_empty() {
        let (_tmp, ws) = make_manager();
        assert!(ws.list_files("never-written", ".").unwrap().is_empty());
    }

    #[test]
    fn list_files_sorted_with_metadata() {
        let (_tmp, ws) = make_manager();
        ws.write_file("t1", "b.txt", b"bb").unwrap();
        ws.write_file("t1", "a.txt", b"a").unwrap();
        ws.write_file("t1", "sub/c.txt", b"ccc").unwrap();

        let entries = ws.list_files("t1", ".").unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[0].size, 1);
        assert!(entries[2].is_dir);
    }

    #[test]
    fn workspace_info_aggregates() {
        let (_tmp, ws) = make_manager();
        ws.write_file("t1", "a.txt", b"aaaa").unwrap();
        ws.write_file("t1", "sub/b.txt", b"bb").unwrap();

        let info = ws.workspace_info("t1").unwrap();
        assert_eq!(info.file_count, 2);
        assert_eq!(info.dir_count, 1);
        assert_eq!(info.total_size, 6);
        assert!(info.last_modified.is_some());
    }

    #[test]
    fn workspace_info_on_missing_workspace_is_zeroed() {
        let (_tmp, ws) = make_manager();
        let info = ws.workspace_info("none").unwrap();
        assert_eq!(info, WorkspaceInfo::default());
    }
}
