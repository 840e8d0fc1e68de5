//! Scoped working directories for engine runs.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{EstimatorError, Result};

/// Private working directory owned by a single fit or predict operation.
///
/// The directory name is unique under concurrent use, so independent
/// operations never share a workspace. It is removed when the value is
/// dropped, on success and on every failure path alike; removal errors are
/// ignored.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace under `scratch_root`, or under the system
    /// temporary directory when no root is given.
    pub fn create(scratch_root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mva-run-");
        let dir = match scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| EstimatorError::Resource(format!("failed to create working directory: {}", e)))?;
        log::debug!("created working directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_is_removed_on_drop() {
        let workspace = Workspace::create(None).unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.is_dir());
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn workspaces_under_the_same_root_do_not_collide() {
        let root = TempDir::new().unwrap();
        let first = Workspace::create(Some(root.path())).unwrap();
        let second = Workspace::create(Some(root.path())).unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(root.path()));
    }

    #[test]
    fn creation_fails_for_missing_root() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("does-not-exist");
        let result = Workspace::create(Some(&missing));
        assert!(matches!(result, Err(EstimatorError::Resource(_))));
    }
}
