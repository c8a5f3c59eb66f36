//! Physical relocation of bare-repository directories under the storage
//! root, including pruning of directory structure abandoned by a move.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;

pub struct Relocator {
    root: PathBuf,
}

impl Relocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Moves the directory tree at `old` to `new`.
    ///
    /// Identical paths are a logged no-op. A pre-existing destination is
    /// leftover state from an incomplete prior cleanup and is deleted first,
    /// never merged into. A missing source means the repository was
    /// registered but never materialized on disk; the move is skipped.
    /// After a successful move, `old` and every ancestor left empty is
    /// pruned up to (not including) the storage root.
    pub fn relocate(&self, old: &Path, new: &Path) -> Result<()> {
        if old == new {
            warn!(
                "old and new repository location are identical '{}', nothing to move",
                old.display()
            );
            return Ok(());
        }

        if new.is_dir() {
            warn!(
                "new location '{}' already exists, cleaning first",
                new.display()
            );
            fs::remove_dir_all(new)?;
        }

        if !old.is_dir() {
            info!(
                "old location '{}' was never created, skipping disk movement",
                old.display()
            );
            return Ok(());
        }

        if let Some(parent) = new.parent() {
            fs::create_dir_all(parent)?;
        }
        move_tree(old, new)?;

        self.clean_repo_dir(old)
    }

    /// Removes `path` and walks upward deleting every ancestor directory
    /// left empty, stopping at the first non-empty ancestor or at the
    /// storage root.
    pub fn clean_repo_dir(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_dir_all(path)?;
        }

        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == self.root || !dir.is_dir() {
                break;
            }
            if fs::read_dir(dir)?.next().is_some() {
                break;
            }
            info!("pruning empty repository directory {}", dir.display());
            fs::remove_dir(dir)?;
            parent = dir.parent();
        }
        Ok(())
    }
}

/// Rename, falling back to copy-and-delete when the rename fails (e.g.
/// across filesystems).
fn move_tree(old: &Path, new: &Path) -> Result<()> {
    match fs::rename(old, new) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_tree(old, new)?;
            fs::remove_dir_all(old)?;
            Ok(())
        }
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo(root: &Path, rel: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(dir.join("refs")).unwrap();
        fs::write(dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();
    }

    #[test]
    fn test_identical_paths_are_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        make_repo(tmp.path(), "app.git");
        let relocator = Relocator::new(tmp.path());

        relocator
            .relocate(&tmp.path().join("app.git"), &tmp.path().join("app.git"))
            .unwrap();

        assert!(tmp.path().join("app.git/HEAD").exists());
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let relocator = Relocator::new(tmp.path());

        relocator
            .relocate(&tmp.path().join("ghost.git"), &tmp.path().join("app.git"))
            .unwrap();

        assert!(!tmp.path().join("app.git").exists());
    }

    #[test]
    fn test_move_and_prune_empty_ancestors() {
        let tmp = tempfile::tempdir().unwrap();
        make_repo(tmp.path(), "foo/bar/app.git");
        let relocator = Relocator::new(tmp.path());

        relocator
            .relocate(
                &tmp.path().join("foo/bar/app.git"),
                &tmp.path().join("foo/app.git"),
            )
            .unwrap();

        assert!(tmp.path().join("foo/app.git/HEAD").exists());
        assert!(!tmp.path().join("foo/bar").exists());
        // The storage root itself is never pruned.
        assert!(tmp.path().exists());
    }

    #[test]
    fn test_prune_stops_at_non_empty_ancestor() {
        let tmp = tempfile::tempdir().unwrap();
        make_repo(tmp.path(), "foo/bar/app.git");
        make_repo(tmp.path(), "foo/other.git");
        let relocator = Relocator::new(tmp.path());

        relocator
            .relocate(
                &tmp.path().join("foo/bar/app.git"),
                &tmp.path().join("app.git"),
            )
            .unwrap();

        assert!(!tmp.path().join("foo/bar").exists());
        assert!(tmp.path().join("foo/other.git").exists());
    }

    #[test]
    fn test_existing_destination_is_replaced_not_merged() {
        let tmp = tempfile::tempdir().unwrap();
        make_repo(tmp.path(), "old/app.git");
        make_repo(tmp.path(), "new/app.git");
        fs::write(tmp.path().join("new/app.git/stale"), "leftover").unwrap();

        let relocator = Relocator::new(tmp.path());
        relocator
            .relocate(
                &tmp.path().join("old/app.git"),
                &tmp.path().join("new/app.git"),
            )
            .unwrap();

        assert!(tmp.path().join("new/app.git/HEAD").exists());
        assert!(!tmp.path().join("new/app.git/stale").exists());
        assert!(!tmp.path().join("old").exists());
    }
}
