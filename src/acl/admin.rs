//! Versioned store for the ACL configuration: a local git repository holding
//! the rendered conf file, committed once per repository change.

use std::fs;
use std::path::{Path, PathBuf};

use git2::{Repository as GitRepository, Signature};
use tracing::{debug, info};

use super::AclConfig;
use crate::error::Result;

/// Path of the rendered configuration inside the admin repository.
pub const CONFIG_FILE: &str = "conf/gitwarden.conf";

pub struct AdminRepo {
    repo: GitRepository,
    workdir: PathBuf,
    committer_email: String,
}

impl AdminRepo {
    /// Opens the admin repository, initializing a fresh one if the path does
    /// not hold a git repository yet.
    pub fn open_or_init(path: &Path, committer_email: &str) -> Result<Self> {
        let repo = match GitRepository::open(path) {
            Ok(repo) => repo,
            Err(_) => {
                info!("initializing admin repository at {}", path.display());
                fs::create_dir_all(path)?;
                GitRepository::init(path)?
            }
        };

        Ok(Self {
            repo,
            workdir: path.to_path_buf(),
            committer_email: committer_email.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.workdir
    }

    /// Writes the rendered configuration and commits it. Returns false
    /// without committing when the rendered text matches what is already
    /// stored, so replaying an already-applied change produces no commit.
    pub fn commit_config(&self, config: &AclConfig, message: &str) -> Result<bool> {
        let rendered = config.render();
        let file = self.workdir.join(CONFIG_FILE);

        if let Ok(existing) = fs::read_to_string(&file) {
            if existing == rendered {
                debug!("admin repository unchanged, skipping commit: {message}");
                return Ok(false);
            }
        }

        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file, rendered)?;

        let mut index = self.repo.index()?;
        index.add_path(Path::new(CONFIG_FILE))?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let sig = Signature::now("gitwarden", &self.committer_email)?;
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;

        info!("committed: {message}");
        Ok(true)
    }

    /// Number of commits on HEAD. Zero for a freshly initialized repository.
    pub fn commit_count(&self) -> Result<usize> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(_) => return Ok(0),
        };
        let Some(oid) = head.target() else {
            return Ok(0);
        };
        let mut walk = self.repo.revwalk()?;
        walk.push(oid)?;
        Ok(walk.count())
    }
}
