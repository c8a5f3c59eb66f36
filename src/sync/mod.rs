//! Repository lifecycle synchronization: keeps the in-memory ACL
//! configuration, the bare repositories on disk, and the versioned admin
//! repository consistent across add/delete/move operations.
//!
//! Actions are delivered one at a time; each completes, filesystem side
//! effects included, before the next begins. One commit per repository
//! change, never batched across repositories.

pub mod events;
mod relocate;

pub use events::HostingEvent;
pub use relocate::Relocator;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::acl::{AclConfig, AdminRepo, RepoEntry, permissions};
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::types::{Capability, Repository};

/// Config key tagging an entry with its owning project.
pub const PROJECT_ID_KEY: &str = "gitwarden.projectid";
/// Config key controlling anonymous smart-HTTP upload-pack.
pub const HTTP_UPLOADPACK_KEY: &str = "http.uploadpack";

/// Name and on-disk path of a repository scheduled for deletion. Carried
/// separately from [`Repository`] because the owning project may already be
/// gone when the deletion executes.
#[derive(Debug, Clone)]
pub struct RepoHandle {
    pub name: String,
    pub path: PathBuf,
}

/// One unit of work for the synchronizer.
#[derive(Debug)]
pub enum SyncAction {
    AddRepository(Repository),
    /// Ordered deepest-first when nested projects are deleted together, so
    /// directory pruning never hits a still-populated parent.
    DeleteRepositories(Vec<RepoHandle>),
    MoveRepository {
        repository: Repository,
        old_name: String,
        old_path: PathBuf,
    },
    ResyncAllProjects,
    ResyncAllPrincipals,
}

pub struct Synchronizer {
    config: AclConfig,
    admin: AdminRepo,
    relocator: Relocator,
    directory: Arc<dyn Directory>,
    storage_root: PathBuf,
}

impl Synchronizer {
    pub fn new(
        admin: AdminRepo,
        directory: Arc<dyn Directory>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        let storage_root = storage_root.into();
        Self {
            config: AclConfig::new(),
            admin,
            relocator: Relocator::new(&storage_root),
            directory,
            storage_root,
        }
    }

    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    pub fn apply(&mut self, action: SyncAction) -> Result<()> {
        match action {
            SyncAction::AddRepository(repo) => self.add_repository(&repo),
            SyncAction::DeleteRepositories(repos) => {
                // Default post-removal behavior: reclaim the directory.
                let relocator = self.relocator_for_hooks();
                self.delete_repositories(&repos, |handle| relocator.clean_repo_dir(&handle.path))
            }
            SyncAction::MoveRepository {
                repository,
                old_name,
                old_path,
            } => self.move_repository(&repository, &old_name, &old_path),
            SyncAction::ResyncAllProjects => self.resync_all_projects(),
            SyncAction::ResyncAllPrincipals => self.resync_all_principals(),
        }
    }

    /// Registers a repository, replacing any stale entry of the same name.
    /// Idempotent: a second add yields one entry with the latest permissions.
    pub fn add_repository(&mut self, repo: &Repository) -> Result<()> {
        let name = repo.name.clone();

        if self.config.repo(&name).is_some() {
            warn!("repository '{name}' already present in ACL configuration, removing first");
            self.config.rm_repo(&name);
        }

        let entry = self.build_entry(repo)?;
        let permissions = self.compute_permissions(repo)?;

        // Config keys and permissions land only once the bare entry is
        // attached, so a failure cannot leave a half-configured entry.
        self.config.add_repo(entry);
        if let Some(attached) = self.config.repo_mut(&name) {
            attached.set_permissions(permissions);
        }

        self.admin
            .commit_config(&self.config, &format!("add_repository : {name}"))?;
        Ok(())
    }

    /// Removes a batch of repositories. Each repository commits on its own;
    /// a failure on one does not roll back siblings already processed, and
    /// remaining siblings are still attempted. An entry already absent is a
    /// valid end state, logged and skipped.
    ///
    /// `after_remove` runs between the configuration removal and the commit,
    /// giving the caller a chance to archive or trash the physical
    /// repository before it is considered gone.
    pub fn delete_repositories<F>(&mut self, repos: &[RepoHandle], mut after_remove: F) -> Result<()>
    where
        F: FnMut(&RepoHandle) -> Result<()>,
    {
        let mut first_err = None;

        for handle in repos {
            if self.config.rm_repo(&handle.name).is_none() {
                warn!("repository '{}' not present in ACL configuration", handle.name);
                continue;
            }

            let result = after_remove(handle).and_then(|()| {
                self.admin
                    .commit_config(&self.config, &format!("delete_repository : {}", handle.name))
                    .map(|_| ())
            });

            if let Err(e) = result {
                error!("failed to delete repository '{}': {e}", handle.name);
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Moves a repository to the location implied by its current name:
    /// remove the old entry, relocate the directory, re-add as new.
    ///
    /// The three steps are not atomic. If the filesystem step fails after
    /// the old entry was removed, the repository has no ACL entry while its
    /// directory still sits at the old path; that state is surfaced loudly
    /// and never repaired automatically.
    pub fn move_repository(
        &mut self,
        repo: &Repository,
        old_name: &str,
        old_path: &Path,
    ) -> Result<()> {
        let new_path = repo.canonical_path(&self.storage_root);

        info!("moving repository '{old_name}' -> '{}'", repo.name);
        debug!(
            "on filesystem: '{}' -> '{}'",
            old_path.display(),
            new_path.display()
        );

        if self.config.rm_repo(old_name).is_none() {
            warn!("repository '{old_name}' not present in ACL configuration");
        }

        if let Err(e) = self.relocator.relocate(old_path, &new_path) {
            error!(
                "move of '{old_name}' interrupted: ACL entry removed but directory move \
                 failed ({e}); operator intervention required"
            );
            return Err(Error::MoveInterrupted {
                name: old_name.to_string(),
                old_path: old_path.to_path_buf(),
            });
        }

        self.add_repository(repo)
    }

    /// Re-issues an add for every active project's repository. Idempotent:
    /// replaying against an already-consistent system produces no commit.
    pub fn resync_all_projects(&mut self) -> Result<()> {
        let projects = self.directory.projects()?;
        let mut count = 0;

        for project in projects.iter().filter(|p| p.active) {
            if let Some(repo) = self.directory.repository(&project.id)? {
                self.add_repository(&repo)?;
                count += 1;
            }
        }

        info!("resynchronized {count} repositories");
        Ok(())
    }

    /// Recomputes the permission blocks distributed for every principal, on
    /// every registered repository regardless of project state.
    pub fn resync_all_principals(&mut self) -> Result<()> {
        let projects = self.directory.projects()?;
        let mut count = 0;

        for project in &projects {
            if let Some(repo) = self.directory.repository(&project.id)? {
                self.add_repository(&repo)?;
                count += 1;
            }
        }

        info!("redistributed permissions for {count} repositories");
        Ok(())
    }

    /// Hands the synchronizer to a dedicated consumer thread and returns a
    /// handle for dispatching actions to it.
    pub fn spawn(self) -> SyncHandle {
        let (tx, rx) = mpsc::channel::<SyncAction>();

        let join = thread::Builder::new()
            .name("gitwarden-sync".into())
            .spawn(move || {
                let mut sync = self;
                // One action fully completes before the next is received.
                while let Ok(action) = rx.recv() {
                    if let Err(e) = sync.apply(action) {
                        error!("synchronization action failed: {e}");
                    }
                }
            })
            .expect("spawn synchronizer thread");

        SyncHandle {
            tx,
            join: Some(join),
        }
    }

    fn compute_permissions(&self, repo: &Repository) -> Result<permissions::TierSet> {
        let project = self
            .directory
            .project(&repo.project_id)?
            .ok_or_else(|| Error::ProjectNotFound(repo.project_id.clone()))?;
        let members = self.directory.members(&project.id)?;
        let anonymous = self.directory.anonymous_capability(&project);

        Ok(permissions::compute(repo, &project, &members, anonymous))
    }

    fn build_entry(&self, repo: &Repository) -> Result<RepoEntry> {
        let project = self
            .directory
            .project(&repo.project_id)?
            .ok_or_else(|| Error::ProjectNotFound(repo.project_id.clone()))?;
        let anonymous = self.directory.anonymous_capability(&project);

        let mut entry = RepoEntry::new(&repo.name);
        entry.set_config_key(PROJECT_ID_KEY, &project.id);

        let anonymous_http = anonymous.has(Capability::VIEW_CHANGESETS) || repo.http_enabled;
        entry.set_config_key(HTTP_UPLOADPACK_KEY, anonymous_http.to_string());

        for (key, value) in &repo.config_keys {
            entry.set_config_key(key, value);
        }

        Ok(entry)
    }

    // delete_repositories borrows self mutably while the default hook needs
    // the relocator; hand the hook its own value over the same root.
    fn relocator_for_hooks(&self) -> Relocator {
        Relocator::new(self.storage_root.clone())
    }
}

/// Dispatch side of the single-consumer synchronizer thread.
pub struct SyncHandle {
    tx: mpsc::Sender<SyncAction>,
    join: Option<thread::JoinHandle<()>>,
}

impl SyncHandle {
    pub fn dispatch(&self, action: SyncAction) -> Result<()> {
        self.tx.send(action).map_err(|_| Error::SynchronizerGone)
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        // Closing the channel lets the consumer drain and exit.
        drop(std::mem::replace(&mut self.tx, mpsc::channel().0));
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
