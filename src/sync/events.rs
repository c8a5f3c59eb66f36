//! Translation of hosting-application events into synchronizer actions.
//!
//! Force-resync requests travel as explicit fields on [`HostingEvent::SettingsSaved`]
//! instead of shared flags, so no ordering state leaks across events.

use std::path::{Path, PathBuf};

use tracing::info;

use super::{RepoHandle, SyncAction};
use crate::directory::Directory;
use crate::error::Result;

/// External event delivered by the hosting application.
#[derive(Debug, Clone)]
pub enum HostingEvent {
    MembershipUpdated {
        project_id: String,
    },
    /// Project renamed, re-parented, archived or had its visibility changed.
    ProjectUpdated {
        project_id: String,
    },
    ProjectDeletionImminent {
        project_id: String,
        confirmed: bool,
    },
    RepositoryCreated {
        project_id: String,
    },
    RepositoryDestroyed {
        name: String,
        path: PathBuf,
    },
    SettingsSaved {
        resync_projects: bool,
        resync_principals: bool,
    },
}

/// Maps one event to the lifecycle actions it implies, in execution order.
pub fn actions_for(
    event: HostingEvent,
    directory: &dyn Directory,
    storage_root: &Path,
) -> Result<Vec<SyncAction>> {
    match event {
        HostingEvent::MembershipUpdated { project_id } => {
            info!("membership changed on project '{project_id}', refreshing permissions");
            refresh_project(directory, &project_id)
        }

        HostingEvent::ProjectUpdated { project_id } => {
            let mut actions = Vec::new();
            for project in directory.self_and_descendants(&project_id)? {
                let Some(repo) = directory.repository(&project.id)? else {
                    continue;
                };
                if repo.needs_move() {
                    info!("repository of project '{}' must move", project.id);
                    actions.push(SyncAction::MoveRepository {
                        old_name: old_name_of(&repo.url),
                        old_path: storage_root.join(&repo.url),
                        repository: repo,
                    });
                } else {
                    actions.push(SyncAction::AddRepository(repo));
                }
            }
            Ok(actions)
        }

        HostingEvent::ProjectDeletionImminent {
            project_id,
            confirmed,
        } => {
            if !confirmed {
                return Ok(Vec::new());
            }
            // Deepest-first so directory cleanup never meets a populated
            // parent.
            let mut handles = Vec::new();
            for project in directory.self_and_descendants(&project_id)? {
                if let Some(repo) = directory.repository(&project.id)? {
                    handles.push(RepoHandle {
                        name: repo.name,
                        path: storage_root.join(repo.url),
                    });
                }
            }
            handles.reverse();
            Ok(vec![SyncAction::DeleteRepositories(handles)])
        }

        HostingEvent::RepositoryCreated { project_id } => {
            info!("repository created for project '{project_id}'");
            refresh_project(directory, &project_id)
        }

        HostingEvent::RepositoryDestroyed { name, path } => {
            Ok(vec![SyncAction::DeleteRepositories(vec![RepoHandle {
                name,
                path,
            }])])
        }

        HostingEvent::SettingsSaved {
            resync_projects,
            resync_principals,
        } => {
            let mut actions = Vec::new();
            if resync_projects {
                actions.push(SyncAction::ResyncAllProjects);
            }
            if resync_principals {
                actions.push(SyncAction::ResyncAllPrincipals);
            }
            Ok(actions)
        }
    }
}

fn refresh_project(directory: &dyn Directory, project_id: &str) -> Result<Vec<SyncAction>> {
    match directory.repository(project_id)? {
        Some(repo) => Ok(vec![SyncAction::AddRepository(repo)]),
        None => Ok(Vec::new()),
    }
}

/// Repository name recorded in the ACL for the old location: the relative
/// disk path without its `.git` suffix.
fn old_name_of(url: &str) -> String {
    url.strip_suffix(".git").unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::types::{Project, Repository};

    fn directory() -> InMemoryDirectory {
        let mut dir = InMemoryDirectory::new();
        dir.add_project(Project {
            id: "platform".into(),
            name: "Platform".into(),
            active: true,
            public: false,
            parent: None,
        });
        dir.add_project(Project {
            id: "backend".into(),
            name: "Backend".into(),
            active: true,
            public: false,
            parent: Some("platform".into()),
        });
        dir.add_repository(Repository {
            name: "platform".into(),
            url: "platform.git".into(),
            project_id: "platform".into(),
            http_enabled: false,
            daemon_enabled: false,
            config_keys: Vec::new(),
        })
        .unwrap();
        dir
    }

    fn root() -> PathBuf {
        PathBuf::from("/srv/git")
    }

    #[test]
    fn test_membership_update_refreshes_repository() {
        let actions =
            actions_for(
                HostingEvent::MembershipUpdated {
                    project_id: "platform".into(),
                },
                &directory(),
                &root(),
            )
            .unwrap();

        assert!(matches!(
            actions.as_slice(),
            [SyncAction::AddRepository(repo)] if repo.name == "platform"
        ));
    }

    #[test]
    fn test_project_update_emits_move_for_stale_url() {
        let mut dir = directory();
        dir.add_repository(Repository {
            name: "platform/backend".into(),
            url: "backend.git".into(),
            project_id: "backend".into(),
            http_enabled: false,
            daemon_enabled: false,
            config_keys: Vec::new(),
        })
        .unwrap();

        let actions = actions_for(
            HostingEvent::ProjectUpdated {
                project_id: "platform".into(),
            },
            &dir,
            &root(),
        )
        .unwrap();

        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], SyncAction::AddRepository(r) if r.name == "platform"));
        match &actions[1] {
            SyncAction::MoveRepository {
                repository,
                old_name,
                old_path,
            } => {
                assert_eq!(repository.name, "platform/backend");
                assert_eq!(old_name, "backend");
                assert_eq!(old_path, &PathBuf::from("/srv/git/backend.git"));
            }
            other => panic!("expected move, got {other:?}"),
        }
    }

    #[test]
    fn test_deletion_orders_children_before_parents() {
        let mut dir = directory();
        dir.add_repository(Repository {
            name: "platform/backend".into(),
            url: "platform/backend.git".into(),
            project_id: "backend".into(),
            http_enabled: false,
            daemon_enabled: false,
            config_keys: Vec::new(),
        })
        .unwrap();

        let actions = actions_for(
            HostingEvent::ProjectDeletionImminent {
                project_id: "platform".into(),
                confirmed: true,
            },
            &dir,
            &root(),
        )
        .unwrap();

        match actions.as_slice() {
            [SyncAction::DeleteRepositories(handles)] => {
                let names: Vec<_> = handles.iter().map(|h| h.name.as_str()).collect();
                assert_eq!(names, vec!["platform/backend", "platform"]);
            }
            other => panic!("expected one delete batch, got {other:?}"),
        }
    }

    #[test]
    fn test_unconfirmed_deletion_is_ignored() {
        let actions = actions_for(
            HostingEvent::ProjectDeletionImminent {
                project_id: "platform".into(),
                confirmed: false,
            },
            &directory(),
            &root(),
        )
        .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_settings_saved_maps_to_explicit_resyncs() {
        let actions = actions_for(
            HostingEvent::SettingsSaved {
                resync_projects: true,
                resync_principals: true,
            },
            &directory(),
            &root(),
        )
        .unwrap();

        assert!(matches!(
            actions.as_slice(),
            [SyncAction::ResyncAllProjects, SyncAction::ResyncAllPrincipals]
        ));
    }
}
