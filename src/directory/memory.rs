use std::collections::BTreeMap;
use std::path::Path;

use argon2::password_hash::PasswordHash;
use argon2::{Argon2, PasswordVerifier};
use serde::Deserialize;
use tracing::warn;

use super::Directory;
use crate::error::{Error, Result};
use crate::types::{Capability, Principal, Project, Repository};

/// On-disk form of a directory snapshot, loadable from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub repositories: Vec<Repository>,
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
    /// Capabilities unauthenticated users hold on public projects.
    #[serde(default)]
    pub anonymous: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    pub login: String,
    /// Identifier emitted into ACL permission tiers. Defaults to the login.
    #[serde(default)]
    pub acl_id: Option<String>,
    /// PHC-format argon2 hash. Accounts without one cannot authenticate
    /// over HTTP (deploy keys, service principals).
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub memberships: Vec<MembershipRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipRecord {
    pub project: String,
    pub capabilities: Vec<String>,
}

struct Account {
    login: String,
    acl_id: String,
    password_hash: Option<String>,
    memberships: BTreeMap<String, Capability>,
}

/// In-memory [`Directory`] backed by a loaded snapshot. Suitable for the
/// standalone binary and for tests; a deployment embedded in a larger
/// application would implement [`Directory`] over its own database.
#[derive(Default)]
pub struct InMemoryDirectory {
    projects: BTreeMap<String, Project>,
    repos_by_project: BTreeMap<String, Repository>,
    accounts: Vec<Account>,
    anonymous: Capability,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let snapshot: DirectorySnapshot = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_snapshot(snapshot)
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Result<Self> {
        let mut dir = Self::new();

        let anonymous = Capability::parse_many(&snapshot.anonymous).ok_or_else(|| {
            Error::Config(format!(
                "unknown anonymous capability in {:?}",
                snapshot.anonymous
            ))
        })?;
        dir.anonymous = anonymous;

        for project in snapshot.projects {
            dir.add_project(project);
        }
        for repo in snapshot.repositories {
            dir.add_repository(repo)?;
        }
        for account in snapshot.accounts {
            dir.add_account(&account)?;
        }

        Ok(dir)
    }

    pub fn add_project(&mut self, project: Project) {
        self.projects.insert(project.id.clone(), project);
    }

    pub fn add_repository(&mut self, repo: Repository) -> Result<()> {
        if !self.projects.contains_key(&repo.project_id) {
            return Err(Error::ProjectNotFound(repo.project_id));
        }
        self.repos_by_project.insert(repo.project_id.clone(), repo);
        Ok(())
    }

    pub fn add_account(&mut self, record: &AccountRecord) -> Result<()> {
        let mut memberships = BTreeMap::new();
        for m in &record.memberships {
            if !self.projects.contains_key(&m.project) {
                return Err(Error::ProjectNotFound(m.project.clone()));
            }
            let caps = Capability::parse_many(&m.capabilities).ok_or_else(|| {
                Error::Config(format!(
                    "unknown capability for '{}' on '{}'",
                    record.login, m.project
                ))
            })?;
            memberships.insert(m.project.clone(), caps);
        }

        self.accounts.push(Account {
            login: record.login.clone(),
            acl_id: record
                .acl_id
                .clone()
                .unwrap_or_else(|| record.login.clone()),
            password_hash: record.password_hash.clone(),
            memberships,
        });
        Ok(())
    }

    pub fn set_anonymous(&mut self, anonymous: Capability) {
        self.anonymous = anonymous;
    }
}

impl Directory for InMemoryDirectory {
    fn project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.projects.get(id).cloned())
    }

    fn projects(&self) -> Result<Vec<Project>> {
        Ok(self.projects.values().cloned().collect())
    }

    fn self_and_descendants(&self, id: &str) -> Result<Vec<Project>> {
        let root = self
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| Error::ProjectNotFound(id.to_string()))?;

        let mut result = vec![root];
        let mut frontier = vec![id.to_string()];
        while let Some(current) = frontier.pop() {
            for project in self.projects.values() {
                if project.parent.as_deref() == Some(current.as_str()) {
                    result.push(project.clone());
                    frontier.push(project.id.clone());
                }
            }
        }
        Ok(result)
    }

    fn repository(&self, project_id: &str) -> Result<Option<Repository>> {
        Ok(self.repos_by_project.get(project_id).cloned())
    }

    fn repository_by_name(&self, name: &str) -> Result<Option<Repository>> {
        Ok(self
            .repos_by_project
            .values()
            .find(|r| r.name == name)
            .cloned())
    }

    fn members(&self, project_id: &str) -> Result<Vec<Principal>> {
        Ok(self
            .accounts
            .iter()
            .filter_map(|a| {
                a.memberships.get(project_id).map(|caps| Principal {
                    login: a.login.clone(),
                    acl_id: a.acl_id.clone(),
                    capabilities: *caps,
                })
            })
            .collect())
    }

    fn anonymous_capability(&self, project: &Project) -> Capability {
        if project.public {
            self.anonymous
        } else {
            Capability::default()
        }
    }

    fn authenticate(&self, login: &str, password: &str) -> Result<Option<Principal>> {
        let Some(account) = self.accounts.iter().find(|a| a.login == login) else {
            return Ok(None);
        };
        let Some(hash) = account.password_hash.as_deref() else {
            return Ok(None);
        };

        let parsed = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("unparseable password hash for '{login}': {e}");
                return Ok(None);
            }
        };

        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            return Ok(None);
        }

        Ok(Some(Principal {
            login: account.login.clone(),
            acl_id: account.acl_id.clone(),
            capabilities: Capability::default(),
        }))
    }
}
