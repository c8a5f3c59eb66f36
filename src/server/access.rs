//! Access-policy checks backing the gate's decision table. Permissions are
//! recomputed from current membership on every call; a capability revoked
//! mid-session takes effect on the very next request.

use crate::acl::permissions;
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::types::{Principal, Repository};

/// May this principal fetch/clone the repository? Public active projects are
/// readable by any principal, member or not. Downloads of protected
/// repositories over plain HTTP are refused when the deployment requires
/// SSL. Members of inactive projects keep read access through the collapsed
/// read tier.
pub fn download_access_check(
    directory: &dyn Directory,
    principal: &Principal,
    repository: &Repository,
    is_secure: bool,
    require_ssl: bool,
) -> Result<bool> {
    let project = directory
        .project(&repository.project_id)?
        .ok_or_else(|| Error::ProjectNotFound(repository.project_id.clone()))?;

    if project.active && project.public {
        return Ok(true);
    }

    if require_ssl && !is_secure {
        return Ok(false);
    }

    let tiers = compute_tiers(directory, repository)?;
    Ok(tiers.contains(&principal.acl_id))
}

/// May this principal push to the repository? Requires an active project and
/// membership in the write or rewind tier.
pub fn upload_access_check(
    directory: &dyn Directory,
    principal: &Principal,
    repository: &Repository,
) -> Result<bool> {
    let project = directory
        .project(&repository.project_id)?
        .ok_or_else(|| Error::ProjectNotFound(repository.project_id.clone()))?;

    if !project.active {
        return Ok(false);
    }

    let tiers = compute_tiers(directory, repository)?;
    Ok(tiers.can_write(&principal.acl_id))
}

fn compute_tiers(
    directory: &dyn Directory,
    repository: &Repository,
) -> Result<permissions::TierSet> {
    let project = directory
        .project(&repository.project_id)?
        .ok_or_else(|| Error::ProjectNotFound(repository.project_id.clone()))?;
    let members = directory.members(&project.id)?;
    let anonymous = directory.anonymous_capability(&project);

    Ok(permissions::compute(repository, &project, &members, anonymous))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{AccountRecord, InMemoryDirectory, MembershipRecord};
    use crate::types::{Capability, Project};

    fn fixture(active: bool, public: bool) -> (InMemoryDirectory, Repository) {
        let mut dir = InMemoryDirectory::new();
        dir.add_project(Project {
            id: "backend".into(),
            name: "Backend".into(),
            active,
            public,
            parent: None,
        });
        dir.add_account(&AccountRecord {
            login: "alice".into(),
            acl_id: None,
            password_hash: None,
            memberships: vec![MembershipRecord {
                project: "backend".into(),
                capabilities: vec!["commit_access".into()],
            }],
        })
        .unwrap();
        dir.add_account(&AccountRecord {
            login: "bob".into(),
            acl_id: None,
            password_hash: None,
            memberships: vec![MembershipRecord {
                project: "backend".into(),
                capabilities: vec!["view_changesets".into()],
            }],
        })
        .unwrap();

        let repo = Repository {
            name: "backend".into(),
            url: "backend.git".into(),
            project_id: "backend".into(),
            http_enabled: false,
            daemon_enabled: false,
            config_keys: Vec::new(),
        };
        (dir, repo)
    }

    fn principal(acl_id: &str) -> Principal {
        Principal {
            login: acl_id.into(),
            acl_id: acl_id.into(),
            capabilities: Capability::default(),
        }
    }

    #[test]
    fn test_download_of_private_project_requires_membership() {
        let (dir, repo) = fixture(true, false);
        assert!(download_access_check(&dir, &principal("alice"), &repo, false, false).unwrap());
        assert!(download_access_check(&dir, &principal("bob"), &repo, false, false).unwrap());
        assert!(!download_access_check(&dir, &principal("mallory"), &repo, false, false).unwrap());
    }

    #[test]
    fn test_download_of_public_project_is_open_to_any_principal() {
        let (dir, repo) = fixture(true, true);
        assert!(download_access_check(&dir, &principal("mallory"), &repo, false, false).unwrap());
        // Public does not bypass the write checks.
        assert!(!upload_access_check(&dir, &principal("mallory"), &repo).unwrap());
    }

    #[test]
    fn test_download_respects_ssl_requirement() {
        let (dir, repo) = fixture(true, false);
        assert!(!download_access_check(&dir, &principal("alice"), &repo, false, true).unwrap());
        assert!(download_access_check(&dir, &principal("alice"), &repo, true, true).unwrap());
    }

    #[test]
    fn test_inactive_project_keeps_member_reads_only() {
        let (dir, repo) = fixture(false, false);
        assert!(download_access_check(&dir, &principal("alice"), &repo, false, false).unwrap());
        assert!(!upload_access_check(&dir, &principal("alice"), &repo).unwrap());
    }

    #[test]
    fn test_inactive_public_project_still_requires_membership() {
        let (dir, repo) = fixture(false, true);
        assert!(download_access_check(&dir, &principal("alice"), &repo, false, false).unwrap());
        assert!(!download_access_check(&dir, &principal("mallory"), &repo, false, false).unwrap());
    }

    #[test]
    fn test_upload_requires_write_tier() {
        let (dir, repo) = fixture(true, false);
        assert!(upload_access_check(&dir, &principal("alice"), &repo).unwrap());
        assert!(!upload_access_check(&dir, &principal("bob"), &repo).unwrap());
    }
}
