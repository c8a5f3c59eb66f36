//! Read-only view of the project/membership model this crate synchronizes
//! against. The owning application is the source of truth; this crate only
//! ever reads committed state through the [`Directory`] trait.

mod memory;

pub use memory::{AccountRecord, DirectorySnapshot, InMemoryDirectory, MembershipRecord};

use crate::error::Result;
use crate::types::{Capability, Principal, Project, Repository};

/// Project/membership read model.
pub trait Directory: Send + Sync {
    fn project(&self, id: &str) -> Result<Option<Project>>;

    /// All projects, in a stable order.
    fn projects(&self) -> Result<Vec<Project>>;

    /// The project and every project nested under it, parents before
    /// children.
    fn self_and_descendants(&self, id: &str) -> Result<Vec<Project>>;

    /// The project's repository, if version control is enabled for it.
    fn repository(&self, project_id: &str) -> Result<Option<Repository>>;

    /// Lookup by canonical repository name (slug path without `.git`).
    fn repository_by_name(&self, name: &str) -> Result<Option<Repository>>;

    /// Member principals of a project, with their capabilities on it.
    fn members(&self, project_id: &str) -> Result<Vec<Principal>>;

    /// Capabilities granted to unauthenticated users on this project. Empty
    /// for private projects.
    fn anonymous_capability(&self, project: &Project) -> Capability;

    /// Resolves HTTP Basic credentials to a principal. The returned
    /// principal carries identity only; per-project capabilities come from
    /// [`Directory::members`].
    fn authenticate(&self, login: &str, password: &str) -> Result<Option<Principal>>;
}
