use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::Capability;

/// A project owning zero-or-one repository. Read-only input to this crate;
/// the owning application maintains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Stable identifier slug, e.g. "backend".
    pub id: String,
    pub name: String,
    /// Archived/disabled projects keep read access for members but lose all
    /// write access.
    pub active: bool,
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// A bare Git repository registered for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Canonical slug path, slash-separated for subprojects, without the
    /// `.git` suffix (e.g. "platform/backend").
    pub name: String,
    /// Recorded on-disk location relative to the storage root, including the
    /// `.git` suffix. After the owning project is relocated this still points
    /// at the old location until the repository has been moved.
    pub url: String,
    pub project_id: String,
    /// Smart-HTTP access enabled for this repository.
    #[serde(default)]
    pub http_enabled: bool,
    /// Git daemon transport enabled for this repository.
    #[serde(default)]
    pub daemon_enabled: bool,
    /// Repository-specific git config keys copied verbatim into the ACL entry.
    #[serde(default)]
    pub config_keys: Vec<(String, String)>,
}

impl Repository {
    /// Relative path the repository should live at, derived from its
    /// canonical name.
    #[must_use]
    pub fn canonical_url(&self) -> String {
        format!("{}.git", self.name)
    }

    /// Absolute path under the storage root matching the canonical name.
    #[must_use]
    pub fn canonical_path(&self, storage_root: &Path) -> PathBuf {
        storage_root.join(self.canonical_url())
    }

    /// Absolute path under the storage root matching the recorded (possibly
    /// stale) location.
    #[must_use]
    pub fn recorded_path(&self, storage_root: &Path) -> PathBuf {
        storage_root.join(&self.url)
    }

    /// True when the recorded location no longer matches the canonical name,
    /// i.e. the owning project was renamed or re-parented and the repository
    /// still has to be moved.
    #[must_use]
    pub fn needs_move(&self) -> bool {
        self.url != self.canonical_url()
    }
}

/// A user or deploy key as seen by the permission model: a unique ACL
/// identifier plus the capabilities the principal holds on one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub login: String,
    /// Identifier emitted into ACL permission tiers.
    pub acl_id: String,
    pub capabilities: Capability,
}
