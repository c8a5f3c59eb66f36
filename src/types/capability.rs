use std::fmt;

use serde::{Deserialize, Serialize};

/// Capability represents a bitmask of role-derived permissions a principal
/// holds on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(u32);

impl Capability {
    /// Force-push / repository administration.
    pub const MANAGE_REPOSITORY: Capability = Capability(1 << 0); // 1
    /// Push access.
    pub const COMMIT_ACCESS: Capability = Capability(1 << 1); // 2
    /// Fetch/clone access.
    pub const VIEW_CHANGESETS: Capability = Capability(1 << 2); // 4
    /// Anonymous repository browsing over HTTP.
    pub const BROWSE_REPOSITORY: Capability = Capability(1 << 3); // 8

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this bitmask contains the required capability.
    #[must_use]
    pub const fn has(self, required: Capability) -> bool {
        self.0 & required.0 == required.0
    }

    /// Combines two capability bitmasks.
    #[must_use]
    pub const fn union(self, other: Capability) -> Capability {
        Capability(self.0 | other.0)
    }

    /// Converts a capability string to its bitmask value.
    pub fn parse(s: &str) -> Option<Capability> {
        match s {
            "manage_repository" => Some(Self::MANAGE_REPOSITORY),
            "commit_access" => Some(Self::COMMIT_ACCESS),
            "view_changesets" => Some(Self::VIEW_CHANGESETS),
            "browse_repository" => Some(Self::BROWSE_REPOSITORY),
            _ => None,
        }
    }

    /// Converts a slice of capability strings to a combined bitmask.
    pub fn parse_many<S: AsRef<str>>(strs: &[S]) -> Option<Capability> {
        let mut result = Capability::default();
        for s in strs {
            result = result.union(Self::parse(s.as_ref())?);
        }
        Some(result)
    }

    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        let mut caps = Vec::new();
        if self.has(Self::MANAGE_REPOSITORY) {
            caps.push("manage_repository");
        }
        if self.has(Self::COMMIT_ACCESS) {
            caps.push("commit_access");
        }
        if self.has(Self::VIEW_CHANGESETS) {
            caps.push("view_changesets");
        }
        if self.has(Self::BROWSE_REPOSITORY) {
            caps.push("browse_repository");
        }
        caps
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_strings().join(", "))
    }
}

impl From<u32> for Capability {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<Capability> for u32 {
    fn from(c: Capability) -> Self {
        c.0
    }
}
