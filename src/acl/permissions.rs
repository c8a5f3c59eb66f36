//! Pure computation of ACL permission tiers from project membership.
//!
//! The three tiers are strictly prioritized: a principal lands in exactly one
//! of rewind, write or read, the highest it qualifies for. Sentinel
//! identifiers keep the backing ACL engine from ever seeing a repository with
//! no permission lines, which some engines treat as unrestricted.

use crate::types::{Capability, Principal, Project, Repository};

/// Inserted into the read tier of an active repository with no qualifying
/// members. Matches no real principal; forces an explicit permission line.
pub const DUMMY_KEY: &str = "DUMMY_KEY";

/// Inserted into the read tier of an inactive project with no members left.
pub const CLOSED_PROJECT_KEY: &str = "CLOSED_PROJECT";

/// Magic identifier granting anonymous read over smart HTTP.
pub const ANONYMOUS_HTTP_KEY: &str = "gitweb";

/// Magic identifier granting anonymous read over the git daemon transport.
pub const ANONYMOUS_DAEMON_KEY: &str = "daemon";

/// Permission tiers, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// Force-push and administration ("RW+").
    Rewind,
    /// Push ("RW").
    Write,
    /// Fetch/clone ("R").
    Read,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Rewind, Tier::Write, Tier::Read];

    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Rewind => "RW+",
            Tier::Write => "RW",
            Tier::Read => "R",
        }
    }
}

/// Sorted, deduplicated ACL identifiers per tier. Empty tiers are omitted
/// when iterating; the config writer emits no line for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierSet {
    pub rewind: Vec<String>,
    pub write: Vec<String>,
    pub read: Vec<String>,
}

impl TierSet {
    pub fn is_empty(&self) -> bool {
        self.rewind.is_empty() && self.write.is_empty() && self.read.is_empty()
    }

    fn ids(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::Rewind => &self.rewind,
            Tier::Write => &self.write,
            Tier::Read => &self.read,
        }
    }

    /// Non-empty tiers in privilege order.
    pub fn tiers(&self) -> impl Iterator<Item = (Tier, &[String])> {
        Tier::ALL
            .into_iter()
            .map(|t| (t, self.ids(t)))
            .filter(|(_, ids)| !ids.is_empty())
    }

    /// True if the identifier appears in any tier.
    pub fn contains(&self, acl_id: &str) -> bool {
        Tier::ALL
            .into_iter()
            .any(|t| self.ids(t).iter().any(|id| id == acl_id))
    }

    /// True if the identifier holds push access (write or rewind).
    pub fn can_write(&self, acl_id: &str) -> bool {
        self.rewind.iter().chain(&self.write).any(|id| id == acl_id)
    }

    fn sort_dedup(&mut self) {
        for ids in [&mut self.rewind, &mut self.write, &mut self.read] {
            ids.sort_unstable();
            ids.dedup();
        }
    }
}

/// Computes the permission tiers for a repository from its project's state
/// and membership. Pure; independent of input principal ordering.
///
/// `anonymous` carries the capabilities granted to unauthenticated users on
/// this project (empty for private projects).
pub fn compute(
    repository: &Repository,
    project: &Project,
    principals: &[Principal],
    anonymous: Capability,
) -> TierSet {
    let mut rewind = Vec::new();
    let mut write = Vec::new();
    let mut read = Vec::new();

    // Strict priority: each principal lands in exactly one group.
    for p in principals {
        if p.capabilities.has(Capability::MANAGE_REPOSITORY) {
            rewind.push(p.acl_id.clone());
        } else if p.capabilities.has(Capability::COMMIT_ACCESS) {
            write.push(p.acl_id.clone());
        } else if p.capabilities.has(Capability::VIEW_CHANGESETS) {
            read.push(p.acl_id.clone());
        }
    }

    let mut tiers = if project.active {
        let mut tiers = TierSet {
            rewind,
            write,
            read,
        };

        if tiers.is_empty() {
            tiers.read.push(DUMMY_KEY.to_string());
        }
        if anonymous.has(Capability::BROWSE_REPOSITORY) && repository.http_enabled {
            tiers.read.push(ANONYMOUS_HTTP_KEY.to_string());
        }
        if anonymous.has(Capability::VIEW_CHANGESETS) && repository.daemon_enabled {
            tiers.read.push(ANONYMOUS_DAEMON_KEY.to_string());
        }

        tiers
    } else {
        // No writer keeps write access on an inactive project.
        let mut all_read = rewind;
        all_read.extend(write);
        all_read.extend(read);

        if all_read.is_empty() {
            all_read.push(CLOSED_PROJECT_KEY.to_string());
        }

        TierSet {
            read: all_read,
            ..TierSet::default()
        }
    };

    tiers.sort_dedup();
    tiers
}
