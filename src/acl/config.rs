//! In-memory ACL configuration: one entry per repository, each carrying git
//! config keys and up to three permission-tier blocks.

use std::collections::BTreeMap;

use super::permissions::TierSet;

/// One repository's entry in the ACL configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoEntry {
    name: String,
    config: BTreeMap<String, String>,
    permissions: TierSet,
}

impl RepoEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_config_key(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    pub fn config_key(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn set_permissions(&mut self, permissions: TierSet) {
        self.permissions = permissions;
    }

    pub fn permissions(&self) -> &TierSet {
        &self.permissions
    }

    fn render(&self, out: &mut String) {
        out.push_str("repo ");
        out.push_str(&self.name);
        out.push('\n');
        for (key, value) in &self.config {
            out.push_str(&format!("    config {key} = \"{value}\"\n"));
        }
        for (tier, ids) in self.permissions.tiers() {
            out.push_str(&format!("    {} = {}\n", tier.as_str(), ids.join(" ")));
        }
    }
}

/// The authoritative repository-name → entry mapping. Exclusively owned by
/// the synchronizer while an action executes.
#[derive(Debug, Clone, Default)]
pub struct AclConfig {
    repos: BTreeMap<String, RepoEntry>,
}

impl AclConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repo(&self, name: &str) -> Option<&RepoEntry> {
        self.repos.get(name)
    }

    pub fn repo_mut(&mut self, name: &str) -> Option<&mut RepoEntry> {
        self.repos.get_mut(name)
    }

    pub fn add_repo(&mut self, entry: RepoEntry) {
        self.repos.insert(entry.name().to_string(), entry);
    }

    /// Removes and returns the entry, if present.
    pub fn rm_repo(&mut self, name: &str) -> Option<RepoEntry> {
        self.repos.remove(name)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepoEntry> {
        self.repos.values()
    }

    /// Renders the whole configuration as deterministic, diffable conf text:
    /// repositories, config keys and identifiers all sorted.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.repos.values().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            entry.render(&mut out);
        }
        out
    }
}
