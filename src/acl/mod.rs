mod admin;
mod config;
pub mod permissions;

pub use admin::{AdminRepo, CONFIG_FILE};
pub use config::{AclConfig, RepoEntry};
pub use permissions::{Tier, TierSet};
