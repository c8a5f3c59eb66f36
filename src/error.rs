use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("admin repository error: {0}")]
    Git(#[from] git2::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// A move was interrupted after the old ACL entry was removed but before
    /// the directory reached its new location. Never repaired automatically;
    /// surfaced for operator intervention.
    #[error("move of '{name}' interrupted: no ACL entry, directory still at {}", old_path.display())]
    MoveInterrupted { name: String, old_path: PathBuf },

    #[error("synchronizer unavailable")]
    SynchronizerGone,

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, Error>;
