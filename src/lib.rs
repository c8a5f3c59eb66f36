//! # Gitwarden
//!
//! Keeps a fleet of bare Git repositories and their ACL configuration
//! synchronized with a project/membership model, and gates every inbound
//! Git-over-HTTP request against that model. Usable both as a standalone
//! binary and as a library embedded in a larger hosting application.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! gitwarden = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gitwarden::acl::AdminRepo;
//! use gitwarden::config::Settings;
//! use gitwarden::directory::InMemoryDirectory;
//! use gitwarden::server::{AppState, create_router};
//! use gitwarden::sync::{SyncAction, Synchronizer};
//!
//! let settings = Settings::default();
//! let directory = Arc::new(InMemoryDirectory::new());
//!
//! let admin = AdminRepo::open_or_init(&settings.admin_repo_path, &settings.git_config_email)?;
//! let sync = Synchronizer::new(admin, directory.clone(), &settings.storage_root).spawn();
//! sync.dispatch(SyncAction::ResyncAllProjects)?;
//!
//! let router = create_router(Arc::new(AppState::new(directory, settings)));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the CLI binary. Disable with
//!   `default-features = false`.

pub mod acl;
pub mod config;
pub mod directory;
pub mod error;
pub mod server;
pub mod sync;
pub mod types;
