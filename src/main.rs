use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gitwarden::acl::AdminRepo;
use gitwarden::config::Settings;
use gitwarden::directory::InMemoryDirectory;
use gitwarden::server::{AppState, create_router};
use gitwarden::sync::Synchronizer;

#[derive(Parser)]
#[command(name = "gitwarden")]
#[command(about = "Git repository ACL synchronizer and access gate", long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize all repositories, then serve the Git HTTP entry point
    Serve {
        /// Directory snapshot (projects, repositories, accounts) to serve from
        #[arg(long)]
        directory: PathBuf,

        /// Host to bind to (overrides the settings file)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides the settings file)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Replay a full synchronization and exit
    Resync {
        /// Directory snapshot to synchronize against
        #[arg(long)]
        directory: PathBuf,

        /// Also redistribute permissions for every principal
        #[arg(long)]
        principals: bool,
    },

    /// Hash a password for use in a directory snapshot
    HashPassword { password: String },
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => Ok(Settings::load(path)?),
        None => {
            let mut settings = Settings::default();
            settings.normalize()?;
            Ok(settings)
        }
    }
}

fn build_synchronizer(
    settings: &Settings,
    directory: Arc<InMemoryDirectory>,
) -> anyhow::Result<Synchronizer> {
    std::fs::create_dir_all(&settings.storage_root)?;
    let admin = AdminRepo::open_or_init(&settings.admin_repo_path, &settings.git_config_email)?;
    Ok(Synchronizer::new(
        admin,
        directory,
        &settings.storage_root,
    ))
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);
    match argon2::Argon2::default().hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(e) => bail!("failed to hash password: {e}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gitwarden=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve {
            directory,
            host,
            port,
        } => {
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }

            let directory = Arc::new(InMemoryDirectory::load(&directory)?);

            let sync = build_synchronizer(&settings, directory.clone())?.spawn();
            sync.dispatch(gitwarden::sync::SyncAction::ResyncAllProjects)?;

            let state = Arc::new(AppState::new(directory, settings.clone()));
            let app = create_router(state);
            let addr = settings.socket_addr()?;

            info!("Starting server on {}", addr);

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;

            drop(sync);
        }

        Commands::Resync {
            directory,
            principals,
        } => {
            let directory = Arc::new(InMemoryDirectory::load(&directory)?);
            let mut sync = build_synchronizer(&settings, directory)?;

            sync.resync_all_projects()?;
            if principals {
                sync.resync_all_principals()?;
            }

            info!("resynchronization complete");
        }

        Commands::HashPassword { password } => {
            println!("{}", hash_password(&password)?);
        }
    }

    Ok(())
}
