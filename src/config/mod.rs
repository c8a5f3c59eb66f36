//! Runtime settings, loadable from TOML with the same normalization rules
//! the hosting application applies before persisting them.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Root directory holding all bare repositories.
    pub storage_root: PathBuf,
    /// Local git repository the rendered ACL configuration is committed to.
    pub admin_repo_path: PathBuf,
    /// Domain advertised for HTTP clone URLs. Hostname with optional port,
    /// no path component.
    pub http_server_domain: String,
    /// Domain advertised for SSH clone URLs.
    pub ssh_server_domain: String,
    /// Domain advertised for HTTPS clone URLs, when TLS is available.
    pub https_server_domain: Option<String>,
    /// Author/committer address for admin repository commits.
    pub git_config_email: String,
    /// Deny authenticated downloads over plain HTTP.
    pub require_ssl: bool,
    /// Set when the listener itself terminates TLS; otherwise SSL posture
    /// comes from forwarded-proto headers.
    pub tls: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            storage_root: PathBuf::from("./data/repositories"),
            admin_repo_path: PathBuf::from("./data/admin"),
            http_server_domain: "localhost:8080".to_string(),
            ssh_server_domain: "localhost".to_string(),
            https_server_domain: None,
            git_config_email: "gitwarden@localhost".to_string(),
            require_ssl: false,
            tls: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        settings.normalize()?;
        Ok(settings)
    }

    /// Validates and normalizes the loaded values.
    pub fn normalize(&mut self) -> Result<()> {
        self.http_server_domain = normalize_domain(&self.http_server_domain)?;
        self.ssh_server_domain = normalize_domain(&self.ssh_server_domain)?;
        if let Some(domain) = &self.https_server_domain {
            self.https_server_domain = Some(normalize_domain(domain)?);
        }

        if self.port == 0 {
            return Err(Error::Config("port must be between 1 and 65535".into()));
        }

        validate_email(&self.git_config_email)?;

        if self.storage_root.as_os_str().is_empty() {
            return Err(Error::Config("storage_root must not be empty".into()));
        }
        if self.admin_repo_path.as_os_str().is_empty() {
            return Err(Error::Config("admin_repo_path must not be empty".into()));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address: {e}")))
    }
}

/// Strips whitespace and any path component, then validates the remainder
/// as `label(.label)*(:port)?` with alphanumeric/hyphen labels.
fn normalize_domain(domain: &str) -> Result<String> {
    let trimmed = domain.trim();
    let host = trimmed.split('/').next().unwrap_or_default();

    if host.is_empty() {
        return Err(Error::Config("server domain must not be empty".into()));
    }

    let (name, port) = match host.rsplit_once(':') {
        Some((name, port)) => (name, Some(port)),
        None => (host, None),
    };

    if let Some(port) = port {
        let valid = matches!(port.parse::<u32>(), Ok(p) if (1..=65535).contains(&p));
        if !valid {
            return Err(Error::Config(format!("invalid port in server domain '{host}'")));
        }
    }

    let labels_ok = !name.is_empty()
        && name.split('.').all(|label| {
            !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if !labels_ok {
        return Err(Error::Config(format!("invalid server domain '{host}'")));
    }

    Ok(host.to_string())
}

fn validate_email(email: &str) -> Result<()> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(Error::Config(format!("invalid git author address '{email}'")));
    };

    let domain_ok = domain.split('.').all(|label| {
        !label.is_empty() && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    if local.is_empty() || local.contains(char::is_whitespace) || !domain_ok {
        return Err(Error::Config(format!("invalid git author address '{email}'")));
    }
    Ok(())
}
