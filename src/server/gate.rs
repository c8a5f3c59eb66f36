//! The access gate: every Git-over-HTTP request is classified into a
//! protocol operation and allowed or denied from project visibility and
//! live-computed permissions, then handed to the smart-HTTP plumbing.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use super::access;
use super::git::{self, GitService};
use super::router::AppState;
use crate::types::{Project, Repository};

/// Extracts the repository name from a URL path: one or more segments ending
/// in a segment with the `.git` suffix. Anything else is not a repository
/// URL.
pub fn repository_name_from_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let end = segments.iter().position(|s| {
        s.strip_suffix(".git").is_some_and(|stem| !stem.is_empty())
    })?;

    let mut name = segments[..=end].join("/");
    name.truncate(name.len() - ".git".len());
    Some(name)
}

/// Names the requested Git service: the `service` query parameter for reads,
/// the final path segment for writes. Other methods are unclassifiable.
fn requested_service<'a>(method: &Method, query: Option<&'a str>, path: &'a str) -> Option<&'a str> {
    match *method {
        Method::GET => query_param(query?, "service"),
        Method::POST => path.rsplit('/').find(|s| !s.is_empty()),
        _ => None,
    }
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Any one positive signal counts as secure, so a reverse proxy terminating
/// TLS in front of a plain-HTTP listener is recognized.
pub fn request_is_secure(headers: &HeaderMap, native_tls: bool) -> bool {
    native_tls
        || std::env::var("HTTPS").is_ok_and(|v| v == "on")
        || header_eq(headers, "x-forwarded-proto", "https")
        || header_eq(headers, "x-forwarded-ssl", "on")
}

fn header_eq(headers: &HeaderMap, name: &str, expected: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case(expected))
}

/// HTTP Basic credentials, or None when the header is absent. A present but
/// malformed header is an error the caller turns into a 400.
fn parse_basic_credentials(
    headers: &HeaderMap,
) -> std::result::Result<Option<(String, String)>, ()> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| ())?;
    let encoded = value.strip_prefix("Basic ").ok_or(())?;
    let decoded = BASE64.decode(encoded.trim()).map_err(|_| ())?;
    let decoded = String::from_utf8(decoded).map_err(|_| ())?;
    let (login, password) = decoded.split_once(':').ok_or(())?;

    Ok(Some((login.to_string(), password.to_string())))
}

fn not_found() -> Response {
    // Deliberately does not reveal how close the path came to matching.
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

/// Basic challenge rather than a bare 403, so git clients re-prompt for
/// credentials.
fn unauthorized() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    response.headers_mut().insert(
        "WWW-Authenticate",
        "Basic realm=\"gitwarden\"".parse().unwrap(),
    );
    response
}

/// Catch-all handler for every method and path under the git entry point.
pub async fn handle(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let Some(repo_name) = repository_name_from_path(&path) else {
        return not_found();
    };

    let (repository, project) = match lookup_repository(&state, &repo_name) {
        Ok(Some(found)) => found,
        Ok(None) => return not_found(),
        Err(response) => return response,
    };

    let credentials = match parse_basic_credentials(&parts.headers) {
        Ok(credentials) => credentials,
        Err(()) => return bad_request(),
    };

    let principal = match credentials {
        Some((login, password)) => {
            match state.directory.authenticate(&login, &password) {
                Ok(principal) => {
                    if principal.is_none() {
                        debug!("credentials for '{login}' did not resolve to a principal");
                    }
                    principal
                }
                Err(e) => {
                    warn!("credential resolution failed: {e}");
                    return internal_error();
                }
            }
        }
        None => None,
    };

    // Neither download nor upload, or an unclassifiable method: denied.
    let Some(service) = requested_service(&parts.method, parts.uri.query(), &path)
        .and_then(GitService::from_str)
    else {
        return unauthorized();
    };

    let is_secure = request_is_secure(&parts.headers, state.settings.tls);

    let allowed = if !service.is_upload() {
        // clone/fetch
        match &principal {
            Some(principal) => {
                match access::download_access_check(
                    state.directory.as_ref(),
                    principal,
                    &repository,
                    is_secure,
                    state.settings.require_ssl,
                ) {
                    Ok(allowed) => allowed,
                    Err(e) => {
                        warn!("download access check failed: {e}");
                        return internal_error();
                    }
                }
            }
            None => project.public,
        }
    } else {
        // push
        match &principal {
            Some(principal) => {
                match access::upload_access_check(state.directory.as_ref(), principal, &repository)
                {
                    Ok(allowed) => allowed,
                    Err(e) => {
                        warn!("upload access check failed: {e}");
                        return internal_error();
                    }
                }
            }
            None => false,
        }
    };

    if !allowed {
        return unauthorized();
    }

    if let Some(principal) = &principal {
        debug!("request bound to principal '{}'", principal.login);
    }

    // The gate said yes; the rest is plain smart-HTTP serving.
    serve_git(&state, &repository, service, &parts.method, &path, &parts.headers, body).await
}

fn lookup_repository(
    state: &AppState,
    name: &str,
) -> std::result::Result<Option<(Repository, Project)>, Response> {
    let repository = match state.directory.repository_by_name(name) {
        Ok(Some(repository)) => repository,
        Ok(None) => return Ok(None),
        Err(e) => {
            warn!("repository lookup failed: {e}");
            return Err(internal_error());
        }
    };

    match state.directory.project(&repository.project_id) {
        Ok(Some(project)) => Ok(Some((repository, project))),
        Ok(None) => Ok(None),
        Err(e) => {
            warn!("project lookup failed: {e}");
            Err(internal_error())
        }
    }
}

async fn serve_git(
    state: &AppState,
    repository: &Repository,
    service: GitService,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    let disk_path = repository.recorded_path(&state.settings.storage_root);
    if !disk_path.is_dir() {
        // Registered but never materialized on disk.
        return not_found();
    }

    match *method {
        Method::GET if path.ends_with("/info/refs") => {
            git::advertise_refs(&disk_path, service).await
        }
        Method::POST if path.ends_with(service.command_name()) => {
            let body = match axum::body::to_bytes(body, usize::MAX).await {
                Ok(bytes) => bytes,
                Err(_) => return bad_request(),
            };
            git::service_rpc(&disk_path, service, headers, body).await
        }
        _ => not_found(),
    }
}
