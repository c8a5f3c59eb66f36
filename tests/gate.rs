use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tower::util::ServiceExt;

use gitwarden::config::Settings;
use gitwarden::directory::{AccountRecord, InMemoryDirectory, MembershipRecord};
use gitwarden::server::{AppState, create_router};
use gitwarden::types::{Capability, Project, Repository};

struct TestGate {
    _storage: tempfile::TempDir,
    router: Router,
}

fn hash_password(password: &str) -> String {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);
    argon2::Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("hash password")
        .to_string()
}

fn project(id: &str, public: bool) -> Project {
    Project {
        id: id.into(),
        name: id.into(),
        active: true,
        public,
        parent: None,
    }
}

fn repository(name: &str, project_id: &str) -> Repository {
    Repository {
        name: name.into(),
        url: format!("{name}.git"),
        project_id: project_id.into(),
        http_enabled: true,
        daemon_enabled: false,
        config_keys: Vec::new(),
    }
}

fn member(login: &str, project_id: &str, caps: &[&str], password: Option<&str>) -> AccountRecord {
    AccountRecord {
        login: login.into(),
        acl_id: None,
        password_hash: password.map(hash_password),
        memberships: vec![MembershipRecord {
            project: project_id.into(),
            capabilities: caps.iter().map(|s| s.to_string()).collect(),
        }],
    }
}

fn test_gate(require_ssl: bool) -> TestGate {
    let storage = tempfile::tempdir().expect("create storage root");

    let mut directory = InMemoryDirectory::new();
    directory.set_anonymous(Capability::VIEW_CHANGESETS.union(Capability::BROWSE_REPOSITORY));

    directory.add_project(project("pub", true));
    directory.add_project(project("priv", false));
    directory
        .add_repository(repository("pub-app", "pub"))
        .unwrap();
    directory
        .add_repository(repository("priv-app", "priv"))
        .unwrap();

    directory
        .add_account(&member(
            "alice",
            "priv",
            &["commit_access", "view_changesets"],
            Some("alice-pw"),
        ))
        .unwrap();
    directory
        .add_account(&member(
            "bob",
            "priv",
            &["view_changesets"],
            Some("bob-pw"),
        ))
        .unwrap();

    // Materialize the bare repositories the gate will serve.
    for name in ["pub-app", "priv-app"] {
        git2::Repository::init_bare(storage.path().join(format!("{name}.git")))
            .expect("init bare repo");
    }

    let settings = Settings {
        storage_root: storage.path().to_path_buf(),
        require_ssl,
        ..Settings::default()
    };

    let state = Arc::new(AppState::new(Arc::new(directory), settings));
    TestGate {
        _storage: storage,
        router: create_router(state),
    }
}

fn basic_auth(login: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{login}:{password}")))
}

async fn send(gate: &TestGate, request: Request<Body>) -> axum::response::Response {
    gate.router.clone().oneshot(request).await.expect("route request")
}

#[tokio::test]
async fn anonymous_clone_of_public_repository_is_allowed() {
    let gate = test_gate(false);

    let response = send(
        &gate,
        Request::get("/pub-app.git/info/refs?service=git-upload-pack")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("Content-Type").unwrap(),
        "application/x-git-upload-pack-advertisement"
    );
}

#[tokio::test]
async fn anonymous_clone_of_private_repository_gets_basic_challenge() {
    let gate = test_gate(false);

    let response = send(
        &gate,
        Request::get("/priv-app.git/info/refs?service=git-upload-pack")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers().get("WWW-Authenticate").unwrap();
    assert!(challenge.to_str().unwrap().starts_with("Basic"));
}

#[tokio::test]
async fn authenticated_non_member_can_clone_public_repository() {
    let gate = test_gate(false);

    // Alice is a member of "priv" only; the public project is still open to
    // her authenticated fetch.
    let response = send(
        &gate,
        Request::get("/pub-app.git/info/refs?service=git-upload-pack")
            .header(header::AUTHORIZATION, basic_auth("alice", "alice-pw"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn member_can_fetch_private_repository() {
    let gate = test_gate(false);

    let response = send(
        &gate,
        Request::get("/priv-app.git/info/refs?service=git-upload-pack")
            .header(header::AUTHORIZATION, basic_auth("alice", "alice-pw"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn authenticated_push_without_write_capability_is_denied() {
    let gate = test_gate(false);

    // Bob resolves to a known principal but only holds view_changesets.
    let response = send(
        &gate,
        Request::post("/priv-app.git/git-receive-pack")
            .header(header::AUTHORIZATION, basic_auth("bob", "bob-pw"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_push_is_denied_even_on_public_projects() {
    let gate = test_gate(false);

    let response = send(
        &gate,
        Request::post("/pub-app.git/git-receive-pack")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn path_without_git_suffix_is_not_found() {
    let gate = test_gate(false);

    let response = send(
        &gate,
        Request::get("/priv-app/info/refs?service=git-upload-pack")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_repository_is_not_found() {
    let gate = test_gate(false);

    let response = send(
        &gate,
        Request::get("/ghost.git/info/refs?service=git-upload-pack")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_authorization_scheme_is_bad_request() {
    let gate = test_gate(false);

    let response = send(
        &gate,
        Request::get("/pub-app.git/info/refs?service=git-upload-pack")
            .header(header::AUTHORIZATION, "Bearer not-basic")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unclassifiable_method_is_denied() {
    let gate = test_gate(false);

    let response = send(
        &gate,
        Request::builder()
            .method("PUT")
            .uri("/pub-app.git/info/refs?service=git-upload-pack")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ssl_requirement_honors_forwarded_proto() {
    let gate = test_gate(true);

    let plain = send(
        &gate,
        Request::get("/priv-app.git/info/refs?service=git-upload-pack")
            .header(header::AUTHORIZATION, basic_auth("alice", "alice-pw"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(plain.status(), StatusCode::UNAUTHORIZED);

    let proxied = send(
        &gate,
        Request::get("/priv-app.git/info/refs?service=git-upload-pack")
            .header(header::AUTHORIZATION, basic_auth("alice", "alice-pw"))
            .header("X-Forwarded-Proto", "https")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(proxied.status(), StatusCode::OK);
}
