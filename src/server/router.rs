use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::gate;
use crate::config::Settings;
use crate::directory::Directory;

pub struct AppState {
    pub directory: Arc<dyn Directory>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(directory: Arc<dyn Directory>, settings: Settings) -> Self {
        Self {
            directory,
            settings,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

/// One entry point accepting all methods and paths; everything except the
/// health probe flows through the access gate.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(gate::handle)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
