use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{profile, sync};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    let cors = build_localhost_cors(state.api_port);
    Router::new()
        .route("/api/health", get(|| async { "ok" }))
        .route("/api/profile/{user_id}", put(profile::upsert_profile))
        .route(
            "/api/profile/{user_id}/personas/{persona_type}",
            put(profile::set_persona),
        )
        .route("/api/profile/{user_id}/photos", post(profile::add_photo))
        .route("/api/sync/{user_id}", post(sync::trigger_sync))
        .route("/api/sync/{user_id}/status", get(sync::get_status))
        .route("/api/sync/{user_id}/jobs", get(sync::list_jobs))
        .route("/api/sync/{user_id}/jobs/{job_id}", get(sync::get_job))
        .route(
            "/api/sync/{user_id}/jobs/{job_id}/retry",
            post(sync::retry_job),
        )
        .route("/api/sync/{user_id}/events", get(sync::sse_progress))
        .route("/api/logs", get(sync::sse_logs))
        .layer(cors)
        .with_state(state)
}
