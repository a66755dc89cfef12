use crate::config::SiteSettings;
use crate::state::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    build_id: String,
    site_name: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/site", get(site_settings))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        build_id: state.build_id().to_string(),
        site_name: state.config().site.site_name.clone(),
    })
}

async fn site_settings(State(state): State<Arc<AppState>>) -> Json<SiteSettings> {
    Json(state.config().site.clone())
}
