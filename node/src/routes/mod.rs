pub mod conversations;
pub mod health;
pub mod properties;
pub mod reports;
mod session;

pub use session::{CurrentUser, USER_HEADER};

use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config().max_upload_bytes;
    Router::new()
        .merge(health::routes())
        .merge(properties::routes())
        .merge(conversations::routes())
        .merge(reports::routes())
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}
