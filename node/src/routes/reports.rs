use crate::error::{ServiceError, ServiceResult};
use crate::fraud::{ReportId, ReportRecord, ReportTarget};
use crate::routes::CurrentUser;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use hamrokotha_fraud_core::{ReportReason, ReportStatus};
use hamrokotha_messaging::{ConversationId, PropertyId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/properties/:id/reports",
            get(listing_reports).post(report_listing),
        )
        .route("/users/:id/reports", post(report_user))
        .route("/conversations/:id/reports", post(report_conversation))
        .route("/reports", get(report_queue))
        .route("/reports/:id", get(get_report))
        .route("/reports/:id/review", post(review_report))
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub reason: ReportReason,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub success: bool,
    pub report: ReportRecord,
}

#[derive(Debug, Serialize)]
pub struct ReportsResponse {
    pub reports: Vec<ReportRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueParams {
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: ReportStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

async fn report_listing(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<PropertyId>,
    Json(request): Json<ReportRequest>,
) -> ServiceResult<(StatusCode, Json<ReportResponse>)> {
    let property = state
        .storage()
        .property(id)?
        .ok_or(ServiceError::NotFound("property"))?;
    if !property.is_visible_to(Some(user), state.is_moderator(user)) {
        return Err(ServiceError::NotFound("property"));
    }
    file(&state, user, ReportTarget::Property(id), request)
}

async fn report_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<UserId>,
    Json(request): Json<ReportRequest>,
) -> ServiceResult<(StatusCode, Json<ReportResponse>)> {
    file(&state, user, ReportTarget::User(id), request)
}

async fn report_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ConversationId>,
    Json(request): Json<ReportRequest>,
) -> ServiceResult<(StatusCode, Json<ReportResponse>)> {
    file(&state, user, ReportTarget::Conversation(id), request)
}

fn file(
    state: &AppState,
    reporter: UserId,
    target: ReportTarget,
    request: ReportRequest,
) -> ServiceResult<(StatusCode, Json<ReportResponse>)> {
    let report = state
        .reports()
        .file_report(reporter, target, request.reason, &request.description)?;
    Ok((
        StatusCode::CREATED,
        Json(ReportResponse {
            success: true,
            report,
        }),
    ))
}

/// Reports against a listing, for its owner and moderators.
async fn listing_reports(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<PropertyId>,
) -> ServiceResult<Json<ReportsResponse>> {
    let property = state
        .storage()
        .property(id)?
        .ok_or(ServiceError::NotFound("property"))?;
    if property.owner != user && !state.is_moderator(user) {
        return Err(ServiceError::Forbidden(
            "only the listing owner can see its reports",
        ));
    }
    let reports = state.reports().reports_for(ReportTarget::Property(id))?;
    Ok(Json(ReportsResponse { reports }))
}

async fn report_queue(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<QueueParams>,
) -> ServiceResult<Json<ReportsResponse>> {
    require_moderator(&state, user)?;
    let reports = state.reports().queue(params.status)?;
    Ok(Json(ReportsResponse { reports }))
}

/// A single report, for the user who filed it and moderators.
async fn get_report(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ReportId>,
) -> ServiceResult<Json<ReportRecord>> {
    let report = state.reports().report(id)?;
    if report.reported_by != user && !state.is_moderator(user) {
        return Err(ServiceError::NotFound("report"));
    }
    Ok(Json(report))
}

async fn review_report(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ReportId>,
    Json(request): Json<ReviewRequest>,
) -> ServiceResult<Json<ReportResponse>> {
    require_moderator(&state, user)?;
    let report = state
        .reports()
        .review(id, user, request.status, request.notes.as_deref())?;
    Ok(Json(ReportResponse {
        success: true,
        report,
    }))
}

fn require_moderator(state: &AppState, user: UserId) -> ServiceResult<()> {
    if state.is_moderator(user) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("moderator access required"))
    }
}
