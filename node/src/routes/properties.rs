use crate::error::{ServiceError, ServiceResult};
use crate::listings::{primary_image, ImageId, ImageRecord, ImageUpload, PropertyRecord};
use crate::media::content_type;
use crate::routes::CurrentUser;
use crate::state::AppState;
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use hamrokotha_messaging::{Conversation, PropertyId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/properties", post(create_property))
        .route("/properties/:id", get(get_property).delete(delete_property))
        .route("/properties/:id/approve", post(approve_property))
        .route("/properties/:id/reject", post(reject_property))
        .route("/properties/:id/images", get(list_images).post(upload_image))
        .route(
            "/properties/:id/images/:image_id/primary",
            put(set_primary_image),
        )
        .route("/properties/:id/inquiries", post(open_inquiry))
        .route("/images/:image_id", get(image_content))
}

#[derive(Debug, Deserialize)]
pub struct CreatePropertyRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct PropertyResponse {
    pub property: PropertyRecord,
    pub primary_image: Option<ImageRecord>,
}

#[derive(Debug, Serialize)]
pub struct ImagesResponse {
    pub images: Vec<ImageRecord>,
    pub primary_image: Option<ImageRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub file_name: Option<String>,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub order: u16,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InquiryRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InquiryResponse {
    pub success: bool,
    pub created: bool,
    pub conversation: Conversation,
}

async fn create_property(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Json(request): Json<CreatePropertyRequest>,
) -> ServiceResult<(StatusCode, Json<PropertyRecord>)> {
    let title = request.title.trim();
    if title.is_empty() {
        return Err(ServiceError::BadRequest("title cannot be empty".into()));
    }
    let mut property = PropertyRecord::new(owner, title);
    if state.config().site.property_approval_required {
        property = property.awaiting_approval();
    }
    state.storage().insert_property(&property)?;
    info!(property = %property.id, %owner, status = ?property.status, "property listed");
    Ok((StatusCode::CREATED, Json(property)))
}

async fn get_property(
    State(state): State<Arc<AppState>>,
    user: Option<CurrentUser>,
    Path(id): Path<PropertyId>,
) -> ServiceResult<Json<PropertyResponse>> {
    let property = load_visible_property(&state, id, user)?;
    let images = state.detector().images(id)?;
    Ok(Json(PropertyResponse {
        property,
        primary_image: primary_image(&images).cloned(),
    }))
}

async fn delete_property(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<PropertyId>,
) -> ServiceResult<StatusCode> {
    let property = load_property(&state, id)?;
    if property.owner != user && !state.is_moderator(user) {
        return Err(ServiceError::Forbidden(
            "only the listing owner can delete it",
        ));
    }
    let detector = state.detector().clone();
    tokio::task::spawn_blocking(move || detector.remove_property(id))
        .await
        .context("listing removal task failed")??;
    Ok(StatusCode::NO_CONTENT)
}

async fn approve_property(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<PropertyId>,
) -> ServiceResult<Json<PropertyRecord>> {
    review_property(&state, user, id, true, None).map(Json)
}

async fn reject_property(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<PropertyId>,
    Json(request): Json<RejectRequest>,
) -> ServiceResult<Json<PropertyRecord>> {
    review_property(&state, user, id, false, request.reason).map(Json)
}

fn review_property(
    state: &AppState,
    moderator: UserId,
    id: PropertyId,
    approve: bool,
    reason: Option<String>,
) -> ServiceResult<PropertyRecord> {
    if !state.is_moderator(moderator) {
        return Err(ServiceError::Forbidden("moderator access required"));
    }
    let property = state
        .storage()
        .update_property(id, |property| property.review(approve, reason.clone()))?
        .ok_or(ServiceError::NotFound("property"))?;
    info!(property = %id, %moderator, status = ?property.status, "listing reviewed");
    Ok(property)
}

async fn list_images(
    State(state): State<Arc<AppState>>,
    user: Option<CurrentUser>,
    Path(id): Path<PropertyId>,
) -> ServiceResult<Json<ImagesResponse>> {
    load_visible_property(&state, id, user)?;
    let images = state.detector().images(id)?;
    let primary = primary_image(&images).cloned();
    Ok(Json(ImagesResponse {
        images,
        primary_image: primary,
    }))
}

async fn upload_image(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<PropertyId>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ServiceResult<(StatusCode, Json<ImageRecord>)> {
    let property = load_property(&state, id)?;
    if property.owner != user {
        return Err(ServiceError::Forbidden(
            "only the listing owner can upload photos",
        ));
    }

    let upload = ImageUpload {
        file_name: params.file_name.unwrap_or_else(|| "upload".to_string()),
        caption: params.caption,
        is_primary: params.primary,
        order: params.order,
        bytes: body.to_vec(),
    };
    // Writing and hashing touch the filesystem.
    let worker = Arc::clone(&state);
    let image = tokio::task::spawn_blocking(move || worker.detector().persist_image(id, upload))
        .await
        .context("image upload task failed")??;
    Ok((StatusCode::CREATED, Json(image)))
}

async fn set_primary_image(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((id, image_id)): Path<(PropertyId, ImageId)>,
) -> ServiceResult<Json<ImagesResponse>> {
    let property = load_property(&state, id)?;
    if property.owner != user {
        return Err(ServiceError::Forbidden(
            "only the listing owner can change photos",
        ));
    }
    state.detector().set_primary_image(id, image_id)?;
    let images = state.detector().images(id)?;
    let primary = primary_image(&images).cloned();
    Ok(Json(ImagesResponse {
        images,
        primary_image: primary,
    }))
}

async fn open_inquiry(
    State(state): State<Arc<AppState>>,
    CurrentUser(tenant): CurrentUser,
    Path(id): Path<PropertyId>,
    Json(request): Json<InquiryRequest>,
) -> ServiceResult<(StatusCode, Json<InquiryResponse>)> {
    let property = load_visible_property(&state, id, Some(CurrentUser(tenant)))?;
    if property.owner == tenant {
        return Err(ServiceError::BadRequest(
            "You cannot send an inquiry for your own property.".into(),
        ));
    }

    let tracker = state.tracker();
    let (mut conversation, created) = tracker.open_inquiry(tenant, &property)?;
    if let Some(message) = request.message.as_deref() {
        tracker.post_message(conversation.id, tenant, message)?;
        conversation = tracker.conversation(conversation.id)?;
    }

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(InquiryResponse {
            success: true,
            created,
            conversation,
        }),
    ))
}

/// Serves a stored photo. The entity tag is the photo's content digest.
async fn image_content(
    State(state): State<Arc<AppState>>,
    user: Option<CurrentUser>,
    Path(image_id): Path<ImageId>,
    headers: HeaderMap,
) -> ServiceResult<Response> {
    let detector = state.detector().clone();
    let (image, bytes) = tokio::task::spawn_blocking(move || detector.image_content(image_id))
        .await
        .context("image read task failed")??;
    load_visible_property(&state, image.property_id, user)?;

    let etag = image
        .digest
        .and_then(|digest| HeaderValue::from_str(&format!("\"{}\"", digest.to_base64())).ok());
    if let Some(etag) = &etag {
        let matches = headers
            .get(header::IF_NONE_MATCH)
            .is_some_and(|candidate| candidate == etag);
        if matches {
            return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag.clone())]).into_response());
        }
    }

    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type(&image.path)))],
        bytes,
    )
        .into_response();
    if let Some(etag) = etag {
        response.headers_mut().insert(header::ETAG, etag);
    }
    Ok(response)
}

/// Loads a listing the way `user` is allowed to see it. Listings awaiting
/// approval or rejected are reported as missing to everyone but the owner
/// and moderators.
fn load_visible_property(
    state: &AppState,
    id: PropertyId,
    user: Option<CurrentUser>,
) -> ServiceResult<PropertyRecord> {
    let property = load_property(state, id)?;
    let user = user.map(|CurrentUser(user)| user);
    let moderator = user.is_some_and(|user| state.is_moderator(user));
    if !property.is_visible_to(user, moderator) {
        return Err(ServiceError::NotFound("property"));
    }
    Ok(property)
}

fn load_property(state: &AppState, id: PropertyId) -> ServiceResult<PropertyRecord> {
    state
        .storage()
        .property(id)?
        .ok_or(ServiceError::NotFound("property"))
}
