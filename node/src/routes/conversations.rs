use crate::error::{ServiceError, ServiceResult};
use crate::messaging::ConversationSummary;
use crate::routes::CurrentUser;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use hamrokotha_messaging::{
    Conversation, ConversationId, InquiryStatus, Message, MessageId, PropertyId, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(start_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(poll_messages).post(send_message),
        )
        .route("/conversations/:id/read", post(mark_read))
        .route("/conversations/:id/close", post(close_inquiry))
        .route("/conversations/:id/reopen", post(reopen_inquiry))
        .route("/messages/unread-count", get(unread_count))
}

#[derive(Debug, Deserialize)]
pub struct StartConversationRequest {
    pub participant: UserId,
    #[serde(default)]
    pub property_id: Option<PropertyId>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub success: bool,
    pub created: bool,
    pub conversation: Conversation,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub success: bool,
    pub total_unread: usize,
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PollParams {
    pub after: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

/// A message as seen by the polling user.
#[derive(Debug, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub is_own: bool,
}

impl MessageView {
    fn for_user(message: Message, user: UserId) -> Self {
        let is_own = message.sender == user;
        Self { message, is_own }
    }
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub success: bool,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
pub struct SentResponse {
    pub success: bool,
    pub message: MessageView,
}

#[derive(Debug, Serialize)]
pub struct MarkedReadResponse {
    pub success: bool,
    pub marked: usize,
}

#[derive(Debug, Serialize)]
pub struct InquiryStatusResponse {
    pub success: bool,
    pub status: InquiryStatus,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub success: bool,
    pub unread_count: usize,
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ServiceResult<Json<ConversationListResponse>> {
    let tracker = state.tracker();
    let conversations = tracker.conversations_for(user)?;
    let total_unread = tracker.total_unread_count(user)?;
    Ok(Json(ConversationListResponse {
        success: true,
        total_unread,
        conversations,
    }))
}

async fn start_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<StartConversationRequest>,
) -> ServiceResult<(StatusCode, Json<ConversationResponse>)> {
    if request.participant == user {
        return Err(ServiceError::BadRequest(
            "You cannot chat with yourself.".into(),
        ));
    }
    if let Some(property_id) = request.property_id {
        state
            .storage()
            .property(property_id)?
            .ok_or(ServiceError::NotFound("property"))?;
    }

    let (conversation, created) =
        state
            .tracker()
            .get_or_create_conversation(user, request.participant, request.property_id)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ConversationResponse {
            success: true,
            created,
            conversation,
        }),
    ))
}

/// Returns messages after `?after=` and marks the other side's messages read.
async fn poll_messages(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ConversationId>,
    Query(params): Query<PollParams>,
) -> ServiceResult<Json<MessagesResponse>> {
    let tracker = state.tracker();
    tracker.conversation_for(id, user)?;
    tracker.mark_read(id, user)?;
    let messages = tracker
        .messages(id, params.after)?
        .into_iter()
        .map(|message| MessageView::for_user(message, user))
        .collect();
    Ok(Json(MessagesResponse {
        success: true,
        messages,
    }))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ConversationId>,
    Json(request): Json<SendMessageRequest>,
) -> ServiceResult<(StatusCode, Json<SentResponse>)> {
    let tracker = state.tracker();
    tracker.conversation_for(id, user)?;
    let message = tracker.post_message(id, user, &request.body)?;
    Ok((
        StatusCode::CREATED,
        Json(SentResponse {
            success: true,
            message: MessageView::for_user(message, user),
        }),
    ))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ConversationId>,
) -> ServiceResult<Json<MarkedReadResponse>> {
    let tracker = state.tracker();
    tracker.conversation_for(id, user)?;
    let marked = tracker.mark_read(id, user)?;
    Ok(Json(MarkedReadResponse {
        success: true,
        marked,
    }))
}

async fn close_inquiry(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ConversationId>,
) -> ServiceResult<Json<InquiryStatusResponse>> {
    let status = state.tracker().close_inquiry(id, user)?;
    Ok(Json(InquiryStatusResponse {
        success: true,
        status,
    }))
}

async fn reopen_inquiry(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ConversationId>,
) -> ServiceResult<Json<InquiryStatusResponse>> {
    let status = state.tracker().reopen_inquiry(id, user)?;
    Ok(Json(InquiryStatusResponse {
        success: true,
        status,
    }))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ServiceResult<Json<UnreadCountResponse>> {
    let unread_count = state.tracker().total_unread_count(user)?;
    Ok(Json(UnreadCountResponse {
        success: true,
        unread_count,
    }))
}
