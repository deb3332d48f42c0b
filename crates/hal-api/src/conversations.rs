use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use hal_db::models::ConversationRow;
use hal_types::api::{ChatMessage, ConversationResponse, SendMessageRequest, StartConversationRequest};
use hal_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, JsonBody};
use crate::middleware::CurrentUser;
use crate::validate::Validator;

const MAX_MESSAGE_CHARS: usize = 2000;
const MAX_PAGE: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// `createdAt` of the oldest message already held; returns older ones.
    pub before: Option<String>,
}

fn default_limit() -> u32 {
    50
}

fn parse_before(raw: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| ApiError::bad_request("Invalid before timestamp"))
    })
    .transpose()
}

/// Load a conversation the caller takes part in. Anyone else gets 404.
async fn participant_conversation(state: &AppState, id: Uuid, user_id: Uuid) -> ApiResult<ConversationRow> {
    state
        .query(move |db| db.get_conversation(id))
        .await?
        .filter(|c| c.is_participant(user_id))
        .ok_or_else(|| ApiError::not_found("Conversation not found"))
}

/// POST /conversations
pub async fn start_conversation(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<StartConversationRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.seller_id == user.id {
        return Err(ApiError::bad_request("Cannot start a conversation with yourself"));
    }
    let seller_id = req.seller_id;
    state
        .query(move |db| db.get_user_by_id(seller_id))
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::not_found("Seller not found"))?;

    let buyer_id = user.id;
    let (conversation, created) = state
        .query(move |db| db.get_or_create_conversation(buyer_id, seller_id, req.product_id))
        .await?;
    if created {
        debug!("Conversation {} opened by {}", conversation.id, user.email);
    }

    let (conversation_id, user_id) = (conversation.id, user.id);
    let summary = state
        .query(move |db| db.conversation_summary(conversation_id, user_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!({ "conversation": ConversationResponse::from(summary) }))))
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    let user_id = user.id;
    let rows = state.query(move |db| db.list_conversations(user_id)).await?;
    let conversations: Vec<ConversationResponse> = rows.into_iter().map(ConversationResponse::from).collect();
    Ok(Json(json!({ "conversations": conversations })))
}

/// GET /conversations/{id}/messages. Newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Query(q): Query<MessageQuery>,
) -> ApiResult<impl IntoResponse> {
    participant_conversation(&state, id, user.id).await?;
    let before = parse_before(q.before.as_deref())?;
    let limit = q.limit.clamp(1, MAX_PAGE);

    let rows = state.query(move |db| db.get_messages(id, before, limit)).await?;
    let messages: Vec<ChatMessage> = rows.into_iter().map(ChatMessage::from).collect();
    Ok(Json(json!({ "messages": messages })))
}

/// POST /conversations/{id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    JsonBody(req): JsonBody<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let body = req.body.trim().to_string();
    let mut v = Validator::new();
    v.length("body", &body, 1, MAX_MESSAGE_CHARS, "Message must be 1-2000 characters");
    v.finish()?;

    let conversation = participant_conversation(&state, id, user.id).await?;
    let sender_id = user.id;
    let row = state.query(move |db| db.insert_message(id, sender_id, &body)).await?;
    let message = ChatMessage::from(row);

    state
        .dispatcher
        .send_to_users(
            &[conversation.buyer_id, conversation.seller_id],
            GatewayEvent::MessageCreate {
                message: message.clone(),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}

/// PUT /conversations/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let updated = hal_gateway::mark_read(&state.dispatcher, state.db.clone(), id, user.id)
        .await?
        .map(|(n, _)| n)
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;
    Ok(Json(json!({ "updated": updated })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn before_cursor_must_be_rfc3339() {
        assert_eq!(parse_before(None).unwrap(), None);
        let t = parse_before(Some("2025-03-01T10:00:00Z")).unwrap().unwrap();
        assert_eq!(t.to_rfc3339(), "2025-03-01T10:00:00+00:00");
        assert!(parse_before(Some("yesterday")).is_err());
    }
}
