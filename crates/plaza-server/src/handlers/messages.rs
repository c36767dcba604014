use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use plaza_types::{MessageKind, NewMessage};

use crate::AppState;
use crate::auth::VerifiedUser;
use crate::error::store_status;

#[derive(Deserialize)]
pub struct NewMessageRequest {
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
}

pub async fn create_message(
    State(state): State<AppState>,
    Path((space_id, thread_id)): Path<(Uuid, Uuid)>,
    Extension(VerifiedUser(user_id)): Extension<VerifiedUser>,
    Json(req): Json<NewMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    crate::handlers::ensure_subscriber(&state, space_id, user_id)?;

    let thread = state.repo.get_thread(thread_id).map_err(store_status)?;
    if thread.space_id != space_id {
        return Err(StatusCode::NOT_FOUND);
    }

    let message = state
        .repo
        .set_message(NewMessage {
            thread_id,
            sender_id: user_id,
            content: req.content,
            kind: req.kind,
        })
        .map_err(store_status)?;
    state.publisher.message_created(space_id, &message).await;

    Ok(Json(json!({ "message_id": message.id })))
}

pub async fn like_message(
    State(state): State<AppState>,
    Path((space_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(VerifiedUser(user_id)): Extension<VerifiedUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let existing = state.repo.get_message(message_id).map_err(store_status)?;
    let thread = state
        .repo
        .get_thread(existing.thread_id)
        .map_err(store_status)?;
    if thread.space_id != space_id {
        return Err(StatusCode::NOT_FOUND);
    }

    let (message, _) = state.repo.like_message(message_id).map_err(store_status)?;
    state
        .publisher
        .message_liked(space_id, user_id, &message)
        .await;
    Ok(StatusCode::NO_CONTENT)
}
