use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use plaza_types::{NewFirstMessage, Sorting};

use crate::AppState;
use crate::auth::VerifiedUser;
use crate::error::store_status;
use crate::handlers::messages::NewMessageRequest;

#[derive(Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub sort: Sorting,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    10
}

/// Start a top-level thread; the request body is its first message.
pub async fn create_toplevel_thread(
    State(state): State<AppState>,
    Path(space_id): Path<Uuid>,
    Extension(VerifiedUser(user_id)): Extension<VerifiedUser>,
    Json(req): Json<NewMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    crate::handlers::ensure_subscriber(&state, space_id, user_id)?;

    let (thread, message) = state
        .repo
        .set_toplevel_thread(
            space_id,
            NewFirstMessage {
                sender_id: user_id,
                content: req.content,
                kind: req.kind,
            },
        )
        .map_err(store_status)?;
    state
        .publisher
        .toplevel_thread_created(user_id, &thread)
        .await;

    Ok(Json(json!({
        "thread_id": thread.id,
        "first_message_id": message.id,
    })))
}

/// Attach a nested thread to a message. 404 unless the message lives in a
/// thread of this space; 409 when the message already has a child thread.
pub async fn create_thread(
    State(state): State<AppState>,
    Path((space_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(VerifiedUser(user_id)): Extension<VerifiedUser>,
) -> Result<impl IntoResponse, StatusCode> {
    crate::handlers::ensure_subscriber(&state, space_id, user_id)?;

    let parent = state.repo.get_message(message_id).map_err(store_status)?;
    let parent_thread = state
        .repo
        .get_thread(parent.thread_id)
        .map_err(store_status)?;
    if parent_thread.space_id != space_id {
        return Err(StatusCode::NOT_FOUND);
    }

    let thread = state
        .repo
        .set_thread(space_id, message_id, Utc::now())
        .map_err(store_status)?;
    state.publisher.thread_created(user_id, &thread).await;

    Ok(Json(json!({ "thread_id": thread.id })))
}

pub async fn get_toplevel_threads(
    State(state): State<AppState>,
    Path(space_id): Path<Uuid>,
    Query(q): Query<ListingQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    state.repo.get_space(space_id).map_err(store_status)?;

    let threads = match q.sort {
        Sorting::Recent => state
            .repo
            .get_space_toplevel_threads_by_time(space_id, q.offset, q.count),
        Sorting::Popularity => {
            state
                .repo
                .get_space_toplevel_threads_by_popularity(space_id, q.offset, q.count)
        }
    }
    .map_err(store_status)?;
    Ok(Json(threads))
}

#[derive(Deserialize)]
pub struct ThreadMessagesQuery {
    #[serde(default)]
    pub messages_sort: Sorting,
    #[serde(default)]
    pub messages_offset: usize,
    #[serde(default = "default_count")]
    pub messages_count: usize,
}

/// A thread with a page of its messages.
pub async fn get_thread(
    State(state): State<AppState>,
    Path((space_id, thread_id)): Path<(Uuid, Uuid)>,
    Query(q): Query<ThreadMessagesQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let thread = state.repo.get_thread(thread_id).map_err(store_status)?;
    if thread.space_id != space_id {
        return Err(StatusCode::NOT_FOUND);
    }

    let messages = match q.messages_sort {
        Sorting::Recent => {
            state
                .repo
                .get_thread_messages_by_time(thread_id, q.messages_offset, q.messages_count)
        }
        Sorting::Popularity => state.repo.get_thread_messages_by_popularity(
            thread_id,
            q.messages_offset,
            q.messages_count,
        ),
    }
    .map_err(store_status)?;

    Ok(Json(json!({
        "thread": thread,
        "messages": messages,
    })))
}
