use axum::http::StatusCode;
use uuid::Uuid;

use crate::AppState;
use crate::error::store_status;

pub mod admin;
pub mod messages;
pub mod spaces;
pub mod threads;
pub mod users;

/// Gate for the write routes and the notification stream: 404 for an
/// unknown space, 403 for a caller who never subscribed to it.
pub(crate) fn ensure_subscriber(
    state: &AppState,
    space_id: Uuid,
    user_id: Uuid,
) -> Result<(), StatusCode> {
    state.repo.get_space(space_id).map_err(store_status)?;
    let subscribed = state
        .repo
        .is_space_subscriber(space_id, user_id)
        .map_err(store_status)?;
    if !subscribed {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}
