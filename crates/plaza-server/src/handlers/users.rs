use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use plaza_types::NewUser;

use crate::AppState;
use crate::auth::VerifiedUser;
use crate::error::store_status;

#[derive(Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
    pub avatar_url: Option<String>,
}

pub async fn register_user(
    State(state): State<AppState>,
    Extension(VerifiedUser(user_id)): Extension<VerifiedUser>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .repo
        .set_user(NewUser {
            id: user_id,
            username: req.username,
            avatar_url: req.avatar_url,
        })
        .map_err(store_status)?;
    Ok(Json(user))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state.repo.get_user(user_id).map_err(store_status)?;
    Ok(Json(user))
}
