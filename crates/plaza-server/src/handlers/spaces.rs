use axum::{
    Extension, Json,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use plaza_gateway::connection;
use plaza_types::{Location, NewSpace};

use crate::AppState;
use crate::auth::VerifiedUser;
use crate::error::store_status;

#[derive(Deserialize)]
pub struct CreateSpaceRequest {
    pub name: String,
    pub theme_color: String,
    pub radius: f64,
    pub location: Location,
}

/// The creating user becomes the space admin and must already be registered.
pub async fn create_space(
    State(state): State<AppState>,
    Extension(VerifiedUser(user_id)): Extension<VerifiedUser>,
    Json(req): Json<CreateSpaceRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let new_space = NewSpace {
        name: req.name,
        theme_color: req.theme_color,
        radius: req.radius,
        location: req.location,
        admin_id: user_id,
    };
    if let Err(reason) = new_space.validate() {
        warn!(reason, "rejected space");
        return Err(StatusCode::BAD_REQUEST);
    }
    if state.repo.get_user(user_id).is_err() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let space = state.repo.set_space(new_space).map_err(store_status)?;
    Ok(Json(json!({ "space_id": space.id })))
}

#[derive(Deserialize)]
pub struct LocationQuery {
    pub longitude: f64,
    pub latitude: f64,
    /// Search radius in meters.
    pub radius: f64,
}

pub async fn get_spaces(
    State(state): State<AppState>,
    Query(q): Query<LocationQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let center = Location {
        longitude: q.longitude,
        latitude: q.latitude,
    };
    if !center.in_bounds() || !q.radius.is_finite() || q.radius < 0.0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let spaces = state
        .repo
        .get_spaces_by_location(center, q.radius)
        .map_err(store_status)?;
    Ok(Json(spaces))
}

pub async fn subscribe(
    State(state): State<AppState>,
    Path(space_id): Path<Uuid>,
    Extension(VerifiedUser(user_id)): Extension<VerifiedUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let joined_at = state
        .repo
        .set_space_subscriber(space_id, user_id)
        .map_err(store_status)?;
    state
        .publisher
        .subscriber_joined(space_id, user_id, joined_at)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_subscribers(
    State(state): State<AppState>,
    Path(space_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    state.repo.get_space(space_id).map_err(store_status)?;
    let users = state
        .repo
        .get_space_subscribers(space_id)
        .map_err(store_status)?;
    Ok(Json(users))
}

pub async fn get_active_subscribers(
    State(state): State<AppState>,
    Path(space_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    state.repo.get_space(space_id).map_err(store_status)?;
    let users = state
        .repo
        .get_space_active_subscribers(space_id)
        .map_err(store_status)?;
    Ok(Json(users))
}

/// Upgrade to a live notification stream for one space. Subscribers only;
/// connecting never creates a subscription.
pub async fn updates(
    State(state): State<AppState>,
    Path(space_id): Path<Uuid>,
    Extension(VerifiedUser(user_id)): Extension<VerifiedUser>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    crate::handlers::ensure_subscriber(&state, space_id, user_id)?;

    let registry = state.registry.clone();
    let repo = state.repo.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::serve_session(socket, registry, repo, space_id, user_id)
    }))
}
