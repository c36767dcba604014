use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use plaza_store::Repository;

use crate::registry::{DEFAULT_NOTIFICATION_BUFFER, SessionRegistry};

/// Deadline for a single transport write. A write that fails or exceeds it
/// is fatal for that connection only.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drive one live subscriber connection to completion.
///
/// Registers the session in both the registry (for delivery) and the store's
/// active-subscriber index (for counting), then drains the session queue
/// into the socket until the client disconnects, a write fails, or the
/// session is cancelled as a slow consumer. This task owns the session's
/// cleanup on every exit path.
pub async fn serve_session(
    socket: WebSocket,
    registry: SessionRegistry,
    repo: Repository,
    space_id: Uuid,
    user_id: Uuid,
) {
    let mut session = registry
        .add_session(space_id, user_id, DEFAULT_NOTIFICATION_BUFFER)
        .await;
    let session_id = session.session_id;

    if let Err(error) = repo.add_space_session(space_id, user_id, session_id) {
        warn!(%space_id, %user_id, %error, "refusing live session");
        registry.delete_session(space_id, session_id).await;
        return;
    }
    info!(%space_id, %user_id, %session_id, "subscriber connected");

    let (mut sender, mut receiver) = socket.split();

    // The read side only exists to detect disconnect; client frames carry no
    // commands on this stream.
    let cancel = session.cancel.clone();
    let read_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            if matches!(frame, WsMessage::Close(_)) {
                break;
            }
        }
        cancel.cancel();
    });

    loop {
        tokio::select! {
            maybe = session.notifications.recv() => {
                let Some(notification) = maybe else { break };
                let text = match serde_json::to_string(&notification) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(%error, "dropping unserializable notification");
                        continue;
                    }
                };
                match tokio::time::timeout(WRITE_TIMEOUT, sender.send(WsMessage::Text(text.into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        warn!(%session_id, %error, "notification write failed");
                        break;
                    }
                    Err(_) => {
                        warn!(%session_id, "notification write deadline exceeded");
                        break;
                    }
                }
            }
            _ = session.cancel.cancelled() => break,
        }
    }

    read_task.abort();
    registry.delete_session(space_id, session_id).await;
    if let Err(error) = repo.delete_space_session(space_id, user_id, session_id) {
        warn!(%session_id, %error, "session index cleanup failed");
    }
    info!(%space_id, %user_id, %session_id, "subscriber disconnected");
}
