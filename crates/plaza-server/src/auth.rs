//! Identity seam. Token issuance and verification belong to an external
//! identity provider; this layer only turns an opaque bearer token into a
//! verified user id. The dev verifier accepts `Bearer {uuid}` as-is.

use axum::{
    extract::Request,
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// The verified identity of the caller, injected as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedUser(pub Uuid);

pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(verify_bearer)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(VerifiedUser(user_id));
    Ok(next.run(req).await)
}

fn verify_bearer(header: &str) -> Option<Uuid> {
    header.strip_prefix("Bearer ")?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(verify_bearer(&format!("Bearer {id}")), Some(id));
        assert_eq!(verify_bearer("Bearer not-a-uuid"), None);
        assert_eq!(verify_bearer("Basic abc"), None);
    }
}
