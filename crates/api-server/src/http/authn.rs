use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;
use uuid::Uuid;

use super::clerk_identity::ClerkIdentityError;
use super::errors::{bad_gateway_response, unauthorized_response};
use super::{AppState, AuthUser};

const CLERK_SUBJECT_NAMESPACE: Uuid = Uuid::from_u128(0x6c1d3f2a9b8e4c57a0e1f4d2b7c8e913);

pub(super) async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        warn!("missing or invalid authorization header");
        return unauthorized_response();
    };

    let session = match state.clerk.verify(token).await {
        Ok(session) => session,
        Err(ClerkIdentityError::Rejected(rejection)) => {
            warn!(reason = rejection.as_str(), "session token rejected");
            return unauthorized_response();
        }
        Err(ClerkIdentityError::JwksUnavailable) => {
            warn!("clerk jwks unavailable");
            return bad_gateway_response(
                "clerk_jwks_unavailable",
                "Unable to verify session token right now",
            );
        }
    };

    let user_id = user_id_for_clerk_subject(state.clerk.issuer(), &session.subject);
    req.extensions_mut().insert(AuthUser { user_id });
    next.run(req).await
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Stable per-user id: the same Clerk subject always maps to the same UUID.
pub fn user_id_for_clerk_subject(issuer: &str, subject: &str) -> Uuid {
    let stable_subject = format!("{}:{subject}", issuer.trim_end_matches('/'));
    Uuid::new_v5(&CLERK_SUBJECT_NAMESPACE, stable_subject.as_bytes())
}
