use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::{Router, middleware};
use shared::llm::LlmGateway;
use shared::repos::ConversationRepository;
use uuid::Uuid;

mod authn;
mod calendar;
mod chat;
mod clerk_identity;
mod clerk_jwks_cache;
mod conversations;
mod errors;
mod health;
mod observability;

pub use authn::user_id_for_clerk_subject;
pub use clerk_identity::ClerkVerifier;
pub use clerk_jwks_cache::{ClerkJwksCache, ClerkJwksCacheConfig};

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn ConversationRepository>,
    pub llm_gateway: Arc<dyn LlmGateway>,
    pub clerk: ClerkVerifier,
    pub calendar_description_max_chars: usize,
    pub chat_history_max_turns: usize,
}

#[derive(Clone, Copy)]
pub(super) struct AuthUser {
    pub(super) user_id: Uuid,
}

pub fn build_router(app_state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .with_state(app_state.clone());

    let auth_layer_state = app_state.clone();

    let protected_routes = Router::new()
        .route("/v1/chat", post(chat::send_chat))
        .route(
            "/v1/calendar/parameters",
            post(calendar::infer_parameters),
        )
        .route("/v1/calendar/answer", post(calendar::final_answer))
        .route(
            "/v1/conversations",
            get(conversations::list_conversations),
        )
        .route(
            "/v1/conversations/{conversation_id}",
            delete(conversations::delete_conversation),
        )
        .route(
            "/v1/conversations/{conversation_id}/messages",
            get(conversations::list_messages),
        )
        .layer(middleware::from_fn_with_state(
            auth_layer_state,
            authn::auth_middleware,
        ))
        .with_state(app_state);

    public_routes
        .merge(protected_routes)
        .layer(middleware::from_fn(
            observability::request_observability_middleware,
        ))
}
