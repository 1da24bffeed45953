use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::llm::{CompletionPurpose, LlmGatewayRequest, chat_system_prompt};
use shared::models::{ChatRequest, ChatResponse, ChatTurn, PromptMessage, TurnRole};
use shared::repos::conversation_title;
use tracing::{debug, info};
use uuid::Uuid;

use super::errors::{
    bad_request_response, llm_error_response, not_found_response, store_error_response,
};
use super::{AppState, AuthUser};

const CONVERSATION_TITLE_MAX_CHARS: usize = 60;

pub(super) async fn send_chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if let Err((code, message)) = validate_chat_request(&req, state.chat_history_max_turns) {
        return bad_request_response(code, message);
    }

    let existing_conversation = match req.conversation_id.as_deref() {
        Some(raw) => {
            let Ok(conversation_id) = Uuid::parse_str(raw.trim()) else {
                return not_found_response();
            };
            match state
                .repository
                .conversation_exists(user.user_id, conversation_id)
                .await
            {
                Ok(true) => Some(conversation_id),
                Ok(false) => return not_found_response(),
                Err(err) => return store_error_response(err),
            }
        }
        None => None,
    };

    debug!(
        turns = req.messages.len(),
        active_integrations = req.active_integrations.len(),
        has_integration_prompt = req.system_prompt.is_some(),
        "chat request accepted"
    );

    let gateway_request =
        LlmGatewayRequest::new(CompletionPurpose::Chat, build_chat_messages(&req))
            .with_requester_id(user.user_id.to_string());
    let reply = match state.llm_gateway.generate(gateway_request).await {
        Ok(reply) => reply,
        Err(err) => return llm_error_response(&err),
    };

    let conversation_id = match existing_conversation {
        Some(conversation_id) => conversation_id,
        None => {
            let title = conversation_title(&req.original_input, CONVERSATION_TITLE_MAX_CHARS);
            match state
                .repository
                .create_conversation(user.user_id, &title)
                .await
            {
                Ok(conversation_id) => conversation_id,
                Err(err) => return store_error_response(err),
            }
        }
    };

    let persisted_turns = [
        ChatTurn::user(req.original_input.trim()),
        ChatTurn::assistant(reply.content.clone()),
    ];
    if let Err(err) = state
        .repository
        .append_messages(user.user_id, conversation_id, &persisted_turns)
        .await
    {
        return store_error_response(err);
    }

    info!(
        conversation_id = %conversation_id,
        model = %reply.model,
        new_conversation = existing_conversation.is_none(),
        "chat reply generated"
    );

    (
        StatusCode::OK,
        Json(ChatResponse {
            content: reply.content,
            conversation_id: conversation_id.to_string(),
        }),
    )
        .into_response()
}

fn validate_chat_request(
    req: &ChatRequest,
    max_turns: usize,
) -> Result<(), (&'static str, &'static str)> {
    let Some(last_turn) = req.messages.last() else {
        return Err(("invalid_request", "messages must not be empty"));
    };

    if last_turn.role != TurnRole::User {
        return Err(("invalid_request", "the last message must come from the user"));
    }

    if req.original_input.trim().is_empty() {
        return Err(("invalid_request", "originalInput must not be empty"));
    }

    if req.messages.len() > max_turns {
        return Err(("too_many_turns", "conversation history is too long"));
    }

    Ok(())
}

/// Base prompt (plus any integration prompt) followed by the turns, with the
/// last user turn replaced by `optimizedInput` when one was supplied.
fn build_chat_messages(req: &ChatRequest) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    messages.push(PromptMessage::system(chat_system_prompt(
        req.system_prompt.as_deref(),
    )));
    messages.extend(req.messages.iter().map(PromptMessage::from));

    let optimized = req
        .optimized_input
        .as_deref()
        .map(str::trim)
        .filter(|input| !input.is_empty());
    if let (Some(optimized), Some(last)) = (optimized, messages.last_mut()) {
        last.content = optimized.to_string();
    }

    messages
}
