use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::llm::{CompletionPurpose, LlmGatewayRequest, final_answer_messages};
use shared::models::{ContentResponse, FinalAnswerRequest, IntelligenceRequest, PromptMessage};
use tracing::{debug, error};

use super::errors::{bad_request_response, internal_error_response, llm_error_response};
use super::{AppState, AuthUser};

/// Parameter-intelligence forwarder. The model text comes back verbatim; the
/// client owns parsing and fallback.
pub(super) async fn infer_parameters(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<IntelligenceRequest>,
) -> Response {
    if req.messages.is_empty() {
        return bad_request_response("invalid_request", "messages must not be empty");
    }

    complete(
        &state,
        user,
        CompletionPurpose::CalendarParameters,
        req.messages,
    )
    .await
}

/// Final-answer forwarder. The formatting rules are built here so every
/// client gets the same table layout.
pub(super) async fn final_answer(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<FinalAnswerRequest>,
) -> Response {
    let user_query = req.user_query.trim();
    if user_query.is_empty() {
        return bad_request_response("invalid_request", "userQuery must not be empty");
    }

    let messages = match final_answer_messages(
        user_query,
        &req.json_table_data,
        state.calendar_description_max_chars,
    ) {
        Ok(messages) => messages,
        Err(err) => {
            error!(error = %err, "failed to serialize calendar table");
            return internal_error_response();
        }
    };

    debug!(
        total_events = req.json_table_data.total_events,
        has_more_events = req.json_table_data.has_more_events,
        "building calendar answer"
    );

    complete(&state, user, CompletionPurpose::CalendarAnswer, messages).await
}

async fn complete(
    state: &AppState,
    user: AuthUser,
    purpose: CompletionPurpose,
    messages: Vec<PromptMessage>,
) -> Response {
    let request =
        LlmGatewayRequest::new(purpose, messages).with_requester_id(user.user_id.to_string());

    match state.llm_gateway.generate(request).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(ContentResponse {
                content: reply.content,
            }),
        )
            .into_response(),
        Err(err) => llm_error_response(&err),
    }
}
