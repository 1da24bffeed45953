use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use shared::models::{
    ConversationMessagesResponse, ConversationSummary, ListConversationsResponse, OkResponse,
};
use shared::repos::ConversationRecord;
use uuid::Uuid;

use super::errors::{bad_request_response, not_found_response, store_error_response};
use super::{AppState, AuthUser};

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub(super) struct ListConversationsQuery {
    limit: Option<usize>,
}

pub(super) async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListConversationsQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return bad_request_response("invalid_limit", "limit must be between 1 and 200");
    }

    match state
        .repository
        .list_conversations(user.user_id, limit)
        .await
    {
        Ok(records) => (
            StatusCode::OK,
            Json(ListConversationsResponse {
                items: records.into_iter().map(conversation_summary).collect(),
            }),
        )
            .into_response(),
        Err(err) => store_error_response(err),
    }
}

pub(super) async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
) -> Response {
    let Ok(conversation_id) = Uuid::parse_str(&conversation_id) else {
        return not_found_response();
    };

    match state
        .repository
        .load_messages(user.user_id, conversation_id)
        .await
    {
        Ok(Some(messages)) => (
            StatusCode::OK,
            Json(ConversationMessagesResponse {
                conversation_id,
                messages,
            }),
        )
            .into_response(),
        Ok(None) => not_found_response(),
        Err(err) => store_error_response(err),
    }
}

pub(super) async fn delete_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
) -> Response {
    let Ok(conversation_id) = Uuid::parse_str(&conversation_id) else {
        return not_found_response();
    };

    match state
        .repository
        .delete_conversation(user.user_id, conversation_id)
        .await
    {
        Ok(true) => (StatusCode::OK, Json(OkResponse { ok: true })).into_response(),
        Ok(false) => not_found_response(),
        Err(err) => store_error_response(err),
    }
}

fn conversation_summary(record: ConversationRecord) -> ConversationSummary {
    ConversationSummary {
        id: record.id,
        title: record.title,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}
