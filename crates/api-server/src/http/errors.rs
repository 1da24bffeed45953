use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::llm::LlmGatewayError;
use shared::models::{ErrorBody, ErrorResponse};
use shared::repos::StoreError;
use tracing::{error, warn};

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

pub(super) fn bad_request_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

pub(super) fn bad_gateway_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_GATEWAY, code, message)
}

pub(super) fn store_unavailable_response() -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "store_unavailable",
        "Conversation store is not reachable",
    )
}

pub(super) fn unauthorized_response() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "Missing or invalid bearer token",
    )
}

pub(super) fn not_found_response() -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "not_found",
        "Conversation was not found",
    )
}

pub(super) fn internal_error_response() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Unexpected server error",
    )
}

pub(super) fn store_error_response(err: StoreError) -> Response {
    match err {
        StoreError::ConversationNotFound => not_found_response(),
        other => {
            error!(error = %other, "conversation store operation failed");
            internal_error_response()
        }
    }
}

pub(super) fn llm_error_response(err: &LlmGatewayError) -> Response {
    warn!(error = %err, "llm gateway request failed");
    match err {
        LlmGatewayError::Timeout => bad_gateway_response(
            "llm_timeout",
            "The language model did not respond in time",
        ),
        LlmGatewayError::ProviderFailure(_) => bad_gateway_response(
            "llm_unavailable",
            "The language model request failed",
        ),
        LlmGatewayError::InvalidProviderPayload(_) => bad_gateway_response(
            "llm_invalid_response",
            "The language model returned an unusable response",
        ),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use serde_json::Value;
    use shared::llm::LlmGatewayError;
    use shared::repos::StoreError;

    use super::{llm_error_response, store_error_response};

    async fn error_code(response: axum::response::Response) -> (StatusCode, String) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let body: Value = serde_json::from_slice(&body).expect("body should be json");
        (
            status,
            body["error"]["code"].as_str().unwrap_or_default().to_string(),
        )
    }

    #[tokio::test]
    async fn llm_failures_map_to_bad_gateway() {
        let (status, code) = error_code(llm_error_response(&LlmGatewayError::Timeout)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(code, "llm_timeout");

        let (status, code) = error_code(llm_error_response(
            &LlmGatewayError::ProviderFailure("status=503".to_string()),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(code, "llm_unavailable");
    }

    #[tokio::test]
    async fn store_errors_hide_details_except_not_found() {
        let (status, code) = error_code(store_error_response(StoreError::ConversationNotFound)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "not_found");

        let (status, code) = error_code(store_error_response(StoreError::InvalidData(
            "role=system".to_string(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "internal_error");
    }
}
