use thiserror::Error;

use crate::pipeline::PipelineStage;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("request could not be sent: {0}")]
    Unavailable(String),
    #[error("request failed with HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("response was invalid: {0}")]
    InvalidResponse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),
}

impl TransportError {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse("response body could not be decoded".to_string())
        } else {
            Self::Unavailable(if err.is_connect() {
                "connection failed".to_string()
            } else {
                "network error".to_string()
            })
        }
    }
}

/// A calendar pipeline run that stopped before producing an answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{stage} stage timed out")]
    Timeout { stage: PipelineStage },
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: TransportError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Timeout { stage } | Self::Stage { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("{integration} integration is missing credentials")]
    MissingCredentials { integration: &'static str },
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("message is empty")]
    EmptyInput,
    #[error("message is already queued")]
    Duplicate,
    #[error("queue item not found")]
    NotFound,
    #[error("queue index {index} is out of range")]
    IndexOutOfRange { index: usize },
    #[error("queue item is being processed")]
    ItemInFlight,
}
