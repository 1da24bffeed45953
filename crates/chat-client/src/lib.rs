pub mod auth;
pub mod error;
pub mod integrations;
pub mod listener;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod transport;

pub use auth::{StaticTokenSource, TokenSource};
pub use error::{IntegrationError, PipelineError, QueueError, TransportError};
pub use integrations::{
    CalendarIntegration, Integration, IntegrationContext, IntegrationRegistry, IntegrationResult,
    MermaidIntegration,
};
pub use listener::{BroadcastConversationListener, ConversationListener};
pub use pipeline::{CalendarQueryPipeline, HttpPipelineServices, PipelineServices, PipelineStage};
pub use queue::{DuplicatePolicy, QueueItemId, QueueSnapshotItem};
pub use session::{ChatSession, ChatSessionBuilder};
pub use transport::{ChatTransport, HttpChatTransport};
