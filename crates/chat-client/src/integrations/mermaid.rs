use shared::models::IntegrationId;

use super::{Integration, IntegrationContext, IntegrationFuture, IntegrationResult};
use crate::error::IntegrationError;

const MERMAID_SYSTEM_PROMPT: &str = "You are also a Mermaid diagram expert. When a diagram would help, or the user asks for one, answer with a fenced ```mermaid code block containing valid Mermaid syntax (flowchart, sequenceDiagram, classDiagram, stateDiagram-v2, erDiagram, gantt or pie). Keep node labels short, quote labels that contain punctuation, and add one or two sentences explaining the diagram.";

/// Prompt-only integration; never authors the reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct MermaidIntegration;

impl MermaidIntegration {
    pub fn new() -> Self {
        Self
    }
}

impl Integration for MermaidIntegration {
    fn id(&self) -> IntegrationId {
        IntegrationId::Mermaid
    }

    fn name(&self) -> &'static str {
        "Mermaid Diagram Expert"
    }

    fn system_prompt(&self) -> &str {
        MERMAID_SYSTEM_PROMPT
    }

    fn can_handle(&self, text: &str, _context: &IntegrationContext) -> bool {
        !text.trim().is_empty()
    }

    fn prepare<'a>(
        &'a self,
        _context: &'a IntegrationContext,
    ) -> IntegrationFuture<'a, Result<(), IntegrationError>> {
        Box::pin(async { Ok(()) })
    }

    fn process_message<'a>(
        &'a self,
        _text: &'a str,
        _context: &'a IntegrationContext,
    ) -> IntegrationFuture<'a, IntegrationResult> {
        Box::pin(async move { IntegrationResult::prompt_only(self.system_prompt()) })
    }
}
