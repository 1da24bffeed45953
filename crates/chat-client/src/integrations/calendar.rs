use std::sync::Arc;

use shared::models::IntegrationId;

use super::{
    Integration, IntegrationContext, IntegrationFuture, IntegrationResult,
    IntegrationResultContext,
};
use crate::auth::TokenSource;
use crate::error::IntegrationError;
use crate::pipeline::CalendarQueryPipeline;

const CALENDAR_UNAVAILABLE_PROMPT: &str = "The calendar lookup for this message failed, so no calendar data is available. Tell the user their calendar could not be read right now and suggest trying again later. Do not guess at their schedule.";

/// Whole words or word sequences that mark a message as a calendar question.
const CALENDAR_KEYWORDS: [&str; 26] = [
    "calendar",
    "schedule",
    "agenda",
    "meeting",
    "meetings",
    "appointment",
    "appointments",
    "event",
    "events",
    "busy",
    "free",
    "available",
    "availability",
    "today",
    "tonight",
    "tomorrow",
    "yesterday",
    "this week",
    "next week",
    "weekend",
    "this month",
    "next month",
    "upcoming",
    "when is",
    "what's on",
    "whats on",
];

/// Answers calendar questions end to end through the query pipeline.
pub struct CalendarIntegration {
    pipeline: CalendarQueryPipeline,
    tokens: Arc<dyn TokenSource>,
}

impl CalendarIntegration {
    pub fn new(pipeline: CalendarQueryPipeline, tokens: Arc<dyn TokenSource>) -> Self {
        Self { pipeline, tokens }
    }

    /// Falls through to the default chat with the failure explained to the model.
    fn unavailable(&self, error: String) -> IntegrationResult {
        IntegrationResult {
            system_prompt: Some(self.system_prompt().to_string()),
            modified_input: None,
            context: IntegrationResultContext {
                error: Some(error),
                events_found: None,
            },
            requires_special_handling: false,
        }
    }
}

pub(crate) fn looks_like_calendar_question(text: &str) -> bool {
    let lowered = text.to_lowercase().replace('\u{2019}', "'");
    // Hyphens and apostrophes stay inside words: "lock-free" is not "free".
    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .filter(|word| !word.is_empty())
        .collect();

    CALENDAR_KEYWORDS.iter().any(|keyword| {
        let phrase: Vec<&str> = keyword.split(' ').collect();
        words.windows(phrase.len()).any(|window| window == phrase.as_slice())
    })
}

impl Integration for CalendarIntegration {
    fn id(&self) -> IntegrationId {
        IntegrationId::Calendar
    }

    fn name(&self) -> &'static str {
        "Calendar"
    }

    fn system_prompt(&self) -> &str {
        CALENDAR_UNAVAILABLE_PROMPT
    }

    fn can_handle(&self, text: &str, _context: &IntegrationContext) -> bool {
        looks_like_calendar_question(text)
    }

    fn prepare<'a>(
        &'a self,
        _context: &'a IntegrationContext,
    ) -> IntegrationFuture<'a, Result<(), IntegrationError>> {
        Box::pin(async move {
            match self.tokens.provider_token().await {
                Some(_) => Ok(()),
                None => Err(IntegrationError::MissingCredentials {
                    integration: IntegrationId::Calendar.as_str(),
                }),
            }
        })
    }

    fn process_message<'a>(
        &'a self,
        text: &'a str,
        _context: &'a IntegrationContext,
    ) -> IntegrationFuture<'a, IntegrationResult> {
        Box::pin(async move {
            let Some(provider_token) = self.tokens.provider_token().await else {
                return self.unavailable("calendar is not connected".to_string());
            };

            match self.pipeline.execute(text, &provider_token).await {
                Ok(output) => {
                    let mut result = IntegrationResult::final_answer(output.answer);
                    result.context.events_found = Some(output.table.total_events);
                    result
                }
                Err(err) => self.unavailable(err.to_string()),
            }
        })
    }
}
