use chrono::DateTime;
use chrono_tz::Tz;

use crate::calendar::NormalizedEventTable;
use crate::models::PromptMessage;

pub const CHAT_SYSTEM_PROMPT: &str = "You are Jarvis, a helpful AI assistant. Answer clearly and concisely, use markdown when it improves readability, and say so when you are unsure.";

const PARAMETER_SYSTEM_PROMPT: &str = "You convert calendar questions into search parameters. Respond with strict JSON only, no prose and no code fences.";

const FINAL_ANSWER_SYSTEM_PROMPT: &str = "You are Jarvis, answering questions about the user's calendar. Use only the supplied event table. Never invent events, times or locations.";

pub fn chat_system_prompt(integration_prompt: Option<&str>) -> String {
    match integration_prompt.map(str::trim).filter(|prompt| !prompt.is_empty()) {
        Some(extra) => format!("{CHAT_SYSTEM_PROMPT}\n\n{extra}"),
        None => CHAT_SYSTEM_PROMPT.to_string(),
    }
}

/// Messages for the parameter stage: pick a look-ahead bucket and a result cap.
pub fn parameter_intelligence_messages(
    query: &str,
    now_local: DateTime<Tz>,
    day_buckets: &[u32],
) -> Vec<PromptMessage> {
    let bucket_list = day_buckets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let instruction = format!(
        "Current date and time: {now} ({weekday}, time zone {tz}).\n\
         User query: \"{query}\"\n\n\
         Choose how many days ahead to search and how many events to return.\n\
         Return JSON of the form {{\"days\": <one of {bucket_list}>, \"maxResults\": <integer>, \"reasoning\": \"<short explanation>\"}}.\n\
         Pick the smallest days value that covers the period the user asks about.",
        now = now_local.format("%Y-%m-%d %H:%M"),
        weekday = now_local.format("%A"),
        tz = now_local.timezone().name(),
    );

    vec![
        PromptMessage::system(PARAMETER_SYSTEM_PROMPT),
        PromptMessage::user(instruction),
    ]
}

pub fn final_answer_messages(
    user_query: &str,
    table: &NormalizedEventTable,
    description_max_chars: usize,
) -> Result<Vec<PromptMessage>, serde_json::Error> {
    let table_json = serde_json::to_string_pretty(table)?;
    let rules = format!(
        "Answer the user's question using the calendar data below.\n\
         Formatting rules:\n\
         - When two or more events match, present them as a markdown table with the columns Date | Time | Event | Location | Description, in that order.\n\
         - Write dates as YYYY-MM-DD (Weekday) and sort rows chronologically.\n\
         - Use N/A for any empty field.\n\
         - Truncate descriptions to {description_max_chars} characters.\n\
         - When exactly one event matches, answer directly in a single sentence with its date, time and title.\n\
         - When the table is empty or no event matches the question, say explicitly that no relevant events were found.\n\n\
         User question: \"{user_query}\"\n\n\
         Calendar data ({summary}, range {start} to {end}{more}):\n{table_json}",
        summary = table.summary,
        start = table.date_range.start,
        end = table.date_range.end,
        more = if table.has_more_events {
            "; more events may exist beyond this list"
        } else {
            ""
        },
    );

    Ok(vec![
        PromptMessage::system(FINAL_ANSWER_SYSTEM_PROMPT),
        PromptMessage::user(rules),
    ])
}
