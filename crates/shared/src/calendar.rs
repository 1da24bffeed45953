use serde::{Deserialize, Serialize};

pub const ALL_DAY_LABEL: &str = "All Day";

/// A calendar event flattened for the answer stage.
///
/// Optional provider fields are carried as empty strings so formatting code
/// never has to branch on absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub id: String,
    pub title: String,
    pub date: String,
    pub time: String,
    pub day_of_week: String,
    pub location: String,
    pub description: String,
    pub status: String,
    pub link: String,
    pub is_all_day: bool,
    pub is_recurring: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEventTable {
    pub events: Vec<NormalizedEvent>,
    pub summary: String,
    pub date_range: DateRange,
    pub total_events: usize,
    pub has_more_events: bool,
}

impl NormalizedEventTable {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub fn events_found_summary(count: usize) -> String {
    format!("{count} events found")
}
