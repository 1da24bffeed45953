use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use shared::models::{ChatTurn, IntegrationId};

use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueItemId(u64);

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// How `enqueue` treats text that is already waiting in the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Reject a trimmed text that matches any queued item, including the in-flight one.
    #[default]
    RejectQueued,
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingMessage {
    id: QueueItemId,
    text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshotItem {
    pub id: QueueItemId,
    pub text: String,
    pub in_flight: bool,
}

/// FIFO of pending user inputs.
///
/// The head may be marked in flight; an in-flight head cannot be removed or
/// moved, and nothing may be moved in front of it.
#[derive(Debug, Default)]
pub struct MessageQueue {
    items: VecDeque<PendingMessage>,
    next_id: u64,
    in_flight: Option<QueueItemId>,
    policy: DuplicatePolicy,
}

impl MessageQueue {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn in_flight(&self) -> Option<QueueItemId> {
        self.in_flight
    }

    pub fn push(&mut self, text: &str) -> Result<QueueItemId, QueueError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueueError::EmptyInput);
        }
        if self.policy == DuplicatePolicy::RejectQueued
            && self.items.iter().any(|item| item.text == text)
        {
            return Err(QueueError::Duplicate);
        }

        self.next_id += 1;
        let id = QueueItemId(self.next_id);
        self.items.push_back(PendingMessage {
            id,
            text: text.to_string(),
        });
        Ok(id)
    }

    pub fn snapshot(&self) -> Vec<QueueSnapshotItem> {
        self.items
            .iter()
            .map(|item| QueueSnapshotItem {
                id: item.id,
                text: item.text.clone(),
                in_flight: self.in_flight == Some(item.id),
            })
            .collect()
    }

    pub fn remove_by_id(&mut self, id: QueueItemId) -> Result<String, QueueError> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(QueueError::NotFound)?;
        self.remove_at(index)
    }

    pub fn remove_at(&mut self, index: usize) -> Result<String, QueueError> {
        let item = self
            .items
            .get(index)
            .ok_or(QueueError::IndexOutOfRange { index })?;
        if self.in_flight == Some(item.id) {
            return Err(QueueError::ItemInFlight);
        }

        self.items
            .remove(index)
            .map(|item| item.text)
            .ok_or(QueueError::IndexOutOfRange { index })
    }

    /// Removes the first waiting item whose text matches after trimming.
    pub fn remove_text(&mut self, text: &str) -> Result<String, QueueError> {
        let text = text.trim();
        let in_flight = self.in_flight;
        let mut matched_in_flight = false;
        let index = self.items.iter().position(|item| {
            if item.text != text {
                return false;
            }
            if in_flight == Some(item.id) {
                matched_in_flight = true;
                return false;
            }
            true
        });

        match index {
            Some(index) => self.remove_at(index),
            None if matched_in_flight => Err(QueueError::ItemInFlight),
            None => Err(QueueError::NotFound),
        }
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<(), QueueError> {
        let len = self.items.len();
        if from >= len {
            return Err(QueueError::IndexOutOfRange { index: from });
        }
        if to >= len {
            return Err(QueueError::IndexOutOfRange { index: to });
        }
        if self.in_flight.is_some() && (from == 0 || to == 0) {
            return Err(QueueError::ItemInFlight);
        }

        if let Some(item) = self.items.remove(from) {
            self.items.insert(to, item);
        }
        Ok(())
    }

    /// Marks the head in flight and returns a copy, unless something already is.
    fn begin_head(&mut self) -> Option<PendingMessage> {
        if self.in_flight.is_some() {
            return None;
        }
        let head = self.items.front()?.clone();
        self.in_flight = Some(head.id);
        Some(head)
    }

    /// Drops the in-flight item, whichever way it ended.
    fn finish(&mut self, id: QueueItemId) -> bool {
        if self.in_flight != Some(id) {
            return false;
        }
        self.in_flight = None;
        match self.items.iter().position(|item| item.id == id) {
            Some(index) => self.items.remove(index).is_some(),
            None => false,
        }
    }
}

/// One dequeued message plus everything needed to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub item_id: QueueItemId,
    pub text: String,
    /// Trailing history window followed by the new user turn.
    pub context: Vec<ChatTurn>,
    pub conversation_id: Option<String>,
    pub active_integrations: Vec<IntegrationId>,
}

/// Queue, transcript and conversation bookkeeping for one chat session.
///
/// All transitions are synchronous; the session driver calls them under its
/// lock and performs network I/O between them.
#[derive(Debug)]
pub struct SessionState {
    queue: MessageQueue,
    transcript: Vec<ChatTurn>,
    conversation_id: Option<String>,
    active_integrations: BTreeSet<IntegrationId>,
    last_error: Option<String>,
    processing: bool,
    history_window: usize,
}

impl SessionState {
    pub fn new(history_window: usize, policy: DuplicatePolicy) -> Self {
        Self {
            queue: MessageQueue::new(policy),
            transcript: Vec::new(),
            conversation_id: None,
            active_integrations: BTreeSet::new(),
            last_error: None,
            processing: false,
            history_window,
        }
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut MessageQueue {
        &mut self.queue
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn active_integrations(&self) -> &BTreeSet<IntegrationId> {
        &self.active_integrations
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn is_idle(&self) -> bool {
        !self.processing && self.queue.is_empty()
    }

    pub fn enqueue(
        &mut self,
        text: &str,
        conversation_id_hint: Option<&str>,
    ) -> Result<QueueItemId, QueueError> {
        let id = self.queue.push(text)?;
        if let Some(hint) = conversation_id_hint {
            self.adopt_conversation_id(hint);
        }
        Ok(id)
    }

    /// Replaces an empty transcript with persisted turns.
    ///
    /// Returns false when the session already has turns.
    pub fn hydrate(&mut self, conversation_id: &str, turns: Vec<ChatTurn>) -> bool {
        if !self.transcript.is_empty() {
            return false;
        }
        self.transcript = turns;
        self.adopt_conversation_id(conversation_id);
        true
    }

    pub fn set_integration_active(&mut self, id: IntegrationId, active: bool) {
        if active {
            self.active_integrations.insert(id);
        } else {
            self.active_integrations.remove(&id);
        }
    }

    pub fn toggle_integration(&mut self, id: IntegrationId) -> bool {
        let active = !self.active_integrations.contains(&id);
        self.set_integration_active(id, active);
        active
    }

    /// Claims the single processing slot. Returns false if already claimed.
    pub fn try_start_processing(&mut self) -> bool {
        if self.processing {
            return false;
        }
        self.processing = true;
        true
    }

    pub fn stop_processing(&mut self) {
        self.processing = false;
    }

    /// Starts the next message: appends the user turn and snapshots the context.
    pub fn begin_next(&mut self) -> Option<Dispatch> {
        let head = self.queue.begin_head()?;
        self.last_error = None;

        let window_start = self.transcript.len().saturating_sub(self.history_window);
        let mut context = self.transcript[window_start..].to_vec();
        let user_turn = ChatTurn::user(head.text.clone());
        context.push(user_turn.clone());
        self.transcript.push(user_turn);

        Some(Dispatch {
            item_id: head.id,
            text: head.text,
            context,
            conversation_id: self.conversation_id.clone(),
            active_integrations: self.active_integrations.iter().copied().collect(),
        })
    }

    pub fn complete_success(
        &mut self,
        item_id: QueueItemId,
        content: String,
        conversation_id: Option<&str>,
    ) {
        self.transcript.push(ChatTurn::assistant(content));
        if let Some(conversation_id) = conversation_id {
            self.adopt_conversation_id(conversation_id);
        }
        self.queue.finish(item_id);
    }

    /// Records the error and drops the item. The user turn stays in the transcript.
    pub fn complete_failure(&mut self, item_id: QueueItemId, error: String) {
        self.last_error = Some(error);
        self.queue.finish(item_id);
    }

    fn adopt_conversation_id(&mut self, conversation_id: &str) {
        let trimmed = conversation_id.trim();
        if self.conversation_id.is_none() && !trimmed.is_empty() {
            self.conversation_id = Some(trimmed.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::models::{ChatTurn, IntegrationId, TurnRole};

    use super::{DuplicatePolicy, MessageQueue, SessionState};
    use crate::error::QueueError;

    #[test]
    fn push_trims_and_rejects_empty_and_duplicate_text() {
        let mut queue = MessageQueue::new(DuplicatePolicy::RejectQueued);

        assert_eq!(queue.push("   "), Err(QueueError::EmptyInput));
        queue.push("  hello ").expect("first push");
        assert_eq!(queue.push("hello"), Err(QueueError::Duplicate));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.snapshot()[0].text, "hello");
    }

    #[test]
    fn allow_policy_keeps_identical_text_as_separate_items() {
        let mut queue = MessageQueue::new(DuplicatePolicy::Allow);
        let first = queue.push("again").expect("push");
        let second = queue.push("again").expect("push");

        assert_ne!(first, second);
        queue.remove_by_id(second).expect("remove second");
        assert_eq!(queue.snapshot()[0].id, first);
    }

    #[test]
    fn in_flight_head_cannot_be_removed_or_moved() {
        let mut state = SessionState::new(20, DuplicatePolicy::RejectQueued);
        let head = state.enqueue("one", None).expect("enqueue");
        state.enqueue("two", None).expect("enqueue");
        state.enqueue("three", None).expect("enqueue");
        state.begin_next().expect("dispatch");

        let queue = state.queue_mut();
        assert_eq!(queue.remove_by_id(head), Err(QueueError::ItemInFlight));
        assert_eq!(queue.remove_at(0), Err(QueueError::ItemInFlight));
        assert_eq!(queue.remove_text("one"), Err(QueueError::ItemInFlight));
        assert_eq!(queue.move_item(2, 0), Err(QueueError::ItemInFlight));
        assert_eq!(queue.move_item(0, 1), Err(QueueError::ItemInFlight));

        queue.move_item(2, 1).expect("waiting items can be reordered");
        let order = queue
            .snapshot()
            .into_iter()
            .map(|item| (item.text, item.in_flight))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                ("one".to_string(), true),
                ("three".to_string(), false),
                ("two".to_string(), false),
            ]
        );
        assert_eq!(queue.remove_text("two"), Ok("two".to_string()));
        assert_eq!(queue.remove_at(5), Err(QueueError::IndexOutOfRange { index: 5 }));
    }

    #[test]
    fn begin_next_is_single_flight_and_appends_user_turn_first() {
        let mut state = SessionState::new(20, DuplicatePolicy::RejectQueued);
        state.enqueue("hello", None).expect("enqueue");
        state.enqueue("world", None).expect("enqueue");

        let dispatch = state.begin_next().expect("dispatch");
        assert_eq!(dispatch.text, "hello");
        assert!(state.begin_next().is_none());
        assert_eq!(state.transcript(), &[ChatTurn::user("hello")]);

        state.complete_success(dispatch.item_id, "ack:hello".to_string(), Some("conv-1"));
        let next = state.begin_next().expect("second dispatch");
        assert_eq!(next.text, "world");
        assert_eq!(next.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(
            next.context,
            vec![
                ChatTurn::user("hello"),
                ChatTurn::assistant("ack:hello"),
                ChatTurn::user("world"),
            ]
        );
    }

    #[test]
    fn context_is_history_window_plus_new_turn() {
        let mut state = SessionState::new(2, DuplicatePolicy::RejectQueued);
        state.hydrate(
            "conv-9",
            vec![
                ChatTurn::user("a"),
                ChatTurn::assistant("b"),
                ChatTurn::user("c"),
                ChatTurn::assistant("d"),
            ],
        );
        state.enqueue("e", None).expect("enqueue");

        let dispatch = state.begin_next().expect("dispatch");
        let contents = dispatch
            .context
            .iter()
            .map(|turn| turn.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["c", "d", "e"]);
        assert_eq!(dispatch.context[2].role, TurnRole::User);
    }

    #[test]
    fn failure_drops_item_keeps_user_turn_and_records_error() {
        let mut state = SessionState::new(20, DuplicatePolicy::RejectQueued);
        state.enqueue("bad request", None).expect("enqueue");
        let dispatch = state.begin_next().expect("dispatch");

        state.complete_failure(dispatch.item_id, "server error".to_string());

        assert!(state.queue().is_empty());
        assert_eq!(state.last_error(), Some("server error"));
        assert_eq!(state.transcript(), &[ChatTurn::user("bad request")]);

        state.enqueue("retry by hand", None).expect("enqueue");
        state.begin_next().expect("dispatch");
        assert_eq!(state.last_error(), None);
    }

    #[test]
    fn conversation_id_is_never_reassigned() {
        let mut state = SessionState::new(20, DuplicatePolicy::RejectQueued);
        state.enqueue("hi", Some("hint-1")).expect("enqueue");
        let dispatch = state.begin_next().expect("dispatch");
        state.complete_success(dispatch.item_id, "hello".to_string(), Some("server-2"));

        assert_eq!(state.conversation_id(), Some("hint-1"));
        assert!(!state.hydrate("other", vec![ChatTurn::user("x")]));
    }

    #[test]
    fn toggle_integration_flips_membership() {
        let mut state = SessionState::new(20, DuplicatePolicy::RejectQueued);
        assert!(state.toggle_integration(IntegrationId::Calendar));
        state.set_integration_active(IntegrationId::Mermaid, true);
        assert_eq!(state.active_integrations().len(), 2);
        assert!(!state.toggle_integration(IntegrationId::Calendar));
        assert!(!state.active_integrations().contains(&IntegrationId::Calendar));
    }
}
