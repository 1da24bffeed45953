use tokio::sync::broadcast;

/// Notified after each successful exchange so a conversation list can refresh.
///
/// Calls are fire-and-forget; implementations must not block.
pub trait ConversationListener: Send + Sync {
    fn message_sent(&self, conversation_id: Option<&str>);
}

/// Publishes the conversation id of every successful exchange.
#[derive(Debug, Clone)]
pub struct BroadcastConversationListener {
    sender: broadcast::Sender<Option<String>>,
}

impl BroadcastConversationListener {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Option<String>> {
        self.sender.subscribe()
    }
}

impl ConversationListener for BroadcastConversationListener {
    fn message_sent(&self, conversation_id: Option<&str>) {
        // No subscribers is fine.
        let _ = self.sender.send(conversation_id.map(ToString::to_string));
    }
}
