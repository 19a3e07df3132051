use serde::{Deserialize, Serialize};

/// Notifications broadcast by the [`QueueProcessor`](crate::QueueProcessor)
/// to whatever renders the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    /// The queue or the processing flag changed; redraw the list.
    #[serde(rename_all = "camelCase")]
    QueueChanged { queue: Vec<String>, processing: bool },

    /// A line of status text for the user.
    Status { message: String },

    /// An attempt for the head item was sent to the driver.
    #[serde(rename_all = "camelCase")]
    AttemptStarted { prompt: String, remaining: usize },

    /// The head item was submitted and its response completed.
    AttemptSucceeded { prompt: String },

    /// An attempt failed and will be retried.
    #[serde(rename_all = "camelCase")]
    AttemptFailed {
        prompt: String,
        reason: String,
        retry: u32,
        delay_ms: u64,
    },

    /// The head item exhausted its retries and was removed.
    Dropped { prompt: String, reason: String },

    /// The drain loop stopped, either paused or with an empty queue.
    Idle,
}

impl QueueEvent {
    pub(crate) fn status(message: impl Into<String>) -> Self {
        QueueEvent::Status {
            message: message.into(),
        }
    }
}
