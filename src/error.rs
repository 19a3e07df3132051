use thiserror::Error;

/// Errors that can occur in the queue system.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid queue file format")]
    InvalidQueueFile,

    #[error("Error importing queue file: {0}")]
    Unreadable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index {index} out of bounds (queue holds {len} messages)")]
    OutOfBounds { index: usize, len: usize },

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for QueueError {
    fn from(err: anyhow::Error) -> Self {
        QueueError::Other(format!("{:#}", err))
    }
}

/// Outcome kinds of one submission attempt on the page side.
///
/// Everything except [`DriverError::ImageTimeout`] fails the attempt and is
/// fed through the processor's retry policy. `ImageTimeout` is soft: the
/// completion detector logs it and resolves anyway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Empty or non-text prompt, or the page is not the target site.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// None of the selector strategies matched.
    #[error("{0} not found. The page layout may have changed.")]
    ElementNotFound(String),

    /// The response never stabilized within the completion ceiling.
    #[error("Response timeout")]
    Timeout,

    /// No new generated image appeared within the image-wait attempts.
    #[error("Image generation timeout")]
    ImageTimeout,

    /// The driver context could not be reached.
    #[error("Connection error")]
    Connection,

    /// A WebDriver command failed.
    #[error("Page command failed: {0}")]
    Page(String),
}

impl DriverError {
    /// The reason string carried back in a failed response.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl From<fantoccini::error::CmdError> for DriverError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        DriverError::Page(err.to_string())
    }
}

/// Failures of the bridge between the processor and driver contexts.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("driver context unreachable")]
    Unreachable,

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
