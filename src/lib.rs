//! # Prompt Queue
//!
//! Queue text prompts and submit them one at a time into a chat web page,
//! waiting for each response to finish before sending the next.
//!
//! ## Features
//!
//! - Strict FIFO processing with bounded retries and growing backoff
//! - SQLite persistence of the queue and settings across restarts
//! - Response completion detection with an optional image-generation wait
//! - Data-driven selector tables, so a page layout change is a profile edit
//! - Import/export in a small JSON format, plus clipboard list parsing
//! - Pause/resume without losing in-flight retry counts
//!
//! ## Architecture
//!
//! Two sequential contexts talk over a message channel:
//!
//! 1. The [`QueueProcessor`] owns the queue and the retry ledger and decides
//!    what to send next.
//! 2. A [`DriverHost`] owns a [`PageDriver`] bound to a [`Page`] (a WebDriver
//!    session in production) and answers one request at a time.
//!
//! [`bridge::connect()`] wires the two together.

pub mod bridge;
pub mod config;
pub mod db;
pub mod detector;
pub mod driver;
pub mod error;
pub mod events;
pub mod page;
pub mod processor;
pub mod selectors;
pub mod store;
pub mod transfer;
pub mod types;

pub use bridge::{ChannelBridge, Detached, DriverHost, Transport};
pub use config::{
    DetectorConfig, DetectorConfigBuilder, DriverConfig, ProcessorConfig, ProcessorConfigBuilder,
};
pub use detector::{CompletionDetector, SeenImages};
pub use driver::PageDriver;
pub use error::{DriverError, QueueError, TransportError};
pub use events::QueueEvent;
pub use page::{Page, WebDriverPage};
pub use processor::{QueueProcessor, StartOutcome};
pub use selectors::{SiteProfile, Strategy};
pub use store::{MemoryStore, QueueStore, SqliteStore, StoredState};
pub use transfer::QueueFile;
pub use types::{ProcessRequest, ProcessResponse, QueueSnapshot};
