use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bridge::Transport;
use crate::config::{clamp_min_wait, ProcessorConfig};
use crate::error::{DriverError, QueueError};
use crate::events::QueueEvent;
use crate::store::QueueStore;
use crate::transfer::QueueFile;
use crate::types::{ProcessRequest, QueueSnapshot};

const EVENT_CAPACITY: usize = 64;

/// Result of asking the processor to start draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyProcessing,
    QueueEmpty,
}

struct ProcessorState {
    queue: VecDeque<String>,
    /// Whether the user wants the queue drained.
    draining: bool,
    /// Whether a drain task exists. Can outlive `draining` while a paused
    /// task waits for its in-flight attempt.
    loop_active: bool,
    min_wait: Duration,
    image_mode: bool,
    /// Attempt-chain of the current head, created on its first attempt.
    head_chain: Option<Uuid>,
    retries: HashMap<Uuid, u32>,
}

impl ProcessorState {
    fn forget_head(&mut self) {
        if let Some(chain) = self.head_chain.take() {
            self.retries.remove(&chain);
        }
    }

    fn queue_vec(&self) -> Vec<String> {
        self.queue.iter().cloned().collect()
    }
}

struct Attempt {
    chain: Uuid,
    prompt: String,
    remaining: usize,
    image_mode: bool,
}

/// Drains the prompt queue one item at a time through a [`Transport`].
///
/// Owns the queue, the retry ledger and the settings. Every queue mutation
/// is written through to the [`QueueStore`] and announced as
/// [`QueueEvent::QueueChanged`].
///
/// # Example
///
/// ```ignore
/// let store = SqliteStore::open(Some(Path::new("queue.db")))?;
/// let processor = Arc::new(QueueProcessor::new(store, bridge, ProcessorConfig::default())?);
/// processor.push("Explain photosynthesis")?;
/// processor.start();
/// processor.wait_until_idle().await;
/// ```
pub struct QueueProcessor<S: QueueStore, T: Transport> {
    store: S,
    transport: T,
    config: ProcessorConfig,
    state: Mutex<ProcessorState>,
    events: broadcast::Sender<QueueEvent>,
    /// `true` while no drain task exists. Flipped under the state lock.
    idle: watch::Sender<bool>,
}

impl<S, T> QueueProcessor<S, T>
where
    S: QueueStore + 'static,
    T: Transport + 'static,
{
    /// Create a processor, restoring the queue and settings from `store`.
    ///
    /// Retry counts are never restored; every item starts a fresh chain.
    pub fn new(store: S, transport: T, config: ProcessorConfig) -> Result<Self, QueueError> {
        let saved = store.load()?;
        if !saved.queue.is_empty() {
            info!(count = saved.queue.len(), "restored queued messages");
        }

        let state = ProcessorState {
            queue: saved.queue.into(),
            draining: false,
            loop_active: false,
            min_wait: clamp_min_wait(saved.min_wait.unwrap_or(config.default_min_wait)),
            image_mode: saved.image_mode.unwrap_or(false),
            head_chain: None,
            retries: HashMap::new(),
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (idle, _) = watch::channel(true);

        Ok(Self {
            store,
            transport,
            config,
            state: Mutex::new(state),
            events,
            idle,
        })
    }

    /// Receive queue and status notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let st = self.lock();
        QueueSnapshot {
            queue: st.queue_vec(),
            processing: st.draining,
            min_wait: st.min_wait,
            image_mode: st.image_mode,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.lock().draining
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Retries already spent on the current head's attempt-chain.
    pub fn retry_count_for_head(&self) -> u32 {
        let st = self.lock();
        st.head_chain
            .and_then(|chain| st.retries.get(&chain).copied())
            .unwrap_or(0)
    }

    // ── Queue editing ──────────────────────────────────────────────

    /// Append one message. Surrounding whitespace is trimmed; blank input is
    /// ignored and returns `false`.
    pub fn push(&self, message: &str) -> Result<bool, QueueError> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(false);
        }
        let mut st = self.lock();
        st.queue.push_back(message.to_string());
        self.persist(&mut st)?;
        Ok(true)
    }

    /// Append several messages with a single write. Returns how many were added.
    pub fn append<I>(&self, messages: I) -> Result<usize, QueueError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut st = self.lock();
        let before = st.queue.len();
        st.queue.extend(
            messages
                .into_iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
        );
        let added = st.queue.len() - before;
        if added > 0 {
            self.persist(&mut st)?;
        }
        Ok(added)
    }

    /// Remove the message at `index`.
    pub fn remove(&self, index: usize) -> Result<String, QueueError> {
        let mut st = self.lock();
        let len = st.queue.len();
        let removed = st
            .queue
            .remove(index)
            .ok_or(QueueError::OutOfBounds { index, len })?;
        if index == 0 {
            st.forget_head();
        }
        self.persist(&mut st)?;
        Ok(removed)
    }

    /// Remove every message.
    pub fn clear(&self) -> Result<(), QueueError> {
        {
            let mut st = self.lock();
            st.queue.clear();
            st.forget_head();
            self.persist(&mut st)?;
        }
        self.status("Queue cleared");
        Ok(())
    }

    /// Replace the whole queue, optionally with a new settle wait.
    pub fn replace(&self, queue: Vec<String>, min_wait: Option<Duration>) -> Result<(), QueueError> {
        let mut st = self.lock();
        st.queue = queue.into();
        st.forget_head();
        if let Some(wait) = min_wait {
            st.min_wait = clamp_min_wait(wait);
            self.store.save_min_wait(st.min_wait)?;
        }
        self.persist(&mut st)
    }

    /// Load an imported queue file, replacing the current queue.
    pub fn import(&self, file: QueueFile) -> Result<(), QueueError> {
        let count = file.queue.len();
        self.replace(file.queue, file.wait_time.map(Duration::from_millis))?;
        info!(count, "queue imported");
        self.status("Queue imported successfully");
        Ok(())
    }

    /// The current queue and settle wait in export form.
    pub fn export(&self) -> QueueFile {
        let st = self.lock();
        QueueFile {
            queue: st.queue_vec(),
            wait_time: Some(st.min_wait.as_millis() as u64),
        }
    }

    // ── Settings ───────────────────────────────────────────────────

    /// Set the settle wait between successes. Values under one second are
    /// raised to one second. Returns the value applied.
    pub fn set_min_wait(&self, wait: Duration) -> Result<Duration, QueueError> {
        let applied = clamp_min_wait(wait);
        self.lock().min_wait = applied;
        self.store.save_min_wait(applied)?;
        self.status(format!(
            "Minimum wait time set to {} seconds",
            applied.as_secs_f64()
        ));
        Ok(applied)
    }

    pub fn min_wait(&self) -> Duration {
        self.lock().min_wait
    }

    pub fn set_image_mode(&self, enabled: bool) -> Result<(), QueueError> {
        self.lock().image_mode = enabled;
        self.store.save_image_mode(enabled)?;
        self.status(format!(
            "Image queue mode {}",
            if enabled { "enabled" } else { "disabled" }
        ));
        Ok(())
    }

    pub fn image_mode(&self) -> bool {
        self.lock().image_mode
    }

    // ── Processing ─────────────────────────────────────────────────

    /// Begin draining the queue.
    ///
    /// If a paused drain task is still waiting on its in-flight attempt,
    /// that task is re-armed instead of spawning a second one, so there is
    /// never more than one attempt in flight.
    pub fn start(self: &Arc<Self>) -> StartOutcome {
        let spawn_task = {
            let mut st = self.lock();
            if st.draining {
                return StartOutcome::AlreadyProcessing;
            }
            if st.queue.is_empty() {
                drop(st);
                self.status("Queue is empty");
                return StartOutcome::QueueEmpty;
            }
            st.draining = true;
            let spawn_task = !st.loop_active;
            st.loop_active = true;
            self.idle.send_replace(false);
            self.emit_changed(&st);
            spawn_task
        };

        if spawn_task {
            tokio::spawn(Arc::clone(self).drain());
        } else {
            debug!("re-armed drain task that is still finishing an attempt");
        }
        StartOutcome::Started
    }

    /// Stop scheduling further attempts. The queue is left untouched and an
    /// attempt already in flight runs to completion. Returns whether the
    /// processor was draining.
    pub fn pause(&self) -> bool {
        let was_draining = {
            let mut st = self.lock();
            let was = st.draining;
            st.draining = false;
            if was {
                self.emit_changed(&st);
            }
            was
        };
        if was_draining {
            self.status("Processing paused");
        }
        was_draining
    }

    /// Pause when draining, start otherwise. Returns whether the processor
    /// is draining afterwards.
    pub fn toggle(self: &Arc<Self>) -> bool {
        if self.pause() {
            false
        } else {
            self.start() == StartOutcome::Started
        }
    }

    /// Wait for the drain task to exit (queue emptied, or paused and the
    /// pending step finished).
    ///
    /// Cancel-safe: dropping the future leaves nothing behind, so a later
    /// call still waits for the same task.
    pub async fn wait_until_idle(&self) {
        let mut idle = self.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    async fn drain(self: Arc<Self>) {
        debug!("drain task started");
        while let Some(attempt) = self.next_attempt() {
            self.status(format!(
                "Processing ({} remaining): {}",
                attempt.remaining, attempt.prompt
            ));
            let _ = self.events.send(QueueEvent::AttemptStarted {
                prompt: attempt.prompt.clone(),
                remaining: attempt.remaining,
            });

            let suspend_for = match self.run_attempt(&attempt).await {
                Ok(()) => self.on_success(&attempt),
                Err(reason) => self.on_failure(&attempt, reason),
            };

            // Plain suspension; the draining flag is checked when it ends.
            if let Some(delay) = suspend_for {
                sleep(delay).await;
            }
        }
        debug!("drain task stopped");
    }

    /// Decide what to do at the top of each step. `None` ends the task.
    fn next_attempt(&self) -> Option<Attempt> {
        let mut st = self.lock();

        if !st.draining {
            st.loop_active = false;
            self.idle.send_replace(true);
            drop(st);
            let _ = self.events.send(QueueEvent::Idle);
            return None;
        }

        if st.queue.is_empty() {
            st.draining = false;
            st.loop_active = false;
            self.idle.send_replace(true);
            st.head_chain = None;
            st.retries.clear();
            self.emit_changed(&st);
            drop(st);
            self.status("Queue processing complete");
            let _ = self.events.send(QueueEvent::Idle);
            return None;
        }

        let chain = *st.head_chain.get_or_insert_with(Uuid::new_v4);
        Some(Attempt {
            chain,
            prompt: st.queue[0].clone(),
            remaining: st.queue.len(),
            image_mode: st.image_mode,
        })
    }

    async fn run_attempt(&self, attempt: &Attempt) -> Result<(), String> {
        let request = ProcessRequest::new(attempt.prompt.clone(), attempt.image_mode);
        match self.transport.dispatch(request).await {
            Ok(response) if response.success => Ok(()),
            Ok(response) => Err(response.error.unwrap_or_else(|| "Unknown error".to_string())),
            Err(e) => {
                warn!(error = %e, "could not reach the page driver");
                Err(DriverError::Connection.reason())
            }
        }
    }

    fn on_success(&self, attempt: &Attempt) -> Option<Duration> {
        let mut st = self.lock();
        if st.head_chain == Some(attempt.chain) {
            st.queue.pop_front();
            st.forget_head();
            if let Err(e) = self.persist(&mut st) {
                error!(error = %e, "failed to persist queue after success");
            }
        } else {
            debug!("head was edited while its attempt was in flight");
        }
        let _ = self.events.send(QueueEvent::AttemptSucceeded {
            prompt: attempt.prompt.clone(),
        });

        if st.draining && !st.queue.is_empty() {
            let wait = st.min_wait;
            drop(st);
            self.status(format!(
                "Success! Waiting {}s before next message...",
                wait.as_secs_f64()
            ));
            Some(wait)
        } else {
            None
        }
    }

    fn on_failure(&self, attempt: &Attempt, reason: String) -> Option<Duration> {
        let mut st = self.lock();
        if st.head_chain != Some(attempt.chain) {
            debug!(%reason, "ignoring failure for an item no longer at the head");
            return None;
        }

        let max = self.config.max_retries;
        let spent = st.retries.get(&attempt.chain).copied().unwrap_or(0);

        if spent < max {
            let retry = spent + 1;
            st.retries.insert(attempt.chain, retry);
            drop(st);

            let delay = self.config.backoff_for(retry);
            self.status(format!(
                "Error: {}. Retry {}/{} in {}s...",
                reason,
                retry,
                max,
                delay.as_secs_f64()
            ));
            let _ = self.events.send(QueueEvent::AttemptFailed {
                prompt: attempt.prompt.clone(),
                reason,
                retry,
                delay_ms: delay.as_millis() as u64,
            });
            Some(delay)
        } else {
            st.queue.pop_front();
            st.forget_head();
            if let Err(e) = self.persist(&mut st) {
                error!(error = %e, "failed to persist queue after dropping message");
            }
            drop(st);

            warn!(prompt = %attempt.prompt, %reason, "dropping message after exhausting retries");
            self.status(format!(
                "Failed after {} retries: {}. Skipping message.",
                max, reason
            ));
            let _ = self.events.send(QueueEvent::Dropped {
                prompt: attempt.prompt.clone(),
                reason,
            });
            Some(self.config.drop_delay)
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, ProcessorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write the queue through to the store and request a redraw.
    fn persist(&self, st: &mut ProcessorState) -> Result<(), QueueError> {
        let saved = self.store.save_queue(st.queue.make_contiguous());
        self.emit_changed(st);
        saved
    }

    fn emit_changed(&self, st: &ProcessorState) {
        let _ = self.events.send(QueueEvent::QueueChanged {
            queue: st.queue_vec(),
            processing: st.draining,
        });
    }

    fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        let _ = self.events.send(QueueEvent::status(message));
    }
}
