use std::time::Duration;

/// Smallest accepted settle wait between two successful submissions.
pub const MIN_WAIT_FLOOR: Duration = Duration::from_millis(1000);

/// Configuration for the queue processor.
///
/// Use [`ProcessorConfig::builder()`] for ergonomic construction, or
/// [`ProcessorConfig::default()`] for the stock retry policy (3 retries,
/// 2s backoff step, 2s drop delay, 3s settle wait).
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Retries allowed after the first failed attempt before the item is dropped.
    pub max_retries: u32,

    /// Backoff before retry `n` is `n * backoff_step`.
    pub backoff_step: Duration,

    /// Pause after dropping an item, before the next head is attempted.
    pub drop_delay: Duration,

    /// Settle wait used when the store has no saved value.
    pub default_min_wait: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_step: Duration::from_millis(2000),
            drop_delay: Duration::from_millis(2000),
            default_min_wait: Duration::from_millis(3000),
        }
    }
}

impl ProcessorConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }

    /// Backoff delay before the given retry (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff_step * retry
    }
}

/// Builder for [`ProcessorConfig`].
#[derive(Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    /// Set how many retries follow the first failed attempt.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.config.max_retries = max;
        self
    }

    /// Set the linear backoff step.
    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.config.backoff_step = step;
        self
    }

    /// Set the delay after an item is dropped.
    pub fn with_drop_delay(mut self, delay: Duration) -> Self {
        self.config.drop_delay = delay;
        self
    }

    /// Set the settle wait used when nothing is persisted yet.
    pub fn with_default_min_wait(mut self, wait: Duration) -> Self {
        self.config.default_min_wait = clamp_min_wait(wait);
        self
    }

    /// Build the final [`ProcessorConfig`].
    pub fn build(self) -> ProcessorConfig {
        self.config
    }
}

/// Clamp a settle wait to [`MIN_WAIT_FLOOR`].
pub fn clamp_min_wait(wait: Duration) -> Duration {
    wait.max(MIN_WAIT_FLOOR)
}

/// Timing of the completion detector.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Hard ceiling for the response to stabilize, measured from the first check.
    pub ceiling: Duration,

    /// The response is never declared stable before this much time has passed.
    pub stable_floor: Duration,

    /// Poll interval while nothing changes but the floor is not reached yet.
    pub stabilizing_tick: Duration,

    /// Poll interval while the page is streaming or adding messages.
    pub streaming_tick: Duration,

    /// Interval between image-count checks in image mode.
    pub image_poll_interval: Duration,

    /// Image-count checks before giving up on a new image.
    pub image_poll_attempts: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(120),
            stable_floor: Duration::from_millis(2000),
            stabilizing_tick: Duration::from_millis(300),
            streaming_tick: Duration::from_millis(500),
            image_poll_interval: Duration::from_millis(6000),
            image_poll_attempts: 10,
        }
    }
}

impl DetectorConfig {
    pub fn builder() -> DetectorConfigBuilder {
        DetectorConfigBuilder::default()
    }
}

/// Builder for [`DetectorConfig`].
#[derive(Default)]
pub struct DetectorConfigBuilder {
    config: DetectorConfig,
}

impl DetectorConfigBuilder {
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.config.ceiling = ceiling;
        self
    }

    pub fn with_stable_floor(mut self, floor: Duration) -> Self {
        self.config.stable_floor = floor;
        self
    }

    pub fn with_ticks(mut self, stabilizing: Duration, streaming: Duration) -> Self {
        self.config.stabilizing_tick = stabilizing;
        self.config.streaming_tick = streaming;
        self
    }

    pub fn with_image_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.config.image_poll_interval = interval;
        self.config.image_poll_attempts = attempts;
        self
    }

    pub fn build(self) -> DetectorConfig {
        self.config
    }
}

/// Fixed delays of the page driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Wait after injecting text before looking for the submit control.
    pub settle_delay: Duration,

    /// Short pause right before activating the submit control.
    pub pre_click_delay: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1000),
            pre_click_delay: Duration::from_millis(100),
        }
    }
}
