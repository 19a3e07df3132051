use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::error::DriverError;
use crate::page::Page;
use crate::selectors::{ImageMatchers, SiteProfile};

/// Distinct generated-image sources seen in the current conversation view.
///
/// Lives for one page session and is never persisted.
#[derive(Debug, Default)]
pub struct SeenImages {
    sources: HashSet<String>,
}

impl SeenImages {
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Forget everything and recount from the page. Returns the new size.
    pub async fn recount<P: Page>(
        &mut self,
        page: &P,
        matchers: &ImageMatchers,
    ) -> Result<usize, DriverError> {
        self.sources.clear();
        for strategy in &matchers.selectors {
            for src in page.image_sources(strategy).await? {
                if matchers.accepts(&src) {
                    self.sources.insert(src);
                }
            }
        }
        Ok(self.sources.len())
    }
}

/// Infers when the remote page has finished answering.
pub struct CompletionDetector {
    config: DetectorConfig,
    profile: Arc<SiteProfile>,
    seen: SeenImages,
}

impl CompletionDetector {
    pub fn new(config: DetectorConfig, profile: Arc<SiteProfile>) -> Self {
        Self {
            config,
            profile,
            seen: SeenImages::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn seen_images(&self) -> &SeenImages {
        &self.seen
    }

    /// Reset the seen-images set to what is on the page right now.
    ///
    /// In image mode this baseline is taken before the prompt is submitted,
    /// so an image that appears while the answer streams still counts as new.
    pub async fn snapshot_images<P: Page>(&mut self, page: &P) -> Result<usize, DriverError> {
        let count = self.seen.recount(page, &self.profile.images).await?;
        info!(count, "current image count");
        Ok(count)
    }

    /// Poll until the response is stable.
    ///
    /// Stable means no streaming indicator, an unchanged assistant message
    /// count, and at least `stable_floor` elapsed since the first check.
    /// Fails with [`DriverError::Timeout`] once `ceiling` has passed. In image
    /// mode a stable response additionally waits for a new image; running out
    /// of image checks is logged and the response still counts as complete.
    pub async fn await_completion<P: Page>(
        &mut self,
        page: &P,
        image_mode: bool,
    ) -> Result<(), DriverError> {
        let started = Instant::now();
        let mut checks: u32 = 0;
        let mut last_count: usize = 0;

        debug!("starting response check");
        loop {
            if checks > 0 && started.elapsed() >= self.config.ceiling {
                warn!(
                    ceiling_s = self.config.ceiling.as_secs(),
                    checks, "response did not complete in time"
                );
                return Err(DriverError::Timeout);
            }
            checks += 1;

            let streaming = self.is_streaming(page).await?;
            let count = page.count(&self.profile.assistant_messages).await?;
            let changed = count != last_count;
            last_count = count;

            let tick = if !streaming && !changed {
                if started.elapsed() >= self.config.stable_floor {
                    if image_mode {
                        info!("checking for image generation");
                        match self.wait_for_image(page).await {
                            Ok(new_images) => info!(new_images, "new image detected"),
                            Err(e) => warn!(error = %e, "image wait gave up, continuing anyway"),
                        }
                    }
                    info!(
                        checks,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "response complete"
                    );
                    return Ok(());
                }
                debug!("waiting for response stabilization");
                self.config.stabilizing_tick
            } else {
                if checks % 10 == 0 {
                    info!(
                        elapsed_s = started.elapsed().as_secs(),
                        "assistant still responding"
                    );
                }
                self.config.streaming_tick
            };

            sleep(tick).await;
        }
    }

    /// Wait for the distinct image count to grow past the current baseline.
    ///
    /// Checks every `image_poll_interval`, at most `image_poll_attempts`
    /// times. Returns how many new images appeared.
    pub async fn wait_for_image<P: Page>(&mut self, page: &P) -> Result<usize, DriverError> {
        let baseline = self.seen.len();
        let attempts = self.config.image_poll_attempts;
        debug!(baseline, "initial image count");

        for attempt in 1..=attempts {
            sleep(self.config.image_poll_interval).await;

            let current = self.seen.recount(page, &self.profile.images).await?;
            debug!(attempt, attempts, current, baseline, "image check");
            if current > baseline {
                return Ok(current - baseline);
            }
        }

        Err(DriverError::ImageTimeout)
    }

    async fn is_streaming<P: Page>(&self, page: &P) -> Result<bool, DriverError> {
        for strategy in &self.profile.streaming {
            if page.find_first(strategy).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
