use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::{DetectorConfig, DriverConfig};
use crate::detector::CompletionDetector;
use crate::error::DriverError;
use crate::page::Page;
use crate::selectors::SiteProfile;
use crate::types::{ProcessRequest, ProcessResponse};

/// Submits one prompt into the chat page and waits for the answer.
///
/// Stateless between calls except for the detector's seen-images set.
pub struct PageDriver<P: Page> {
    page: P,
    profile: Arc<SiteProfile>,
    config: DriverConfig,
    detector: CompletionDetector,
}

impl<P: Page> PageDriver<P> {
    /// Create a driver with default timings.
    pub fn new(page: P, profile: SiteProfile) -> Self {
        let profile = Arc::new(profile);
        Self {
            page,
            detector: CompletionDetector::new(DetectorConfig::default(), Arc::clone(&profile)),
            profile,
            config: DriverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_detector_config(mut self, config: DetectorConfig) -> Self {
        self.detector = CompletionDetector::new(config, Arc::clone(&self.profile));
        self
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn detector(&self) -> &CompletionDetector {
        &self.detector
    }

    /// Give back the page, e.g. to close the WebDriver session.
    pub fn into_page(self) -> P {
        self.page
    }

    /// Answer one bridge request.
    pub async fn handle(&mut self, request: ProcessRequest) -> ProcessResponse {
        info!(prompt = %request.prompt_text, image_mode = request.image_mode, "received message to process");
        let result = self.submit(&request.prompt_text, request.image_mode).await;
        match &result {
            Ok(()) => info!("message processed"),
            Err(e) => error!(error = %e, "message processing failed"),
        }
        result.into()
    }

    /// Inject `prompt`, press send, and wait for the response to complete.
    pub async fn submit(&mut self, prompt: &str, image_mode: bool) -> Result<(), DriverError> {
        if prompt.trim().is_empty() {
            return Err(DriverError::InvalidInput(
                "Invalid message: cannot be empty".into(),
            ));
        }
        self.check_site().await?;

        if image_mode {
            self.detector.snapshot_images(&self.page).await?;
        }

        let input = self.locate_input().await?;
        self.page.inject_text(&input, prompt).await?;
        debug!("message set in input");

        sleep(self.config.settle_delay).await;

        let button = self.locate_submit().await?;
        sleep(self.config.pre_click_delay).await;
        self.page.click(&button).await?;
        debug!("send button clicked, waiting for response");

        self.detector.await_completion(&self.page, image_mode).await
    }

    async fn check_site(&self) -> Result<(), DriverError> {
        let current = self.page.current_url().await?;
        let host = url::Url::parse(&current)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default();

        if self.profile.matches_host(&host) {
            Ok(())
        } else {
            Err(DriverError::InvalidInput(format!(
                "Not on {} (page is {})",
                self.profile.host, current
            )))
        }
    }

    async fn locate_input(&self) -> Result<P::Element, DriverError> {
        for strategy in &self.profile.input {
            if let Some(element) = self.page.find_first(strategy).await? {
                debug!(%strategy, "found input");
                return Ok(element);
            }
        }
        Err(DriverError::ElementNotFound("Input control".into()))
    }

    async fn locate_submit(&self) -> Result<P::Element, DriverError> {
        for strategy in &self.profile.submit {
            if let Some(button) = self.page.find_first(strategy).await? {
                if !self.page.is_disabled(&button).await? {
                    debug!(%strategy, "found send button");
                    return Ok(button);
                }
                debug!(%strategy, "send button disabled, trying next selector");
            }
        }
        Err(DriverError::ElementNotFound("Send button".into()))
    }
}
