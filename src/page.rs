use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use std::future::Future;
use tracing::debug;

use crate::error::DriverError;
use crate::selectors::Strategy;

/// The handful of DOM operations the driver and detector need.
///
/// Implemented over WebDriver by [`WebDriverPage`]; tests supply an
/// in-memory page.
pub trait Page: Send + Sync {
    /// Handle to an element found on the page.
    type Element: Send + Sync;

    /// URL of the document currently loaded.
    fn current_url(&self) -> impl Future<Output = Result<String, DriverError>> + Send;

    /// Every element matching the strategy, in document order.
    fn find_all(
        &self,
        strategy: &Strategy,
    ) -> impl Future<Output = Result<Vec<Self::Element>, DriverError>> + Send;

    /// Focus the control, replace its content with `text`, and dispatch the
    /// input-change events the host page listens for.
    fn inject_text(
        &self,
        element: &Self::Element,
        text: &str,
    ) -> impl Future<Output = Result<(), DriverError>> + Send;

    fn is_disabled(
        &self,
        element: &Self::Element,
    ) -> impl Future<Output = Result<bool, DriverError>> + Send;

    fn click(&self, element: &Self::Element)
        -> impl Future<Output = Result<(), DriverError>> + Send;

    /// Resolved `src` of every image matching the strategy.
    fn image_sources(
        &self,
        strategy: &Strategy,
    ) -> impl Future<Output = Result<Vec<String>, DriverError>> + Send;

    /// First element matching the strategy, if any.
    fn find_first(
        &self,
        strategy: &Strategy,
    ) -> impl Future<Output = Result<Option<Self::Element>, DriverError>> + Send {
        async move { Ok(self.find_all(strategy).await?.into_iter().next()) }
    }

    /// Number of elements matching the strategy.
    fn count(&self, strategy: &Strategy) -> impl Future<Output = Result<usize, DriverError>> + Send {
        async move { Ok(self.find_all(strategy).await?.len()) }
    }
}

const INJECT_SCRIPT: &str = r#"
const el = arguments[0];
const text = arguments[1];
el.focus();
el.click();
if (el.tagName === 'TEXTAREA' || el.tagName === 'INPUT') {
  el.value = text;
} else {
  el.textContent = text;
}
el.dispatchEvent(new InputEvent('input', {
  bubbles: true,
  cancelable: true,
  inputType: 'insertText',
  data: text
}));
el.dispatchEvent(new Event('textChange', { bubbles: true }));
"#;

/// [`Page`] backed by a WebDriver session.
pub struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    /// Connect to a running WebDriver server (chromedriver, geckodriver).
    pub async fn connect(webdriver_url: &str) -> Result<Self, DriverError> {
        let client = ClientBuilder::native()
            .connect(webdriver_url)
            .await
            .map_err(|e| DriverError::Page(format!("WebDriver connection failed: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing session.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Navigate the session to `url`.
    pub async fn open(&self, url: &str) -> Result<(), DriverError> {
        debug!(url, "navigating");
        self.client.goto(url).await?;
        Ok(())
    }

    /// End the WebDriver session.
    pub async fn close(self) -> Result<(), DriverError> {
        self.client.close().await?;
        Ok(())
    }
}

fn locator(strategy: &Strategy) -> Locator<'_> {
    match strategy {
        Strategy::Css(expr) => Locator::Css(expr),
        Strategy::XPath(expr) => Locator::XPath(expr),
    }
}

impl Page for WebDriverPage {
    type Element = Element;

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.client.current_url().await?.to_string())
    }

    async fn find_all(&self, strategy: &Strategy) -> Result<Vec<Element>, DriverError> {
        Ok(self.client.find_all(locator(strategy)).await?)
    }

    async fn inject_text(&self, element: &Element, text: &str) -> Result<(), DriverError> {
        let target = serde_json::to_value(element)
            .map_err(|e| DriverError::Page(format!("cannot pass element to script: {}", e)))?;
        self.client
            .execute(INJECT_SCRIPT, vec![target, serde_json::Value::from(text)])
            .await?;
        Ok(())
    }

    async fn is_disabled(&self, element: &Element) -> Result<bool, DriverError> {
        Ok(!element.is_enabled().await?)
    }

    async fn click(&self, element: &Element) -> Result<(), DriverError> {
        element.click().await?;
        Ok(())
    }

    async fn image_sources(&self, strategy: &Strategy) -> Result<Vec<String>, DriverError> {
        let mut sources = Vec::new();
        for image in self.client.find_all(locator(strategy)).await? {
            // Images can be replaced between the lookup and the read.
            match image.prop("src").await {
                Ok(Some(src)) => sources.push(src),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "skipping unreadable image"),
            }
        }
        Ok(sources)
    }
}
