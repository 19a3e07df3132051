//! Message passing between the processor context and the driver context.
//!
//! Requests and responses cross the channel as JSON values, the same shape a
//! browser message port would carry. Each request gets its own oneshot reply
//! slot, so there is at most one response per request.

use serde_json::Value;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::driver::PageDriver;
use crate::error::TransportError;
use crate::page::Page;
use crate::types::{ProcessRequest, ProcessResponse};

const CHANNEL_CAPACITY: usize = 8;

type Envelope = (Value, oneshot::Sender<Value>);

/// Carries one request to the driver context and brings its response back.
pub trait Transport: Send + Sync {
    fn dispatch(
        &self,
        request: ProcessRequest,
    ) -> impl Future<Output = Result<ProcessResponse, TransportError>> + Send;
}

/// Processor-side end of the bridge.
#[derive(Clone)]
pub struct ChannelBridge {
    tx: mpsc::Sender<Envelope>,
}

/// Driver-side end of the bridge. Serves requests strictly one at a time.
pub struct DriverHost<P: Page> {
    driver: PageDriver<P>,
    rx: mpsc::Receiver<Envelope>,
}

/// Connect a driver to a new bridge.
///
/// Spawn (or await) [`DriverHost::run()`] to start serving.
pub fn connect<P: Page>(driver: PageDriver<P>) -> (ChannelBridge, DriverHost<P>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (ChannelBridge { tx }, DriverHost { driver, rx })
}

impl Transport for ChannelBridge {
    async fn dispatch(&self, request: ProcessRequest) -> Result<ProcessResponse, TransportError> {
        let message = serde_json::to_value(&request)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send((message, reply_tx))
            .await
            .map_err(|_| TransportError::Unreachable)?;

        let reply = reply_rx.await.map_err(|_| TransportError::Unreachable)?;
        Ok(serde_json::from_value(reply)?)
    }
}

impl<P: Page> DriverHost<P> {
    /// Serve requests until every [`ChannelBridge`] is dropped, then hand
    /// the driver back.
    pub async fn run(mut self) -> PageDriver<P> {
        while let Some((message, reply)) = self.rx.recv().await {
            let response = match ProcessRequest::from_value(&message) {
                Ok(request) => self.driver.handle(request).await,
                Err(e) => {
                    warn!(error = %e, "rejecting malformed request");
                    ProcessResponse::failure(e.reason())
                }
            };

            match serde_json::to_value(&response) {
                Ok(value) => {
                    if reply.send(value).is_err() {
                        debug!("requester went away before the response was ready");
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode response"),
            }
        }
        debug!("bridge closed, driver host stopping");
        self.driver
    }
}

/// A transport with nothing on the other end.
///
/// Every dispatch fails as unreachable. Useful for editing the queue
/// without a browser attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl Transport for Detached {
    async fn dispatch(&self, _request: ProcessRequest) -> Result<ProcessResponse, TransportError> {
        Err(TransportError::Unreachable)
    }
}
