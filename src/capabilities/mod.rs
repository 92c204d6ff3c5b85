//! Capability interfaces consumed by the extraction core.
//!
//! The orchestrator never names a concrete browser or HTTP client; it
//! drives these traits. Production adapters live in this module
//! ([`ChromiumDriver`] behind the `browser` feature, [`ReqwestHttp`]);
//! tests substitute mocks.

#[cfg(feature = "browser")]
mod chromium;
mod http;

#[cfg(feature = "browser")]
pub use chromium::{ChromiumDriver, ChromiumDriverConfig};
pub use http::ReqwestHttp;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::TaskEvent;
use crate::session::{SessionCookie, SessionState};
use crate::strategy::ReadinessCriterion;

/// Rendered-page automation capability.
///
/// One driver instance serves one task; payload interception runs in the
/// background and completed bodies are collected through
/// [`drain_captured`](BrowserDriver::drain_captured) — the core depends
/// only on eventual payloads and explicit timeouts, never on callback
/// timing.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate and wait for the given readiness criterion, bounded by
    /// `timeout`.
    async fn navigate(
        &self,
        url: &str,
        readiness: ReadinessCriterion,
        timeout: Duration,
    ) -> anyhow::Result<()>;

    /// True when the selector resolves to a visible, interactive element.
    async fn query_selector(&self, selector: &str, timeout: Duration) -> anyhow::Result<bool>;

    /// Click the element the selector resolves to.
    async fn click(&self, selector: &str) -> anyhow::Result<()>;

    /// Scroll the page viewport by `pixels`.
    async fn scroll_by(&self, pixels: i64) -> anyhow::Result<()>;

    /// Evaluate a script in page context.
    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value>;

    /// Take all intercepted response bodies captured since the last call.
    async fn drain_captured(&self) -> Vec<String>;

    /// Current cookies of the browser session.
    async fn cookies(&self) -> anyhow::Result<Vec<SessionCookie>>;

    /// Install previously saved session state before navigation.
    async fn apply_session(&self, state: &SessionState) -> anyhow::Result<()>;
}

/// Response of one direct HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpBody {
    pub status: u16,
    pub body: String,
}

impl HttpBody {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Direct data-fetch capability.
#[async_trait]
pub trait DirectHttp: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        cookies: &[SessionCookie],
        timeout: Duration,
    ) -> anyhow::Result<HttpBody>;
}

/// External event sink for task progress, records, and errors.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TaskEvent);
}

/// Event sink backed by an unbounded tokio channel. The service layer
/// consumes the receiver and forwards events to its own transport.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<TaskEvent>,
}

impl ChannelEventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: TaskEvent) {
        // A departed consumer is not the task's problem.
        let _ = self.tx.send(event);
    }
}
