//! Rendered-page interaction strategy.
//!
//! Drives the browser capability through the escalation the source is
//! known to respond to: navigate the product page, simulate scrolling,
//! visit the data endpoints from within the page so interception sees
//! their responses, and finally click a review-tab selector candidate to
//! trigger in-page requests. Captured payloads are normalized into the
//! task's sink as they are drained.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::capabilities::BrowserDriver;
use crate::models::RawPayload;

use super::{
    ingest_payloads, ExtractionStrategy, ReadinessCriterion, StrategyContext, StrategyError,
    StrategyOutcome,
};

pub struct RenderedInteraction {
    driver: Arc<dyn BrowserDriver>,
}

impl RenderedInteraction {
    pub const NAME: &'static str = "rendered-interaction";

    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self { driver }
    }

    async fn drain_into_sink(&self, ctx: &StrategyContext<'_>, variant: &str) -> (usize, usize) {
        let bodies = self.driver.drain_captured().await;
        let seen = bodies.len();
        let payloads: Vec<RawPayload> = bodies
            .into_iter()
            .map(|body| RawPayload {
                body,
                strategy: Self::NAME,
                variant: variant.to_string(),
            })
            .collect();
        let inserted = ingest_payloads(payloads, ctx.config, ctx.sink);
        (inserted, seen)
    }

    /// Try selector candidates in priority order; the first that resolves
    /// to a visible, interactive element is clicked. None resolving is
    /// reported as `SelectorUnresolved` for the caller to absorb.
    async fn click_first_candidate(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<(), StrategyError> {
        let probe_timeout = std::time::Duration::from_secs(5);
        for selector in &ctx.config.selector_candidates {
            match self.driver.query_selector(selector, probe_timeout).await {
                Ok(true) => {
                    debug!("selector candidate resolved: {selector}");
                    match self.driver.click(selector).await {
                        Ok(()) => {
                            info!("clicked review trigger {selector}");
                            return Ok(());
                        }
                        Err(e) => warn!("click on {selector} failed: {e}"),
                    }
                }
                Ok(false) => debug!("selector candidate absent: {selector}"),
                Err(e) => debug!("selector probe {selector} errored: {e}"),
            }
        }
        Err(StrategyError::SelectorUnresolved)
    }

    async fn pace(&self, ctx: &StrategyContext<'_>) {
        let delay = ctx.config.action_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ExtractionStrategy for RenderedInteraction {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(
        &self,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<StrategyOutcome, StrategyError> {
        let mut outcome = StrategyOutcome::default();

        self.driver
            .apply_session(ctx.session.state())
            .await
            .map_err(StrategyError::Capability)?;

        let readiness = ReadinessCriterion::for_attempt(ctx.attempt);
        debug!(
            "navigating {} (attempt {}, readiness {readiness:?})",
            ctx.target_url, ctx.attempt
        );
        self.driver
            .navigate(ctx.target_url, readiness, ctx.config.navigation_timeout())
            .await
            .map_err(|e| StrategyError::Navigation(e.to_string()))?;

        // Human-ish scrolling makes lazy review widgets fire requests.
        for _ in 0..ctx.config.scroll_steps {
            if let Err(e) = self.driver.scroll_by(ctx.config.scroll_step_px).await {
                debug!("scroll step failed: {e}");
                break;
            }
            self.pace(ctx).await;
        }

        let (inserted, seen) = self.drain_into_sink(ctx, ctx.target_url).await;
        outcome.new_records += inserted;
        outcome.payloads_seen += seen;

        // Visit the data endpoints from inside the session; interception
        // captures their bodies even when the page renders them raw.
        if ctx.sink.is_empty() {
            for variant in &ctx.config.endpoint_variants {
                let url = variant.replace("{key}", ctx.key.as_str());
                if let Err(e) = self
                    .driver
                    .navigate(url.as_str(), readiness, ctx.config.navigation_timeout())
                    .await
                {
                    warn!("endpoint visit {url} failed: {e}");
                    continue;
                }
                self.pace(ctx).await;
                let (inserted, seen) = self.drain_into_sink(ctx, &url).await;
                outcome.new_records += inserted;
                outcome.payloads_seen += seen;
                if !ctx.sink.is_empty() {
                    break;
                }
            }
        }

        // Last resort within this attempt: go back to the page and click
        // the review tab to trigger in-page requests.
        if ctx.sink.is_empty() {
            self.driver
                .navigate(ctx.target_url, readiness, ctx.config.navigation_timeout())
                .await
                .map_err(|e| StrategyError::Navigation(e.to_string()))?;
            match self.click_first_candidate(ctx).await {
                Ok(()) => {
                    self.pace(ctx).await;
                    let (inserted, seen) = self.drain_into_sink(ctx, ctx.target_url).await;
                    outcome.new_records += inserted;
                    outcome.payloads_seen += seen;
                }
                // Non-fatal by contract: fall through with what we have.
                Err(StrategyError::SelectorUnresolved) => {
                    warn!("no review selector resolved on {}", ctx.target_url);
                }
                Err(e) => return Err(e),
            }
        }

        // The rendered session may have refreshed authentication state;
        // carry the cookies into the session store.
        match self.driver.cookies().await {
            Ok(cookies) if !cookies.is_empty() => {
                if ctx.session.state().cookies != cookies {
                    ctx.session.state_mut().cookies = cookies;
                }
            }
            Ok(_) => {}
            Err(e) => debug!("cookie extraction failed: {e}"),
        }

        Ok(outcome)
    }
}
