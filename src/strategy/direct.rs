//! Direct endpoint-fetch strategy.
//!
//! Cheaper, context-free fallback: issues HTTP requests against the known
//! endpoint-shape variants in order, reusing whatever cookies the session
//! store holds, and normalizes each body synchronously.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::capabilities::DirectHttp;
use crate::models::RawPayload;

use super::{
    ingest_payloads, ExtractionStrategy, StrategyContext, StrategyError, StrategyOutcome,
};

pub struct DirectFetch {
    http: Arc<dyn DirectHttp>,
}

impl DirectFetch {
    pub const NAME: &'static str = "direct-fetch";

    pub fn new(http: Arc<dyn DirectHttp>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ExtractionStrategy for DirectFetch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn execute(
        &self,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<StrategyOutcome, StrategyError> {
        let mut outcome = StrategyOutcome::default();
        let headers = [(
            "Referer".to_string(),
            ctx.target_url.to_string(),
        )];
        let cookies = ctx.session.state().cookies.clone();

        for variant in &ctx.config.endpoint_variants {
            let url = variant.replace("{key}", ctx.key.as_str());
            debug!("direct fetch {url}");
            let response = match self
                .http
                .get(&url, &headers, &cookies, ctx.config.navigation_timeout())
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!("direct fetch {url} failed: {e}");
                    continue;
                }
            };
            if !response.is_success() {
                warn!("direct fetch {url} returned status {}", response.status);
                continue;
            }

            outcome.payloads_seen += 1;
            outcome.new_records += ingest_payloads(
                vec![RawPayload {
                    body: response.body,
                    strategy: Self::NAME,
                    variant: url.clone(),
                }],
                ctx.config,
                ctx.sink,
            );

            // First variant that yields records wins; the rest are shapes
            // of the same data.
            if !ctx.sink.is_empty() {
                break;
            }

            let delay = ctx.config.action_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Ok(outcome)
    }
}
