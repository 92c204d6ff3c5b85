//! Extraction strategies.
//!
//! A strategy is one self-contained method of obtaining raw payloads:
//! driving the rendered page ([`RenderedInteraction`]) or hitting known
//! data endpoints directly ([`DirectFetch`]). One `execute` call is one
//! attempt; time budgets and retries belong to the retry controller.

mod direct;
mod rendered;

pub use direct::DirectFetch;
pub use rendered::RenderedInteraction;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::models::{RawPayload, TargetKey};
use crate::normalize::{self, ParseError};
use crate::session::SessionHandle;
use crate::sink::{AddOutcome, ReviewSink};

/// Page-readiness criterion for a navigation.
///
/// Different page states are observable depending on network conditions,
/// so repeated attempts for the same target rotate through the criteria
/// round-robin. The rotation is a pure function of the attempt index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessCriterion {
    /// DOM parsed (`domcontentloaded`).
    DomContentLoaded,
    /// All subresources loaded (`load`).
    Loaded,
    /// Loaded plus a quiet network window.
    NetworkIdle,
}

impl ReadinessCriterion {
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt % 3 {
            0 => Self::DomContentLoaded,
            1 => Self::Loaded,
            _ => Self::NetworkIdle,
        }
    }
}

/// Failure of one strategy attempt. Absorbed by the retry controller;
/// never surfaced to the caller directly.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The attempt exceeded its time budget. Applied by the retry
    /// controller; strategies do not retry internally.
    #[error("strategy '{strategy}' timed out after {seconds}s")]
    Timeout {
        strategy: &'static str,
        seconds: u64,
    },

    /// Navigation to the target page failed.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// No fallback selector resolved to a clickable element. Non-fatal:
    /// the attempt continues with whatever was captured.
    #[error("no selector candidate resolved")]
    SelectorUnresolved,

    /// Underlying capability error.
    #[error(transparent)]
    Capability(#[from] anyhow::Error),
}

/// What one attempt produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyOutcome {
    /// Records newly inserted into the sink by this attempt.
    pub new_records: usize,
    /// Raw payloads this attempt saw (inserted or not).
    pub payloads_seen: usize,
}

/// Per-attempt execution context. The sink is task-scoped and passed by
/// handle; the session is exclusively borrowed for the attempt.
pub struct StrategyContext<'a> {
    pub key: &'a TargetKey,
    pub target_url: &'a str,
    pub config: &'a ExtractorConfig,
    pub sink: &'a ReviewSink,
    pub session: &'a mut SessionHandle,
    /// Zero-based attempt index within the current strategy.
    pub attempt: u32,
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one attempt to completion or failure. Must not retry
    /// internally and must not sleep beyond the configured pacing.
    async fn execute(
        &self,
        ctx: &mut StrategyContext<'_>,
    ) -> Result<StrategyOutcome, StrategyError>;
}

/// Normalize a batch of raw payloads into the sink.
///
/// Payload-level parse failures are absorbed: a payload without a record
/// list is expected noise, anything else is warn-logged. Returns how many
/// records were newly inserted.
pub(crate) fn ingest_payloads(
    payloads: Vec<RawPayload>,
    config: &ExtractorConfig,
    sink: &ReviewSink,
) -> usize {
    let mut inserted = 0;
    for payload in payloads {
        match normalize::decode(&payload, &config.fields) {
            Ok(reviews) => {
                for review in reviews {
                    if sink.add(review) == AddOutcome::Inserted {
                        inserted += 1;
                    }
                }
            }
            Err(ParseError::NoRecordsField) => {
                debug!(
                    "payload from {} ({}) carried no records",
                    payload.variant, payload.strategy
                );
            }
            Err(e) => {
                warn!(
                    "failed to decode payload from {} ({}): {e}",
                    payload.variant, payload.strategy
                );
            }
        }
    }
    inserted
}
