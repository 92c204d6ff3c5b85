//! Retry/fallback controller.
//!
//! Sequences strategies in a fixed fallback order under a bounded
//! per-strategy attempt count with increasing inter-attempt delay.
//! Terminates successfully as soon as the sink holds at least one record
//! after any attempt; partial results are success. Declares failure only
//! when every attempt of every strategy yielded zero records.

use tracing::{debug, info, warn};

use crate::capabilities::EventSink;
use crate::config::ExtractorConfig;
use crate::models::{ProgressStatus, TaskEvent};
use crate::strategy::{ExtractionStrategy, StrategyContext, StrategyError};

/// Attempt accounting for one controller run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// `(strategy name, attempts made)` in execution order.
    pub attempts: Vec<(String, u32)>,
}

impl RetryReport {
    pub fn total_attempts(&self) -> u32 {
        self.attempts.iter().map(|(_, n)| n).sum()
    }
}

pub struct RetryController<'a> {
    config: &'a ExtractorConfig,
    events: &'a dyn EventSink,
}

impl<'a> RetryController<'a> {
    pub fn new(config: &'a ExtractorConfig, events: &'a dyn EventSink) -> Self {
        Self { config, events }
    }

    /// Drive the strategies against the context until the sink is
    /// non-empty or everything is exhausted. Strategy failures are
    /// absorbed here; the caller inspects the sink for the verdict.
    pub async fn run(
        &self,
        strategies: &[Box<dyn ExtractionStrategy>],
        ctx: &mut StrategyContext<'_>,
    ) -> RetryReport {
        let mut report = RetryReport::default();
        let budget = self.config.attempt_timeout();

        'strategies: for strategy in strategies {
            let mut attempts = 0;
            for attempt in 0..self.config.max_attempts_per_strategy {
                ctx.attempt = attempt;
                attempts += 1;
                debug!(
                    "strategy {} attempt {}/{}",
                    strategy.name(),
                    attempt + 1,
                    self.config.max_attempts_per_strategy
                );

                let result = match tokio::time::timeout(budget, strategy.execute(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(StrategyError::Timeout {
                        strategy: strategy.name(),
                        seconds: self.config.attempt_timeout_secs,
                    }),
                };

                match result {
                    Ok(outcome) => {
                        debug!(
                            "strategy {} saw {} payloads, {} new records",
                            strategy.name(),
                            outcome.payloads_seen,
                            outcome.new_records
                        );
                        if outcome.new_records > 0 {
                            self.events.emit(TaskEvent::Progress {
                                status: ProgressStatus::Crawling,
                                count: ctx.sink.len(),
                            });
                        }
                    }
                    Err(e) => warn!("strategy {} attempt failed: {e}", strategy.name()),
                }

                // Any non-empty sink is success; stop escalating.
                if !ctx.sink.is_empty() {
                    info!(
                        "extraction satisfied by {} with {} records",
                        strategy.name(),
                        ctx.sink.len()
                    );
                    report.attempts.push((strategy.name().to_string(), attempts));
                    break 'strategies;
                }

                let delay = self.config.retry_delay(attempt + 1);
                if attempt + 1 < self.config.max_attempts_per_strategy && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            if ctx.sink.is_empty() {
                report.attempts.push((strategy.name().to_string(), attempts));
                warn!(
                    "strategy {} exhausted after {attempts} attempts with no records",
                    strategy.name()
                );
            }
        }

        report
    }
}
