//! Extraction task and submission facade.
//!
//! One task is the top-level unit of work for one target: it owns its
//! sink and session handle, drives the retry controller, emits events,
//! and hands its admission guard back on every exit path by holding it
//! across the whole run.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::capabilities::{BrowserDriver, DirectHttp, EventSink};
use crate::config::ExtractorConfig;
use crate::coordinator::{AdmissionGuard, AdmitError, TaskCoordinator};
use crate::models::{ProgressStatus, TargetKey, TaskEvent, TaskStatus};
use crate::retry::{RetryController, RetryReport};
use crate::session::{SessionHandle, SessionStore};
use crate::sink::ReviewSink;
use crate::strategy::{DirectFetch, ExtractionStrategy, RenderedInteraction, StrategyContext};

/// Submission-time failure, returned synchronously.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    AlreadyActive(#[from] AdmitError),

    #[error("cannot derive a target key from '{0}'")]
    InvalidTarget(String),
}

/// Terminal failure of one task run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("all strategies exhausted for target {key} after {attempts} attempts")]
    AllStrategiesExhausted { key: TargetKey, attempts: u32 },
}

/// What one finished task reports back.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub key: TargetKey,
    pub status: TaskStatus,
    pub records: usize,
    pub retry: RetryReport,
}

/// One extraction request as accepted from the submission surface.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub target_url: String,
    /// Explicit key; derived from the URL when absent.
    pub key: Option<TargetKey>,
    pub display_name: Option<String>,
}

/// Capability bundle a task runs against.
#[derive(Clone)]
pub struct TaskDeps {
    /// Browser capability; rendered interaction is skipped when absent.
    pub browser: Option<Arc<dyn BrowserDriver>>,
    pub http: Arc<dyn DirectHttp>,
    pub events: Arc<dyn EventSink>,
}

/// Top-level unit of work for one target.
pub struct ExtractionTask {
    key: TargetKey,
    target_url: String,
    display_name: String,
    config: ExtractorConfig,
    sink: ReviewSink,
    status: TaskStatus,
}

impl ExtractionTask {
    pub fn new(key: TargetKey, target_url: String, display_name: String, config: ExtractorConfig) -> Self {
        Self {
            key,
            target_url,
            display_name,
            config,
            sink: ReviewSink::new(),
            status: TaskStatus::Pending,
        }
    }

    /// Read handle onto the task's sink, for progress reporting.
    pub fn sink(&self) -> ReviewSink {
        self.sink.clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Run the task to a terminal state. The admission guard is held for
    /// the whole execution and dropped (releasing the key) on every exit
    /// path, including panics and cancellation.
    pub async fn run(mut self, deps: TaskDeps, guard: AdmissionGuard) -> TaskReport {
        debug_assert_eq!(guard.key(), &self.key);
        self.status = TaskStatus::Running;
        info!("starting extraction for {} ({})", self.key, self.display_name);
        deps.events.emit(TaskEvent::Progress {
            status: ProgressStatus::Starting,
            count: 0,
        });

        let mut session = SessionHandle::load(session_store(&self.config.session_root, &self.key));

        let mut strategies: Vec<Box<dyn ExtractionStrategy>> = Vec::new();
        if let Some(browser) = deps.browser.clone() {
            strategies.push(Box::new(RenderedInteraction::new(browser)));
        }
        strategies.push(Box::new(DirectFetch::new(Arc::clone(&deps.http))));

        let retry = {
            let mut ctx = StrategyContext {
                key: &self.key,
                target_url: &self.target_url,
                config: &self.config,
                sink: &self.sink,
                session: &mut session,
                attempt: 0,
            };
            RetryController::new(&self.config, deps.events.as_ref())
                .run(&strategies, &mut ctx)
                .await
        };

        let records = self.sink.len();
        if records > 0 {
            // Partial success is success: emit everything in first-seen
            // order, then the terminal progress event.
            for review in self.sink.snapshot() {
                deps.events.emit(TaskEvent::Record { review });
            }
            deps.events.emit(TaskEvent::Progress {
                status: ProgressStatus::Completed,
                count: records,
            });
            self.status = TaskStatus::Completed;
            info!("extraction for {} completed with {records} records", self.key);

            // A failed session save must not fail a succeeded task.
            if let Err(e) = session.save_if_dirty() {
                warn!("session save for {} failed: {e}", self.key);
                deps.events.emit(TaskEvent::Error {
                    message: format!("session save failed: {e}"),
                });
            }
        } else {
            let failure = TaskError::AllStrategiesExhausted {
                key: self.key.clone(),
                attempts: retry.total_attempts(),
            };
            error!("{failure}");
            deps.events.emit(TaskEvent::Error {
                message: failure.to_string(),
            });
            deps.events.emit(TaskEvent::Progress {
                status: ProgressStatus::Error,
                count: 0,
            });
            self.status = TaskStatus::Failed;
        }

        drop(guard);
        TaskReport {
            key: self.key,
            status: self.status,
            records,
            retry,
        }
    }
}

fn session_store(root: &Path, key: &TargetKey) -> SessionStore {
    SessionStore::new(root, key)
}

/// Library facade: admission plus task spawning.
///
/// `submit` reserves the key synchronously and runs the task on its own
/// tokio task; many targets proceed concurrently, duplicates are refused.
/// Aborting the returned handle cancels the in-flight strategy call and
/// still releases the key through the guard.
#[derive(Clone)]
pub struct Orchestrator {
    coordinator: TaskCoordinator,
    config: ExtractorConfig,
}

impl Orchestrator {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            coordinator: TaskCoordinator::new(),
            config,
        }
    }

    pub fn coordinator(&self) -> &TaskCoordinator {
        &self.coordinator
    }

    pub fn submit(
        &self,
        request: ExtractionRequest,
        deps: TaskDeps,
    ) -> Result<Submission, SubmitError> {
        let key = match request.key {
            Some(key) => key,
            None => TargetKey::from_url(&request.target_url)
                .ok_or_else(|| SubmitError::InvalidTarget(request.target_url.clone()))?,
        };
        let guard = self.coordinator.admit(&key)?;

        let display_name = request
            .display_name
            .unwrap_or_else(|| key.to_string());
        let task = ExtractionTask::new(
            key.clone(),
            request.target_url,
            display_name,
            self.config.clone(),
        );
        let sink = task.sink();
        let handle = tokio::spawn(task.run(deps, guard));

        Ok(Submission { key, sink, handle })
    }
}

/// An admitted, in-flight task.
pub struct Submission {
    pub key: TargetKey,
    /// Concurrent read handle for progress reporting.
    pub sink: ReviewSink,
    pub handle: tokio::task::JoinHandle<TaskReport>,
}

impl Submission {
    /// Cancel the task. The admission guard is dropped with the task
    /// future, releasing the key.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}
