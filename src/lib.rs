//! ReviewHarvest - resilient review-extraction orchestrator.
//!
//! Extracts structured product reviews from a source that exposes the
//! same data through inconsistent channels: an interactive rendered page
//! whose background requests can be intercepted, and direct data-fetch
//! endpoints with varying response envelopes. The orchestrator drives
//! navigation and interaction attempts, normalizes heterogeneous
//! payloads, deduplicates records, persists authentication state across
//! runs, retries failed strategies with bounded backoff, and admits at
//! most one concurrent extraction per target key.

pub mod capabilities;
pub mod config;
pub mod coordinator;
pub mod models;
pub mod normalize;
pub mod retry;
pub mod session;
pub mod sink;
pub mod strategy;
pub mod task;

pub use capabilities::{BrowserDriver, ChannelEventSink, DirectHttp, EventSink, HttpBody};
pub use config::{ExtractorConfig, FieldCandidates};
pub use coordinator::{AdmissionGuard, AdmitError, TaskCoordinator};
pub use models::{ProgressStatus, RawPayload, Review, TargetKey, TaskEvent, TaskStatus};
pub use normalize::ParseError;
pub use session::{SessionCookie, SessionHandle, SessionState, SessionStore};
pub use sink::{AddOutcome, ReviewSink};
pub use strategy::{
    DirectFetch, ExtractionStrategy, ReadinessCriterion, RenderedInteraction, StrategyContext,
    StrategyError, StrategyOutcome,
};
pub use task::{
    ExtractionRequest, ExtractionTask, Orchestrator, Submission, SubmitError, TaskDeps,
    TaskError, TaskReport,
};
