//! Deduplicating record sink.
//!
//! One sink per task, owned by the task and handed by handle to each
//! strategy execution. Single writer (the task's own execution), many
//! readers (progress reporting).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::models::Review;

/// Outcome of one [`ReviewSink::add`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Duplicate,
    /// Rejected because the review has empty content. Never counted.
    EmptyContent,
}

/// Accumulates canonical reviews for one task, rejecting duplicates and
/// preserving first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ReviewSink {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    reviews: Vec<Review>,
    seen: HashSet<(String, String)>,
}

impl ReviewSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a review. Idempotent under exact `(content, author)`
    /// duplicates; the first occurrence wins and keeps its position.
    pub fn add(&self, review: Review) -> AddOutcome {
        if review.content.is_empty() {
            return AddOutcome::EmptyContent;
        }
        let mut inner = self.inner.write().expect("sink lock poisoned");
        if !inner.seen.insert(review.dedup_key()) {
            return AddOutcome::Duplicate;
        }
        inner.reviews.push(review);
        AddOutcome::Inserted
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("sink lock poisoned").reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current contents in insertion (emission) order.
    pub fn snapshot(&self) -> Vec<Review> {
        self.inner
            .read()
            .expect("sink lock poisoned")
            .reviews
            .clone()
    }
}
