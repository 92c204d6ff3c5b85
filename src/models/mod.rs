//! Core data model for review extraction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// `<digits>.html` tail of a product-page path.
static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d+)\.html").unwrap());

/// Stable identifier for one content source instance (e.g. one product page).
///
/// Used as the admission key for the coordinator and as the session-store
/// key. Immutable once a task starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetKey(String);

impl TargetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Extract a key from a product URL whose path ends in `<digits>.html`.
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        KEY_PATTERN
            .captures(parsed.path())
            .and_then(|c| c.get(1))
            .map(|m| Self(m.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One extracted review in canonical form.
///
/// Dedup identity is the exact `(content, author)` pair. A review with
/// empty `content` is never admitted to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Review body text. Non-empty for any review a sink accepts.
    pub content: String,
    /// Reviewer display name.
    pub author: String,
    /// Creation time as reported by the source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Star rating. The normalizer fills a neutral default when the
    /// source omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Small attribute set (purchased variant attributes such as color/size).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Attachment URLs (images), in source order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl Review {
    /// The dedup key: exact `(content, author)` match.
    pub fn dedup_key(&self) -> (String, String) {
        (self.content.clone(), self.author.clone())
    }
}

/// Raw text captured from one network exchange, tagged with provenance.
///
/// Ephemeral: produced by one strategy call, consumed immediately by the
/// normalizer, then discarded.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub body: String,
    /// Name of the strategy that produced this payload.
    pub strategy: &'static str,
    /// Endpoint variant or page URL it came from.
    pub variant: String,
}

/// Lifecycle state of one extraction task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Progress phase reported to the event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    Crawling,
    Completed,
    Error,
}

/// Event emitted by a task to the external event sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Progress { status: ProgressStatus, count: usize },
    Record { review: Review },
    Error { message: String },
}
