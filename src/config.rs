//! Extractor configuration.
//!
//! Everything that varies per deployment is plain serde data: attempt
//! budgets, pacing delays, selector candidates, endpoint variants, and the
//! candidate source-field names the normalizer tries per canonical field.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the extraction orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Bounded attempt count per strategy.
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_strategy: u32,

    /// Upper time budget for one strategy attempt, in seconds.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Navigation timeout within an attempt, in seconds.
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Base delay between retry attempts, in milliseconds. The effective
    /// delay grows linearly with the attempt number. Zero disables pacing
    /// (used by tests).
    #[serde(default = "default_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    /// Delay between in-page actions (scroll steps, clicks), in
    /// milliseconds. Zero disables pacing.
    #[serde(default = "default_action_delay_ms")]
    pub action_delay_ms: u64,

    /// Number of simulated scroll steps after navigation.
    #[serde(default = "default_scroll_steps")]
    pub scroll_steps: u32,

    /// Pixels per scroll step.
    #[serde(default = "default_scroll_step_px")]
    pub scroll_step_px: i64,

    /// CSS selector candidates for the element that triggers review
    /// loading, tried in priority order.
    #[serde(default = "default_selector_candidates")]
    pub selector_candidates: Vec<String>,

    /// Known endpoint-shape variants for direct fetching, tried in order.
    /// `{key}` is replaced by the target key.
    #[serde(default = "default_endpoint_variants")]
    pub endpoint_variants: Vec<String>,

    /// Regex matched against intercepted response URLs to decide which
    /// exchanges carry review payloads.
    #[serde(default = "default_response_url_pattern")]
    pub response_url_pattern: String,

    /// Root directory for per-target session state.
    #[serde(default = "default_session_root")]
    pub session_root: PathBuf,

    /// Candidate source-field names per canonical field.
    #[serde(default)]
    pub fields: FieldCandidates,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_strategy: default_max_attempts(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            base_retry_delay_ms: default_retry_delay_ms(),
            action_delay_ms: default_action_delay_ms(),
            scroll_steps: default_scroll_steps(),
            scroll_step_px: default_scroll_step_px(),
            selector_candidates: default_selector_candidates(),
            endpoint_variants: default_endpoint_variants(),
            response_url_pattern: default_response_url_pattern(),
            session_root: default_session_root(),
            fields: FieldCandidates::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms * u64::from(attempt))
    }

    pub fn action_delay(&self) -> Duration {
        Duration::from_millis(self.action_delay_ms)
    }

    /// A config with all pacing disabled, for tests.
    pub fn without_delays() -> Self {
        Self {
            base_retry_delay_ms: 0,
            action_delay_ms: 0,
            ..Self::default()
        }
    }
}

/// Ordered candidate source-field names per canonical field.
///
/// The normalizer evaluates these deterministically: first present and
/// non-empty wins. The defaults cover the field-naming schemes the source
/// is known to use across its response envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidates {
    /// Top-level field names that may hold the record list, directly or
    /// nested one level under a named sub-object.
    #[serde(default = "default_records")]
    pub records: Vec<String>,
    #[serde(default = "default_content")]
    pub content: Vec<String>,
    #[serde(default = "default_author")]
    pub author: Vec<String>,
    #[serde(default = "default_timestamp")]
    pub timestamp: Vec<String>,
    #[serde(default = "default_rating")]
    pub rating: Vec<String>,
    #[serde(default = "default_color")]
    pub color: Vec<String>,
    #[serde(default = "default_size")]
    pub size: Vec<String>,
    #[serde(default = "default_level")]
    pub level: Vec<String>,
    #[serde(default = "default_attachments")]
    pub attachments: Vec<String>,
    /// Author used when no candidate field resolves.
    #[serde(default = "default_fallback_author")]
    pub fallback_author: String,
    /// Neutral rating used when no candidate field resolves.
    #[serde(default = "default_fallback_rating")]
    pub fallback_rating: f64,
}

impl Default for FieldCandidates {
    fn default() -> Self {
        Self {
            records: default_records(),
            content: default_content(),
            author: default_author(),
            timestamp: default_timestamp(),
            rating: default_rating(),
            color: default_color(),
            size: default_size(),
            level: default_level(),
            attachments: default_attachments(),
            fallback_author: default_fallback_author(),
            fallback_rating: default_fallback_rating(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_attempt_timeout_secs() -> u64 {
    90
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_action_delay_ms() -> u64 {
    1000
}

fn default_scroll_steps() -> u32 {
    5
}

fn default_scroll_step_px() -> i64 {
    800
}

fn default_selector_candidates() -> Vec<String> {
    [
        "#detail > div.tab-main > ul > li:nth-child(4)",
        "#comment",
        ".tab-main li:nth-child(4)",
        "a.anchor[name='comment']",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_endpoint_variants() -> Vec<String> {
    [
        "https://club.jd.com/comment/productPageComments.action?callback=fetchJSON_comment98&productId={key}&score=0&sortType=5&page=0&pageSize=10&isShadowSku=0",
        "https://club.jd.com/comment/skuProductPageComments.action?callback=fetchJSON_comment98&productId={key}&score=0&sortType=5&page=0&pageSize=10",
        "https://api.m.jd.com/api?functionId=getCommentListWithCard&body=%7B%22productId%22:%22{key}%22,%22score%22:0,%22sortType%22:5,%22page%22:0,%22pageSize%22:10%7D",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_response_url_pattern() -> String {
    r"(comment\?callback=fetchJSON_comment|club\.jd\.com/comment/skuProductPageComments\.action|club\.jd\.com/comment/productPageComments\.action|getCommentListWithCard|productapi\.yiyaojd\.com|pop/commentServer)".to_string()
}

fn default_session_root() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_records() -> Vec<String> {
    vec_of(&["comments", "data", "commentList", "list", "commentInfoList"])
}

fn default_content() -> Vec<String> {
    vec_of(&["content", "commentData", "commentContent", "comment"])
}

fn default_author() -> Vec<String> {
    vec_of(&["nickname", "userName", "userNickName"])
}

fn default_timestamp() -> Vec<String> {
    vec_of(&["creationTime", "commentTime", "date"])
}

fn default_rating() -> Vec<String> {
    vec_of(&["score", "starCount", "star"])
}

fn default_color() -> Vec<String> {
    vec_of(&["productColor", "color"])
}

fn default_size() -> Vec<String> {
    vec_of(&["productSize", "size"])
}

fn default_level() -> Vec<String> {
    vec_of(&["userLevelName", "userLevel"])
}

fn default_attachments() -> Vec<String> {
    vec_of(&["images", "pics"])
}

fn default_fallback_author() -> String {
    "anonymous".to_string()
}

fn default_fallback_rating() -> f64 {
    5.0
}

fn vec_of(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = ExtractorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ExtractorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: ExtractorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ExtractorConfig::default());
    }

    #[test]
    fn retry_delay_grows_with_attempt() {
        let config = ExtractorConfig::default();
        assert!(config.retry_delay(2) > config.retry_delay(1));
        assert_eq!(
            ExtractorConfig::without_delays().retry_delay(3),
            Duration::ZERO
        );
    }
}
