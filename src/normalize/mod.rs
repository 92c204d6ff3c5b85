//! Response normalizer.
//!
//! Decodes one raw payload into canonical reviews. Payloads arrive in
//! several shapes: bare JSON, JSON wrapped in a named-callback envelope
//! (`fetchJSON_comment98({...});`), and varying field-naming schemes for
//! both the record list and the per-record fields. The candidate names
//! tried per field are configuration data (`FieldCandidates`), evaluated
//! in order: first present and non-empty wins.

mod fields;

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::FieldCandidates;
use crate::models::{RawPayload, Review};

pub use fields::resolve_review;

/// Per-payload decode failure. Non-fatal to a task: the retry controller
/// absorbs these and moves on.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload looks callback-wrapped but the envelope cannot be
    /// stripped to an inner body.
    #[error("callback envelope did not match expected shape")]
    EnvelopeMismatch,

    /// The (unwrapped) body is not valid structured data.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Parsed fine, but no candidate record-list field was present.
    /// Expected for payloads that simply carry no records.
    #[error("no recognized record-list field in payload")]
    NoRecordsField,
}

/// Decode a raw payload into canonical reviews, in source order.
///
/// Records whose resolved content is empty are dropped silently.
pub fn decode(payload: &RawPayload, fields: &FieldCandidates) -> Result<Vec<Review>, ParseError> {
    decode_text(&payload.body, fields)
}

/// Decode payload text. See [`decode`].
pub fn decode_text(body: &str, fields: &FieldCandidates) -> Result<Vec<Review>, ParseError> {
    let inner = strip_envelope(body)?;
    let data: Value = serde_json::from_str(inner)?;
    let records = locate_records(&data, fields).ok_or(ParseError::NoRecordsField)?;

    let mut reviews = Vec::new();
    for raw in records {
        match resolve_review(raw, fields) {
            Some(review) => reviews.push(review),
            // Empty resolved content: dropped, not an error.
            None => debug!("dropping record with empty content"),
        }
    }
    Ok(reviews)
}

/// `name( ... );` callback envelope, matched against the whole body.
static ENVELOPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^[A-Za-z_$][A-Za-z0-9_$]*\s*\((.*)\)\s*;?$").unwrap());

/// Strip a named-callback envelope if present.
///
/// A body whose first significant byte opens a JSON value is passed
/// through untouched. Anything else must match `name( ... );` exactly,
/// or the payload is rejected as `EnvelopeMismatch`.
fn strip_envelope(body: &str) -> Result<&str, ParseError> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('"') {
        return Ok(trimmed);
    }

    ENVELOPE_PATTERN
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or(ParseError::EnvelopeMismatch)
}

/// Find the record list by trying candidate top-level field names in
/// order: a direct array wins; an object is probed one level deep with
/// the same candidates (the `data.comments` shape).
fn locate_records<'a>(data: &'a Value, fields: &FieldCandidates) -> Option<&'a Vec<Value>> {
    let obj = data.as_object()?;
    for name in &fields.records {
        match obj.get(name) {
            Some(Value::Array(items)) => return Some(items),
            Some(Value::Object(nested)) => {
                for inner in &fields.records {
                    if let Some(Value::Array(items)) = nested.get(inner) {
                        return Some(items);
                    }
                }
            }
            _ => {}
        }
    }
    None
}
