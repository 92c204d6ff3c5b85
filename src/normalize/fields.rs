//! Per-record canonical field resolution.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use crate::config::FieldCandidates;
use crate::models::Review;

/// Resolve one raw record into a canonical review.
///
/// Returns `None` when the resolved content is empty; such records are
/// dropped by the caller.
pub fn resolve_review(raw: &Value, fields: &FieldCandidates) -> Option<Review> {
    let content = first_string(raw, &fields.content)?;
    if content.is_empty() {
        return None;
    }

    let author = first_string(raw, &fields.author)
        .unwrap_or_else(|| fields.fallback_author.clone());

    // Timestamp defaults to "now" when no candidate resolves.
    let timestamp = first_string(raw, &fields.timestamp)
        .or_else(|| Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()));

    // A record without any rating field gets the neutral rating.
    let rating = Some(first_number(raw, &fields.rating).unwrap_or(fields.fallback_rating));

    let mut tags = BTreeMap::new();
    if let Some(color) = first_string(raw, &fields.color) {
        tags.insert("color".to_string(), color);
    }
    if let Some(size) = first_string(raw, &fields.size) {
        tags.insert("size".to_string(), size);
    }
    if let Some(level) = first_string(raw, &fields.level) {
        tags.insert("level".to_string(), level);
    }

    let attachments = first_urls(raw, &fields.attachments);

    Some(Review {
        content,
        author,
        timestamp,
        rating,
        tags,
        attachments,
    })
}

/// First candidate field that is present and a non-empty string.
fn first_string(raw: &Value, candidates: &[String]) -> Option<String> {
    for name in candidates {
        if let Some(s) = raw.get(name).and_then(Value::as_str) {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// First candidate field that resolves to a number. Numeric strings are
/// accepted because some envelopes serialize ratings as text.
fn first_number(raw: &Value, candidates: &[String]) -> Option<f64> {
    for name in candidates {
        match raw.get(name) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(n) = s.parse::<f64>() {
                    return Some(n);
                }
            }
            _ => {}
        }
    }
    None
}

/// First candidate field holding a non-empty array, flattened to URLs.
/// Elements are either URL strings or objects carrying an `imgUrl`/`url`
/// field.
fn first_urls(raw: &Value, candidates: &[String]) -> Vec<String> {
    for name in candidates {
        if let Some(Value::Array(items)) = raw.get(name) {
            if items.is_empty() {
                continue;
            }
            return items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Object(_) => item
                        .get("imgUrl")
                        .or_else(|| item.get("url"))
                        .and_then(Value::as_str)
                        .map(|s| s.to_string()),
                    _ => None,
                })
                .collect();
        }
    }
    Vec::new()
}
