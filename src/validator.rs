// Schema checks for candidate proposals returned by a generation backend.
use chrono::{DateTime, NaiveDate};
use serde::de::IgnoredAny;
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::ValidationError;
use crate::market::{MarketProposal, MarketType};

/// Validates `candidate` as a binary or categorical market proposal.
///
/// `today` is the reference date the deadline must be strictly after. It is
/// supplied by the caller so validation never reads the system clock.
///
/// Checks run in a fixed order and the first violation is returned:
/// JSON syntax, market type, required fields, outcomes, deadline, then
/// resolution source.
pub fn validate(candidate: &str, today: NaiveDate) -> Result<MarketProposal, ValidationError> {
    let payload = extract_json_payload(candidate);
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ValidationError::malformed_json(format!("Failed to parse JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| ValidationError::unknown_type("top-level value is not a JSON object"))?;
    let market_type = market_type(object)?;

    let question = required_str(object, "question")?;
    if question.trim().is_empty() {
        return Err(ValidationError::schema_mismatch("question", "must not be empty"));
    }
    let outcomes = outcome_labels(object)?;
    let tags = tags(object)?;
    let resolution_source = required_str(object, "resolution_source")?;
    let deadline = required_str(object, "deadline")?;
    let creator = required_str(object, "creator")?;

    check_outcomes(market_type, &outcomes)?;

    let deadline = parse_deadline(deadline)?;
    if deadline <= today {
        return Err(ValidationError::deadline_not_future(format!(
            "deadline {} is not after {}",
            deadline, today
        )));
    }

    if resolution_source.trim().is_empty() {
        return Err(ValidationError::schema_mismatch(
            "resolution_source",
            "must not be empty",
        ));
    }

    Ok(MarketProposal {
        question: question.trim().to_string(),
        market_type,
        outcomes,
        tags,
        resolution_source: resolution_source.trim().to_string(),
        deadline,
        creator: creator.to_string(),
    })
}

/// Locates the JSON payload inside a model reply.
///
/// A reply that already parses as JSON is used whole. Otherwise models often
/// wrap their answer in a markdown fence or surround it with prose: a fenced
/// block wins, then the span from the first `{` to the last `}`, then the
/// trimmed text as-is.
pub fn extract_json_payload(text: &str) -> &str {
    let trimmed = text.trim();
    if serde_json::from_str::<IgnoredAny>(trimmed).is_ok() {
        return trimmed;
    }

    if let Some(fenced) = fenced_block(text) {
        return fenced;
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];

    // Skip an info string such as `json` when it is alone on the fence line.
    let body = match after_fence.find('\n') {
        Some(newline)
            if after_fence[..newline]
                .trim()
                .chars()
                .all(|c| c.is_ascii_alphanumeric()) =>
        {
            &after_fence[newline + 1..]
        }
        _ => after_fence,
    };

    let close = body.find("```")?;
    Some(body[..close].trim())
}

fn market_type(object: &Map<String, Value>) -> Result<MarketType, ValidationError> {
    match object.get("type") {
        Some(Value::String(name)) => MarketType::parse(name).ok_or_else(|| {
            ValidationError::unknown_type(format!("unsupported market type '{}'", name))
        }),
        Some(other) => Err(ValidationError::unknown_type(format!(
            "market type must be a string, got {}",
            other
        ))),
        None => Err(ValidationError::unknown_type("missing 'type' field")),
    }
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str, ValidationError> {
    match object.get(field) {
        Some(Value::String(text)) => Ok(text.as_str()),
        Some(other) => Err(ValidationError::schema_mismatch(
            field,
            format!("expected a string, got {}", json_kind(other)),
        )),
        None => Err(ValidationError::schema_mismatch(field, "missing")),
    }
}

// Outcomes are canonically plain strings. Object entries are accepted when they
// carry a string `label` or `name`, and are reduced to that label here.
fn outcome_labels(object: &Map<String, Value>) -> Result<Vec<String>, ValidationError> {
    let entries = match object.get("outcomes") {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ValidationError::schema_mismatch(
                "outcomes",
                format!("expected an array, got {}", json_kind(other)),
            ));
        }
        None => return Err(ValidationError::schema_mismatch("outcomes", "missing")),
    };

    entries
        .iter()
        .map(|entry| match entry {
            Value::String(label) => Ok(label.trim().to_string()),
            Value::Object(wrapped) => wrapped
                .get("label")
                .or_else(|| wrapped.get("name"))
                .and_then(Value::as_str)
                .map(|label| label.trim().to_string())
                .ok_or_else(|| {
                    ValidationError::schema_mismatch(
                        "outcomes",
                        "object outcomes need a string 'label' or 'name'",
                    )
                }),
            other => Err(ValidationError::schema_mismatch(
                "outcomes",
                format!("outcome entries must be strings, got {}", json_kind(other)),
            )),
        })
        .collect()
}

fn tags(object: &Map<String, Value>) -> Result<Vec<String>, ValidationError> {
    let entries = match object.get("tags") {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ValidationError::schema_mismatch(
                "tags",
                format!("expected an array, got {}", json_kind(other)),
            ));
        }
        None => return Err(ValidationError::schema_mismatch("tags", "missing")),
    };

    let mut seen = HashSet::new();
    let mut tags = Vec::with_capacity(entries.len());
    for entry in entries {
        let tag = entry
            .as_str()
            .ok_or_else(|| ValidationError::schema_mismatch("tags", "tags must be strings"))?;
        // Tags form a set; keep first occurrence order.
        if seen.insert(tag.to_string()) {
            tags.push(tag.to_string());
        }
    }
    Ok(tags)
}

fn check_outcomes(market_type: MarketType, outcomes: &[String]) -> Result<(), ValidationError> {
    let bounds = market_type.outcome_bounds();
    if !bounds.contains(&outcomes.len()) {
        return Err(ValidationError::outcome_count(format!(
            "{} market needs {} to {} outcomes, got {}",
            market_type,
            bounds.start(),
            bounds.end(),
            outcomes.len()
        )));
    }

    if outcomes.iter().any(|label| label.is_empty()) {
        return Err(ValidationError::outcome_count("outcome labels must not be empty"));
    }

    let mut seen = HashSet::new();
    for label in outcomes {
        if !seen.insert(label.to_lowercase()) {
            return Err(ValidationError::outcome_count(format!(
                "duplicate outcome '{}'",
                label
            )));
        }
    }

    Ok(())
}

fn parse_deadline(text: &str) -> Result<NaiveDate, ValidationError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|moment| moment.date_naive()))
        .map_err(|_| {
            ValidationError::schema_mismatch(
                "deadline",
                format!("'{}' is not a YYYY-MM-DD date", text),
            )
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
