//! Placeholder substitution for instruction templates.
//!
//! A placeholder is `{name}` where `name` is an identifier, or `{name?}` for a
//! value that may be absent. Any other brace is copied through untouched, so
//! JSON examples can live inside a template without escaping.

use serde_json::Value;

use crate::error::TemplateError;
use crate::session::State;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub optional: bool,
}

/// Substitutes every placeholder of `template` with its value from `state`.
///
/// Fails on the first required placeholder with no matching key.
pub fn render(template: &str, state: &State) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match parse_placeholder(after) {
            Some((placeholder, consumed)) => {
                match state.get(&placeholder.name) {
                    Some(value) => rendered.push_str(&value_to_text(value)),
                    None if placeholder.optional => {}
                    None => return Err(TemplateError::MissingVariable(placeholder.name)),
                }
                rest = &after[consumed..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }

    rendered.push_str(rest);
    Ok(rendered)
}

/// Lists the placeholders of `template` in order of appearance.
pub fn placeholders(template: &str) -> Vec<Placeholder> {
    let mut found = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match parse_placeholder(after) {
            Some((placeholder, consumed)) => {
                found.push(placeholder);
                rest = &after[consumed..];
            }
            None => rest = after,
        }
    }

    found
}

/// Text form of a state value as it appears in a rendered template.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        // One item per line so category lists read as a block.
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value_to_text(value)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

// Parses `name}` or `name?}` at the start of `text`. Returns the placeholder and
// the number of bytes consumed, closing brace included.
fn parse_placeholder(text: &str) -> Option<(Placeholder, usize)> {
    let bytes = text.as_bytes();
    let first = *bytes.first()?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }

    let len = bytes
        .iter()
        .take_while(|byte| byte.is_ascii_alphanumeric() || **byte == b'_')
        .count();
    let name = text[..len].to_string();

    match &bytes[len..] {
        [b'}', ..] => Some((
            Placeholder {
                name,
                optional: false,
            },
            len + 1,
        )),
        [b'?', b'}', ..] => Some((
            Placeholder {
                name,
                optional: true,
            },
            len + 2,
        )),
        _ => None,
    }
}
