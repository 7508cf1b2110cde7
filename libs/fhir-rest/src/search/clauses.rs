//! Per-type SQL clause builders.
//!
//! Each builder receives the values of one query parameter occurrence
//! (already split on unescaped commas) and returns a single SQL condition
//! OR-ing the values, or `None` when no value is usable. Values are always
//! bound, never spliced into the SQL text.

use super::escape::{escape_like, split_unescaped, unescape};
use super::BindValue;

/// String matching mode selected by the parameter modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StringMatch {
    /// Default FHIR string search: case-insensitive starts-with.
    StartsWith,
    /// `:contains` - case-insensitive substring.
    Contains,
    /// `:exact` - case-sensitive equality.
    Exact,
}

/// Token value with the system segment discarded.
///
/// `code`, `system|code` and `|code` all compare on the code alone;
/// `system|` carries no code and matches nothing comparable.
pub(crate) fn token_code(raw: &str) -> Option<String> {
    let parts = split_unescaped(raw, '|');
    let code = match parts.as_slice() {
        [code] => unescape(code),
        [_system, code] => unescape(code),
        _ => unescape(raw),
    };
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

/// Reference value normalized to the bare target id.
///
/// Accepts `id`, `Type/id`, absolute `http://host/fhir/Type/id` and
/// version-specific `Type/id/_history/n` forms.
pub(crate) fn reference_id(raw: &str) -> Option<String> {
    let value = unescape(raw);
    let value = value.trim();
    let without_version = value.split("/_history/").next().unwrap_or(value);
    let id = without_version
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_version);
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

pub(crate) fn build_token_clause(
    column: &str,
    values: &[&str],
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    let parts: Vec<String> = values
        .iter()
        .filter_map(|raw| token_code(raw))
        .map(|code| format!("{} = ${}", column, push(binds, code)))
        .collect();
    or_join(parts)
}

pub(crate) fn build_reference_clause(
    column: &str,
    values: &[&str],
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    let parts: Vec<String> = values
        .iter()
        .filter_map(|raw| reference_id(raw))
        .map(|id| format!("{} = ${}", column, push(binds, id)))
        .collect();
    or_join(parts)
}

pub(crate) fn build_string_clause(
    column: &str,
    values: &[&str],
    mode: StringMatch,
    binds: &mut Vec<BindValue>,
) -> Option<String> {
    let mut parts = Vec::new();
    for raw in values {
        let value = unescape(raw);
        if value.is_empty() {
            continue;
        }
        let clause = match mode {
            StringMatch::Exact => format!("{} = ${}", column, push(binds, value)),
            StringMatch::StartsWith => {
                let idx = push(binds, format!("{}%", escape_like(&value)));
                format!(r"{} ILIKE ${} ESCAPE E'\\'", column, idx)
            }
            StringMatch::Contains => {
                let idx = push(binds, format!("%{}%", escape_like(&value)));
                format!(r"{} ILIKE ${} ESCAPE E'\\'", column, idx)
            }
        };
        parts.push(clause);
    }
    or_join(parts)
}

fn push(binds: &mut Vec<BindValue>, value: String) -> usize {
    binds.push(BindValue::Text(value));
    binds.len()
}

fn or_join(mut parts: Vec<String>) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => Some(parts.remove(0)),
        _ => Some(format!("({})", parts.join(" OR "))),
    }
}
