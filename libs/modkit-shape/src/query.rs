//! `$include`, `$exclude` and `$deltatoken` clause parsing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::shape::FieldSelection;

pub const INCLUDE: &str = "$include";
pub const EXCLUDE: &str = "$exclude";
pub const DELTA_TOKEN: &str = "$deltatoken";

/// Shaping-related query parameters as they arrive on a request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeParams {
    #[serde(rename = "$include", default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
    #[serde(rename = "$exclude", default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    #[serde(rename = "$deltatoken", default, skip_serializing_if = "Option::is_none")]
    pub delta_token: Option<String>,
}

/// Budgets for client-supplied clauses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryLimits {
    pub max_clause_len: usize,
    pub max_fields: usize,
    pub max_token_len: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_clause_len: 2048,
            max_fields: 100,
            max_token_len: 512,
        }
    }
}

/// Parse a comma-separated field list.
///
/// Whitespace is trimmed and empty segments are skipped. Names keep their
/// case; duplicates are detected case-insensitively.
///
/// # Errors
/// `QueryError::Empty`, `QueryError::TooLong`, `QueryError::TooManyFields` or
/// `QueryError::DuplicateField`.
pub fn parse_field_list(
    clause: &'static str,
    raw: &str,
    limits: &QueryLimits,
) -> Result<Vec<String>, QueryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QueryError::Empty { clause });
    }
    if raw.len() > limits.max_clause_len {
        return Err(QueryError::TooLong { clause });
    }

    let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_owned)
        .collect();

    if fields.is_empty() {
        return Err(QueryError::Empty { clause });
    }
    if fields.len() > limits.max_fields {
        return Err(QueryError::TooManyFields { clause });
    }

    let mut seen = HashSet::with_capacity(fields.len());
    for field in &fields {
        if !seen.insert(field.to_lowercase()) {
            return Err(QueryError::DuplicateField {
                clause,
                field: field.clone(),
            });
        }
    }

    Ok(fields)
}

impl FieldSelection {
    /// Selection requested by `params`; `All` when neither clause is present.
    ///
    /// # Errors
    /// `QueryError::IncludeWithExclude` when both clauses are given, or any
    /// error of [`parse_field_list`].
    pub fn from_params(params: &ShapeParams, limits: &QueryLimits) -> Result<Self, QueryError> {
        match (params.include.as_deref(), params.exclude.as_deref()) {
            (Some(_), Some(_)) => Err(QueryError::IncludeWithExclude),
            (Some(raw), None) => parse_field_list(INCLUDE, raw, limits).map(FieldSelection::Include),
            (None, Some(raw)) => parse_field_list(EXCLUDE, raw, limits).map(FieldSelection::Exclude),
            (None, None) => Ok(FieldSelection::All),
        }
    }
}

/// Validate a `$deltatoken` before it is looked up.
///
/// Only length and alphabet are checked; tokens stay opaque.
///
/// # Errors
/// `QueryError::Empty`, `QueryError::TooLong` or `QueryError::MalformedToken`.
pub fn parse_delta_token<'a>(raw: &'a str, limits: &QueryLimits) -> Result<&'a str, QueryError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(QueryError::Empty {
            clause: DELTA_TOKEN,
        });
    }
    if token.len() > limits.max_token_len {
        return Err(QueryError::TooLong {
            clause: DELTA_TOKEN,
        });
    }
    if !token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(QueryError::MalformedToken);
    }
    Ok(token)
}
