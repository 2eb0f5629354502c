//! Error types for accessors, values, query clauses and configuration.
//!
//! Expected, client-driven conditions (unknown field in a projection, stale
//! delta link) are not errors: they surface as `Option`/`bool` from the
//! `try_*` APIs. The enums below cover everything that must fail loudly.

use thiserror::Error;

use crate::value::ValueKind;

/// Failure converting a [`Value`](crate::Value) into a concrete member type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: ValueKind },

    #[error("integer {value} does not fit into {target}")]
    OutOfRange { target: &'static str, value: i64 },

    #[error("type {0} has no registered constructor")]
    NotConstructible(&'static str),

    #[error("field {field}: {message}")]
    Field { field: String, message: String },
}

impl ValueError {
    pub(crate) fn mismatch(expected: impl Into<String>, got: ValueKind) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got,
        }
    }
}

/// Errors raised by the read/write accessors and by accessor construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    #[error("member '{member}' not found on {type_name}")]
    MemberNotFound {
        type_name: &'static str,
        member: String,
    },

    #[error("member '{member}' of {type_name} is not writable")]
    NotWritable {
        type_name: &'static str,
        member: String,
    },

    #[error("cannot assign '{member}' of {type_name}: {source}")]
    Assignment {
        type_name: &'static str,
        member: String,
        #[source]
        source: ValueError,
    },

    #[error("accessor for {expected} received an instance of another type")]
    InstanceMismatch { expected: &'static str },

    #[error("cannot construct {type_name}: {reason}")]
    Construction {
        type_name: &'static str,
        reason: String,
    },
}

impl AccessError {
    /// `true` for the "member not found" family, which `try_*` APIs map to a
    /// negative result instead of an error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MemberNotFound { .. })
    }
}

/// Invalid `$include` / `$exclude` / `$deltatoken` clause.
///
/// All variants are client errors; the HTTP layer maps them to 400.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("{clause} cannot be empty")]
    Empty { clause: &'static str },

    #[error("{clause} too long")]
    TooLong { clause: &'static str },

    #[error("{clause} contains too many fields")]
    TooManyFields { clause: &'static str },

    #[error("duplicate field in {clause}: {field}")]
    DuplicateField { clause: &'static str, field: String },

    #[error("$include and $exclude cannot be combined")]
    IncludeWithExclude,

    #[error("malformed $deltatoken")]
    MalformedToken,
}

/// Configuration could not be extracted.
#[derive(Error, Debug)]
#[error("invalid shaping configuration: {0}")]
pub struct ConfigError(#[from] Box<figment::Error>);

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self(Box::new(err))
    }
}
