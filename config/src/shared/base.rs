use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required textual field was left empty.
    #[error("`{0}` cannot be empty")]
    EmptyField(&'static str),
    /// A field holds a value outside of its accepted range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: &'static str,
    },
}
