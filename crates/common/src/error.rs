//! Error types for fixture loading

use thiserror::Error;

/// Result type alias using [`FixtureError`]
pub type Result<T> = std::result::Result<T, FixtureError>;

/// Fixture table errors
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Duplicate fixture id: {0}")]
    DuplicateId(String),

    #[error("Fixture has an empty id (name: {0:?})")]
    EmptyId(String),

    #[error("Fixture {id}: partial input {partial:?} is not a strict prefix of {input:?}")]
    InvalidPartialInput {
        id: String,
        partial: String,
        input: String,
    },

    #[error("Fixture not found: {0}")]
    NotFound(String),
}
