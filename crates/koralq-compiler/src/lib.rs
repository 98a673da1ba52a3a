//! KoralQ compiler: corpus query languages in, KoralQuery JSON-LD out.
//!
//! This crate provides the translation pipeline:
//! - `lang` - one lexer/parser/normalizer per source language
//! - `classes` - class-id allocation
//! - `literal` - term literal normalization (quotes, escapes, flags)
//! - `distance` - repetition and proximity boundary encoding
//! - `frames` - position frame mapping
//! - `chain` - relation-chain resolution over numbered operand slots
//! - `serializer` - the `QuerySerializer` front door and the document
//!   envelope
//!
//! Malformed user input never surfaces as [`Error`]: translation is
//! best-effort and failures travel as `errors` entries inside the
//! emitted document. The [`Error`] type covers API misuse and JSON
//! rendering only.

pub mod chain;
pub mod classes;
pub mod distance;
pub mod frames;
pub mod lang;
pub mod literal;
pub mod serializer;

#[cfg(test)]
mod distance_tests;
#[cfg(test)]
mod literal_tests;

pub use serializer::{QueryLanguage, QuerySerializer};

/// Errors for callers of the serializer API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No query string was set before serialization.
    #[error("no query given")]
    NoQuery,

    /// The requested source language is not supported.
    #[error("unknown query language `{0}`")]
    UnknownLanguage(String),

    /// The assembled document could not be rendered as JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for serializer operations.
pub type Result<T> = std::result::Result<T, Error>;
