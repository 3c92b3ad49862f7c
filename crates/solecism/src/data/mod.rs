//! Corpus input: parsing and validation of trace data.
//!
//! The on-disk format is JSON: `packages[].{name, data[].sequence[], topic?}`,
//! where each sequence entry is either a call event
//! `{call, states?, location}` or a branch marker `{branches}`. Parsing is
//! fail-fast: the first malformed event aborts the load with an error naming
//! the offending package/sequence/event indices.

mod json;

use std::io;

use thiserror::Error;

pub use json::{corpus_from_reader, corpus_from_str, load_corpus};

/// Errors from corpus loading.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Underlying I/O failure.
    #[error("corpus I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid JSON in the expected shape.
    #[error("corpus JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An event is neither a well-formed call nor a branch marker.
    #[error("malformed event (package {package}, sequence {sequence}, event {event}): {reason}")]
    MalformedEvent {
        /// Index of the package in input order.
        package: usize,
        /// Index of the sequence within the package.
        sequence: usize,
        /// Index of the event within the sequence.
        event: usize,
        /// What was wrong with it.
        reason: String,
    },
}
