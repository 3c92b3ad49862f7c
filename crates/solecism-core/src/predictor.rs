//! The sequence-predictor oracle surface.
//!
//! The trained RNN is an external collaborator: the estimators only require
//! "given a latent specification and an event prefix, return a distribution
//! over the next token". Anything satisfying [`SequencePredictor`] works,
//! including the deterministic mocks the tests use.

use std::fmt;
use std::sync::Arc;

use crate::corpus::{CallEvent, Package};
use crate::distribution::ProbabilityRow;
use crate::vocab::Vocabulary;

/// Per-package latent specification ("psi"): an opaque numeric context vector
/// computed once from a package's evidence and threaded through every
/// predictor query for that package.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentSpec(pub Vec<f64>);

/// Errors from predictor queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// `next_state` was queried on a zero-length sequence. Fatal to the call;
    /// callers may recover by skipping the sequence.
    EmptySequence,
    /// The predictor produced a token outside the expected vocabulary subset
    /// (a state token where a call was expected, or vice versa). Indicates a
    /// vocabulary mismatch between model and data.
    PredictionShape {
        /// What the query expected ("call" or "state").
        expected: &'static str,
        /// The offending predicted term.
        got: String,
    },
    /// A queried token is absent from the model vocabulary.
    UnknownToken {
        /// The missing term.
        term: String,
    },
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::EmptySequence => {
                write!(f, "sequence cannot be empty when querying next state")
            }
            QueryError::PredictionShape { expected, got } => {
                write!(f, "improper {} predicted by model: '{}'", expected, got)
            }
            QueryError::UnknownToken { term } => {
                write!(f, "token '{}' is not in the model vocabulary", term)
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// A trained sequence model queried as a next-token oracle.
///
/// Implementations may hold serialized hidden-state tensors that require
/// exclusive access; callers serialize queries per session (the query cache
/// guarantees this within a package).
pub trait SequencePredictor {
    /// The token vocabulary the model was trained with.
    fn vocabulary(&self) -> &Arc<Vocabulary>;

    /// Compute the latent specification for a package from its evidence.
    fn latent_spec(&self, package: &Package) -> LatentSpec;

    /// Distribution over the next call token given the prior call events.
    /// An empty prefix queries the distribution over the first call.
    fn next_call(&self, spec: &LatentSpec, prefix: &[CallEvent])
        -> Result<ProbabilityRow, QueryError>;

    /// Distribution over the value at state slot `slot` of the *last* call in
    /// `prefix`, given all prior calls and that call's earlier state slots.
    ///
    /// # Errors
    ///
    /// [`QueryError::EmptySequence`] if `prefix` is empty.
    fn next_state(
        &self,
        spec: &LatentSpec,
        prefix: &[CallEvent],
        slot: usize,
    ) -> Result<ProbabilityRow, QueryError>;
}
