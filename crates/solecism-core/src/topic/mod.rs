//! Topic inference over bag-of-calls evidence.
//!
//! A package's distinct calls form a document; LDA over those documents
//! yields the K-dimensional topic vectors that condition the sequence
//! predictor. [`lda`] holds the batch variational trainer and the
//! deterministic point-estimate transform; [`gibbs`] adds the collapsed
//! Gibbs sampler used to draw multiple plausible topic vectors from the
//! posterior.

mod gibbs;
mod lda;

pub use gibbs::GibbsConfig;
pub use lda::{CallVectorizer, InferenceResult, LdaConfig, LdaModel};
