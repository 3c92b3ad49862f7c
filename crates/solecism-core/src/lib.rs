//! Core statistical analysis for API-usage anomaly detection.
//!
//! This crate provides the fundamental algorithms for `solecism`: given a
//! corpus of observed call traces and a trained sequence model (queried as a
//! black-box next-token oracle), it computes per-location and per-sequence
//! anomaly scores by comparing the empirical distribution of observed
//! sequences against the distribution the model predicts.
//!
//! The pieces, leaf-first:
//!
//! - [`corpus`]: the normalized trace model (packages → sequences → events)
//! - [`vocab`] / [`distribution`]: token tables and vocabulary-indexed
//!   probability rows
//! - [`predictor`]: the oracle trait a trained model implements
//! - [`cache`]: prefix-trie memoization of oracle queries (the hot path)
//! - [`aggregate`]: probability-stream reduction (log-likelihoods, metrics)
//! - [`kld`]: empirical-vs-model KL divergence, exact and bootstrap
//! - [`topic`]: LDA topic inference with a collapsed Gibbs sampler
//! - [`ranking`]: score ranking and Mean Average Precision
//!
//! # Usage
//!
//! This crate is typically used through the main `solecism` crate, which adds
//! corpus I/O, session orchestration, and report formatting. It can be used
//! directly when the caller already holds an in-memory corpus and predictor.
//!
//! ```ignore
//! use solecism_core::{
//!     aggregate::{sequence_log_likelihood, Metric},
//!     cache::QueryCache,
//!     kld::{location_kld, KldConfig},
//! };
//! ```

pub mod aggregate;
pub mod cache;
pub mod constants;
pub mod corpus;
pub mod distribution;
pub mod kld;
pub mod math;
pub mod predictor;
pub mod ranking;
pub mod topic;
pub mod vocab;

// Re-export commonly used items at crate root
pub use aggregate::{Metric, MetricScore};
pub use cache::QueryCache;
pub use corpus::{CallEvent, Corpus, Event, Package, Sequence};
pub use distribution::ProbabilityRow;
pub use kld::{KldConfig, KldMode};
pub use predictor::{LatentSpec, QueryError, SequencePredictor};
pub use ranking::mean_average_precision;
pub use topic::{GibbsConfig, LdaConfig, LdaModel};
pub use vocab::{TokenId, TokenKind, Vocabulary};
