//! API-usage anomaly detection over call-trace corpora.
//!
//! `solecism` scores observed API usage against a trained sequence model:
//! locations whose empirical sequence distribution diverges from what the
//! model predicts are flagged as likely misuses. This crate is the std
//! surface over [`solecism_core`]: corpus I/O, raw-probability-file
//! aggregation, topic-model persistence, per-package session orchestration,
//! and report formatting.
//!
//! # Pipeline
//!
//! 1. [`data::load_corpus`] reads the JSON trace corpus.
//! 2. [`topics`] trains/applies an LDA model so each package carries a topic
//!    vector conditioning the predictor.
//! 3. [`session::Session`] drives the divergence and log-likelihood
//!    estimators package by package (fan out with the `parallel` feature).
//! 4. [`report`] renders the ranked scores for terminals or as JSON;
//!    [`probfile`] aggregates pre-computed probability files instead when
//!    the model ran elsewhere.
//!
//! The predictor itself is a black box behind
//! [`solecism_core::SequencePredictor`]; any next-token model can sit there.

pub mod artifact;
pub mod data;
pub mod probfile;
pub mod report;
pub mod session;
pub mod topics;

pub use artifact::{load_model, save_model};
pub use data::{load_corpus, CorpusError};
pub use probfile::{ReportError, ScoredRecord};
pub use session::{LocationScore, Session};

// The core types callers need to implement a predictor or inspect results.
pub use solecism_core::{
    CallEvent, Corpus, Event, KldConfig, KldMode, LatentSpec, Metric, MetricScore, Package,
    ProbabilityRow, QueryCache, QueryError, Sequence, SequencePredictor, TokenKind, Vocabulary,
};
