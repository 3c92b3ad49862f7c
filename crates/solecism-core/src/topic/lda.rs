//! Batch variational LDA over bag-of-calls documents.
//!
//! Standard Blei-style variational EM: per-document topic proportions γ and
//! the topic-term matrix λ are updated alternately until the per-document
//! mean change drops below tolerance. After training, each topic's term
//! distribution is normalized to sum 1; inference is a deterministic
//! variational transform against that normalized matrix, so the
//! normalization never perturbs later `infer` results.
//!
//! Calls absent from the trained vocabulary are collected into a
//! not-in-vocabulary diagnostic list and surfaced to the caller; they never
//! abort a batch run.

use std::collections::HashMap;

use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DOC_TOPIC_PRIOR, DEFAULT_DOC_UPDATE_ITER, DEFAULT_LDA_MAX_ITER,
    DEFAULT_MEAN_CHANGE_TOL, DEFAULT_SEED, TERMINAL,
};
use crate::math::digamma;

/// Training hyperparameters.
#[derive(Debug, Clone)]
pub struct LdaConfig {
    /// Number of topics K.
    pub ntopics: usize,
    /// Dirichlet document-topic prior α.
    pub doc_topic_prior: f64,
    /// Maximum variational EM iterations.
    pub max_iter: usize,
    /// Maximum per-document update iterations in the E-step.
    pub max_doc_update_iter: usize,
    /// Mean-change tolerance for the per-document loop.
    pub mean_change_tol: f64,
    /// RNG seed for the topic-term initialization.
    pub seed: u64,
}

impl LdaConfig {
    /// Defaults matching the converged training setup: α = 0.1, 100 EM
    /// iterations, 100 document updates, 1e-5 tolerance.
    pub fn new(ntopics: usize) -> Self {
        Self {
            ntopics,
            doc_topic_prior: DEFAULT_DOC_TOPIC_PRIOR,
            max_iter: DEFAULT_LDA_MAX_ITER,
            max_doc_update_iter: DEFAULT_DOC_UPDATE_ITER,
            mean_change_tol: DEFAULT_MEAN_CHANGE_TOL,
            seed: DEFAULT_SEED,
        }
    }
}

/// Bag-of-calls → term-count vectorizer, fitted once at training time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallVectorizer {
    terms: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CallVectorizer {
    /// Fit over the training documents: the vocabulary is every distinct
    /// call excluding the terminal sentinel, sorted for determinism.
    pub fn fit<S: AsRef<str>>(documents: &[Vec<S>]) -> Self {
        let mut terms: Vec<String> = documents
            .iter()
            .flatten()
            .map(|s| s.as_ref())
            .filter(|s| *s != TERMINAL)
            .map(str::to_string)
            .collect();
        terms.sort();
        terms.dedup();
        let index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Self { terms, index }
    }

    /// Rebuild the lookup table after deserialization.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
    }

    /// Vocabulary size.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms in index order.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Count-vectorize one document. Unknown calls are returned in the
    /// second element rather than silently dropped.
    pub fn transform<S: AsRef<str>>(&self, document: &[S]) -> (Vec<f64>, Vec<String>) {
        let mut counts = vec![0.0; self.terms.len()];
        let mut missing = Vec::new();
        for term in document {
            let term = term.as_ref();
            if term == TERMINAL {
                continue;
            }
            match self.index.get(term) {
                Some(&i) => counts[i] += 1.0,
                None => missing.push(term.to_string()),
            }
        }
        (counts, missing)
    }
}

/// Result of [`LdaModel::infer`]: one topic vector per document, plus the
/// accumulated not-in-vocabulary diagnostics.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    /// Per-document topic distributions (each sums to 1).
    pub doc_topics: Vec<Vec<f64>>,
    /// Per-document calls that were absent from the trained vocabulary.
    pub missing: Vec<Vec<String>>,
}

/// A trained topic model: normalized topic-term matrix plus the fitted
/// vectorizer. Read-only after training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdaModel {
    /// K×V matrix; each row sums to 1.
    pub topic_term: Vec<Vec<f64>>,
    /// The fitted bag-of-calls vectorizer.
    pub vectorizer: CallVectorizer,
    /// Dirichlet document-topic prior α used at training time.
    pub doc_topic_prior: f64,
}

/// E[log θ] under Dirichlet(γ), exponentiated.
fn exp_dirichlet_expectation(gamma: &[f64]) -> Vec<f64> {
    let total = digamma(gamma.iter().sum());
    gamma.iter().map(|&g| (digamma(g) - total).exp()).collect()
}

/// One document's variational update loop. Returns (γ, φ-weighted counts
/// per topic-term used for the M-step sufficient statistics).
fn update_document(
    counts: &[f64],
    exp_elog_beta: &[Vec<f64>],
    alpha: f64,
    max_iter: usize,
    tol: f64,
) -> Vec<f64> {
    let k = exp_elog_beta.len();
    let mut gamma = vec![1.0; k];
    for _ in 0..max_iter {
        let exp_elog_theta = exp_dirichlet_expectation(&gamma);
        let mut new_gamma = vec![alpha; k];
        for (w, &c) in counts.iter().enumerate() {
            if c == 0.0 {
                continue;
            }
            let phinorm: f64 = (0..k)
                .map(|t| exp_elog_theta[t] * exp_elog_beta[t][w])
                .sum::<f64>()
                + 1e-100;
            for (t, ng) in new_gamma.iter_mut().enumerate() {
                *ng += exp_elog_theta[t] * exp_elog_beta[t][w] * c / phinorm;
            }
        }
        let mean_change: f64 = gamma
            .iter()
            .zip(&new_gamma)
            .map(|(a, b)| (a - b).abs())
            .sum::<f64>()
            / k as f64;
        gamma = new_gamma;
        if mean_change < tol {
            break;
        }
    }
    gamma
}

impl LdaModel {
    /// Train on bag-of-calls documents with batch variational EM.
    pub fn train<S: AsRef<str>>(documents: &[Vec<S>], cfg: &LdaConfig) -> LdaModel {
        let vectorizer = CallVectorizer::fit(documents);
        let vocab_size = vectorizer.len();
        let k = cfg.ntopics.max(1);
        let counts: Vec<Vec<f64>> = documents
            .iter()
            .map(|d| vectorizer.transform(d).0)
            .collect();

        // λ init: Gamma(100, 1/100) draws, the usual diffuse start.
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(cfg.seed);
        let gamma_dist = Gamma::new(100.0, 0.01).expect("valid gamma parameters");
        let mut lambda: Vec<Vec<f64>> = (0..k)
            .map(|_| (0..vocab_size).map(|_| gamma_dist.sample(&mut rng)).collect())
            .collect();

        let eta = 1.0 / k as f64; // topic-word prior

        for _ in 0..cfg.max_iter {
            let exp_elog_beta: Vec<Vec<f64>> =
                lambda.iter().map(|row| exp_dirichlet_expectation(row)).collect();

            let mut sstats = vec![vec![0.0; vocab_size]; k];
            for doc_counts in &counts {
                let gamma = update_document(
                    doc_counts,
                    &exp_elog_beta,
                    cfg.doc_topic_prior,
                    cfg.max_doc_update_iter,
                    cfg.mean_change_tol,
                );
                let exp_elog_theta = exp_dirichlet_expectation(&gamma);
                for (w, &c) in doc_counts.iter().enumerate() {
                    if c == 0.0 {
                        continue;
                    }
                    let phinorm: f64 = (0..k)
                        .map(|t| exp_elog_theta[t] * exp_elog_beta[t][w])
                        .sum::<f64>()
                        + 1e-100;
                    for (t, row) in sstats.iter_mut().enumerate() {
                        row[w] += exp_elog_theta[t] * c / phinorm;
                    }
                }
            }

            let mut max_change = 0.0f64;
            for t in 0..k {
                for w in 0..vocab_size {
                    let updated = eta + exp_elog_beta[t][w] * sstats[t][w];
                    max_change = max_change.max((updated - lambda[t][w]).abs());
                    lambda[t][w] = updated;
                }
            }
            if max_change < cfg.mean_change_tol {
                break;
            }
        }

        // Normalize each topic's term distribution to sum 1. Inference below
        // consumes the normalized matrix, so this cannot perturb it.
        for row in &mut lambda {
            crate::math::normalize(row);
        }

        LdaModel {
            topic_term: lambda,
            vectorizer,
            doc_topic_prior: cfg.doc_topic_prior,
        }
    }

    /// Number of topics K.
    pub fn ntopics(&self) -> usize {
        self.topic_term.len()
    }

    /// Deterministic variational transform: one topic-vector point estimate
    /// per document. Unknown calls land in the diagnostics list.
    pub fn infer<S: AsRef<str>>(&self, documents: &[Vec<S>]) -> InferenceResult {
        let k = self.ntopics();
        let mut doc_topics = Vec::with_capacity(documents.len());
        let mut missing = Vec::with_capacity(documents.len());
        for document in documents {
            let (counts, miss) = self.vectorizer.transform(document);
            let mut gamma = update_document(
                &counts,
                &self.topic_term,
                self.doc_topic_prior,
                DEFAULT_DOC_UPDATE_ITER,
                DEFAULT_MEAN_CHANGE_TOL,
            );
            crate::math::normalize(&mut gamma);
            doc_topics.push(gamma);
            missing.push(miss);
        }
        InferenceResult { doc_topics, missing }
    }

    /// Topic vector for a single document.
    pub fn infer_one<S: AsRef<str>>(&self, document: &[S]) -> (Vec<f64>, Vec<String>) {
        let (counts, missing) = self.vectorizer.transform(document);
        let mut gamma = update_document(
            &counts,
            &self.topic_term,
            self.doc_topic_prior,
            DEFAULT_DOC_UPDATE_ITER,
            DEFAULT_MEAN_CHANGE_TOL,
        );
        crate::math::normalize(&mut gamma);
        (gamma, missing)
    }

    /// Top `n` terms of each topic with their weights, heaviest first.
    pub fn top_words(&self, n: usize) -> Vec<Vec<(String, f64)>> {
        self.topic_term
            .iter()
            .map(|row| {
                let mut ranked: Vec<(String, f64)> = row
                    .iter()
                    .enumerate()
                    .map(|(w, &p)| (self.vectorizer.terms()[w].clone(), p))
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                ranked.truncate(n);
                ranked
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<Vec<String>> {
        // Two clearly separated themes.
        vec![
            vec!["open".into(), "read".into(), "close".into()],
            vec!["open".into(), "read".into()],
            vec!["connect".into(), "send".into(), "recv".into()],
            vec!["connect".into(), "send".into()],
        ]
    }

    #[test]
    fn test_vectorizer_excludes_terminal() {
        let docs = vec![vec!["a".to_string(), TERMINAL.to_string(), "b".to_string()]];
        let v = CallVectorizer::fit(&docs);
        assert_eq!(v.terms(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_vectorizer_reports_missing() {
        let v = CallVectorizer::fit(&[vec!["a".to_string()]]);
        let (counts, missing) = v.transform(&["a".to_string(), "zzz".to_string()]);
        assert_eq!(counts, vec![1.0]);
        assert_eq!(missing, vec!["zzz".to_string()]);
    }

    #[test]
    fn test_topic_term_rows_normalized() {
        let model = LdaModel::train(&docs(), &LdaConfig::new(2));
        for row in &model.topic_term {
            let total: f64 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "row sums to {}", total);
        }
    }

    #[test]
    fn test_infer_is_deterministic() {
        let model = LdaModel::train(&docs(), &LdaConfig::new(2));
        let a = model.infer(&docs());
        let b = model.infer(&docs());
        assert_eq!(a.doc_topics, b.doc_topics, "infer is a pure transform");
    }

    #[test]
    fn test_doc_topics_are_distributions() {
        let model = LdaModel::train(&docs(), &LdaConfig::new(3));
        let result = model.infer(&docs());
        for dist in &result.doc_topics {
            assert_eq!(dist.len(), 3);
            let total: f64 = dist.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
            assert!(dist.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_single_topic_inference_is_degenerate() {
        let model = LdaModel::train(&docs(), &LdaConfig::new(1));
        let result = model.infer(&docs());
        for dist in &result.doc_topics {
            assert_eq!(dist.len(), 1);
            assert!((dist[0] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_separated_themes_get_distinct_topics() {
        let model = LdaModel::train(&docs(), &LdaConfig::new(2));
        let result = model.infer(&docs());
        let file_doc = &result.doc_topics[0];
        let net_doc = &result.doc_topics[2];
        let file_major = file_doc
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        let net_major = net_doc
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap()
            .0;
        assert_ne!(
            file_major, net_major,
            "file and network documents should prefer different topics"
        );
    }

    #[test]
    fn test_top_words() {
        let model = LdaModel::train(&docs(), &LdaConfig::new(2));
        let tops = model.top_words(3);
        assert_eq!(tops.len(), 2);
        for topic in &tops {
            assert!(topic.len() <= 3);
            // Weights descend
            for pair in topic.windows(2) {
                assert!(pair[0].1 >= pair[1].1);
            }
        }
    }
}
