//! Per-package scoring sessions.
//!
//! A session pairs a predictor with a corpus and drives the estimators over
//! it. Each package gets its own latent specification and query cache; the
//! pair never crosses package boundaries, which is what makes the package
//! fan-out embarrassingly parallel (enabled by the `parallel` feature).
//! Within a package, sequences are processed in corpus order so score keys
//! line up with `(package_index, sequence_index)`.

use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use solecism_core::aggregate::{call_probabilities, sequence_log_likelihood, Metric, MetricScore};
use solecism_core::cache::QueryCache;
use solecism_core::constants::DEFAULT_PROB_FLOOR;
use solecism_core::corpus::{CallEvent, Corpus, Package};
use solecism_core::kld::{location_kld, KldConfig};
use solecism_core::predictor::{QueryError, SequencePredictor};
use solecism_core::ranking::{anomalous_keys, mean_average_precision, sequence_key};

/// Divergence score of one program location within one package.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationScore {
    /// Index of the package in corpus order.
    pub package_index: usize,
    /// Package name.
    pub package_name: String,
    /// The scored location.
    pub location: String,
    /// KL divergence at that location.
    pub score: f64,
}

/// A predictor bound to scoring configuration.
pub struct Session<'a, P> {
    predictor: &'a P,
    kld: KldConfig,
    prob_floor: f64,
}

impl<'a, P: SequencePredictor + Sync> Session<'a, P> {
    /// Bind a predictor with default configuration.
    pub fn new(predictor: &'a P) -> Self {
        Self {
            predictor,
            kld: KldConfig::default(),
            prob_floor: DEFAULT_PROB_FLOOR,
        }
    }

    /// Override the divergence estimator configuration.
    pub fn with_kld(mut self, kld: KldConfig) -> Self {
        self.prob_floor = kld.prob_floor;
        self.kld = kld;
        self
    }

    fn package_locations(
        &self,
        package_index: usize,
        package: &Package,
    ) -> Result<Vec<LocationScore>, QueryError> {
        let spec = self.predictor.latent_spec(package);
        let mut cache = QueryCache::new();
        let mut scores = Vec::new();
        for location in package.locations() {
            let pool = package.sequences_ending_at(location);
            let score =
                location_kld(self.predictor, &mut cache, &spec, &pool, &self.kld)?;
            scores.push(LocationScore {
                package_index,
                package_name: package.name.clone(),
                location: location.to_string(),
                score,
            });
        }
        Ok(scores)
    }

    /// Divergence score for every `(package, location)` pair, in corpus
    /// order.
    pub fn location_scores(&self, corpus: &Corpus) -> Result<Vec<LocationScore>, QueryError> {
        #[cfg(feature = "parallel")]
        let per_package: Result<Vec<Vec<LocationScore>>, QueryError> = corpus
            .packages
            .par_iter()
            .enumerate()
            .map(|(k, package)| self.package_locations(k, package))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let per_package: Result<Vec<Vec<LocationScore>>, QueryError> = corpus
            .packages
            .iter()
            .enumerate()
            .map(|(k, package)| self.package_locations(k, package))
            .collect();

        Ok(per_package?.into_iter().flatten().collect())
    }

    fn package_log_likelihoods(
        &self,
        package_index: usize,
        package: &Package,
    ) -> Result<Vec<(String, f64)>, QueryError> {
        let spec = self.predictor.latent_spec(package);
        let mut cache = QueryCache::new();
        let mut scores = Vec::new();
        for (j, sequence) in package.sequences.iter().enumerate() {
            let events: Vec<CallEvent> = sequence.call_events().cloned().collect();
            let llh = sequence_log_likelihood(
                self.predictor,
                &mut cache,
                &spec,
                &events,
                self.prob_floor,
            )?;
            scores.push((sequence_key(package_index, j, sequence), llh));
        }
        Ok(scores)
    }

    /// Full log-likelihood of every sequence, keyed by
    /// `(package_index, sequence_index, joined calls)`.
    pub fn sequence_log_likelihoods(
        &self,
        corpus: &Corpus,
    ) -> Result<BTreeMap<String, f64>, QueryError> {
        #[cfg(feature = "parallel")]
        let per_package: Result<Vec<Vec<(String, f64)>>, QueryError> = corpus
            .packages
            .par_iter()
            .enumerate()
            .map(|(k, package)| self.package_log_likelihoods(k, package))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let per_package: Result<Vec<Vec<(String, f64)>>, QueryError> = corpus
            .packages
            .iter()
            .enumerate()
            .map(|(k, package)| self.package_log_likelihoods(k, package))
            .collect();

        Ok(per_package?.into_iter().flatten().collect())
    }

    /// Apply a metric to each sequence's per-call probability vector
    /// (including the terminal STOP probability).
    pub fn sequence_metric_scores(
        &self,
        corpus: &Corpus,
        metric: Metric,
    ) -> Result<BTreeMap<String, MetricScore>, QueryError> {
        let mut out = BTreeMap::new();
        for (k, package) in corpus.packages.iter().enumerate() {
            let spec = self.predictor.latent_spec(package);
            let mut cache = QueryCache::new();
            for (j, sequence) in package.sequences.iter().enumerate() {
                let events: Vec<CallEvent> = sequence.call_events().cloned().collect();
                let probs = call_probabilities(self.predictor, &mut cache, &spec, &events)?;
                out.insert(
                    sequence_key(k, j, sequence),
                    metric.apply(&probs, self.prob_floor),
                );
            }
        }
        Ok(out)
    }

    /// Mean Average Precision of a metric's anomaly ranking against the
    /// corpus's ground-truth anomalous tags. `None` when the corpus carries
    /// no ground truth.
    pub fn map_score(&self, corpus: &Corpus, metric: Metric) -> Result<Option<f64>, QueryError> {
        let truth = anomalous_keys(corpus);
        let scored = self.sequence_metric_scores(corpus, metric)?;
        let scores = scored
            .into_iter()
            .map(|(key, score)| (key, score.score))
            .collect();
        Ok(mean_average_precision(&scores, &truth))
    }
}

/// Keep the top `percent`% of location scores (score-descending), then the
/// single highest-scoring location per package among those.
pub fn top_fraction(scores: &[LocationScore], percent: f64) -> Vec<LocationScore> {
    let mut ranked: Vec<LocationScore> = scores.to_vec();
    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.package_index.cmp(&b.package_index))
            .then_with(|| a.location.cmp(&b.location))
    });
    let keep = ((ranked.len() as f64) * percent / 100.0).ceil() as usize;
    ranked.truncate(keep);

    let mut seen = std::collections::HashSet::new();
    ranked
        .into_iter()
        .filter(|s| seen.insert(s.package_index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(package: usize, location: &str, score: f64) -> LocationScore {
        LocationScore {
            package_index: package,
            package_name: format!("p{}", package),
            location: location.to_string(),
            score,
        }
    }

    #[test]
    fn test_top_fraction_keeps_best_per_package() {
        let scores = vec![
            loc(0, "a", 5.0),
            loc(0, "b", 4.0),
            loc(1, "c", 3.0),
            loc(1, "d", 2.0),
        ];
        // 75% of 4 = 3 kept, then one per package.
        let top = top_fraction(&scores, 75.0);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].location, "a");
        assert_eq!(top[1].location, "c");
    }

    #[test]
    fn test_top_fraction_rounds_up() {
        let scores = vec![loc(0, "a", 1.0), loc(1, "b", 2.0), loc(2, "c", 3.0)];
        let top = top_fraction(&scores, 10.0);
        assert_eq!(top.len(), 1, "ceil(0.3) keeps one entry");
        assert_eq!(top[0].location, "c");
    }

    #[test]
    fn test_top_fraction_empty() {
        assert!(top_fraction(&[], 50.0).is_empty());
    }
}
