//! Collapsed Gibbs sampling of document-topic posteriors.
//!
//! The variational transform in [`super::lda`] yields one point estimate per
//! document; the sampler draws multiple plausible topic vectors from the
//! posterior instead, so downstream divergence scores can be averaged over
//! topic uncertainty. Each chain alternates: assign every word occurrence a
//! topic proportional to `doc_topic[t] · topic_term[t][w]`, then redraw the
//! document's topic vector from `Dirichlet(doc_topic + produced)`.

use rand::Rng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::constants::DEFAULT_SEED;
use crate::math::normalize;

use super::lda::LdaModel;

/// Sampler knobs.
#[derive(Debug, Clone)]
pub struct GibbsConfig {
    /// Posterior samples to return per document.
    pub nsamples: usize,
    /// Gibbs sweeps per chain before the vector is kept.
    pub niters: usize,
    /// Start each chain from a symmetric Dirichlet draw instead of the
    /// variational point estimate.
    pub random_init: bool,
    /// RNG seed; chains are deterministic given the seed.
    pub seed: u64,
}

impl Default for GibbsConfig {
    fn default() -> Self {
        Self {
            nsamples: 10,
            niters: 10,
            random_init: false,
            seed: DEFAULT_SEED,
        }
    }
}

/// Draw from Dirichlet(α) as normalized Gamma(αᵢ, 1) variates. Handles any
/// dimension, including 1 (which always yields `[1.0]`).
fn dirichlet_sample<R: Rng>(alpha: &[f64], rng: &mut R) -> Vec<f64> {
    let mut draw: Vec<f64> = alpha
        .iter()
        .map(|&a| {
            // Gamma requires a strictly positive shape.
            let shape = a.max(1e-12);
            Gamma::new(shape, 1.0)
                .expect("positive gamma shape")
                .sample(rng)
        })
        .collect();
    let total: f64 = draw.iter().sum();
    if total <= 0.0 {
        // All-zero draws happen only for vanishing concentrations; fall back
        // to uniform rather than dividing by zero.
        let k = draw.len().max(1);
        return vec![1.0 / k as f64; k];
    }
    normalize(&mut draw);
    draw
}

/// Weighted topic pick proportional to `doc_topic[t] · topic_term[t][w]`.
fn draw_topic<R: Rng>(
    doc_topic: &[f64],
    topic_term: &[Vec<f64>],
    word: usize,
    rng: &mut R,
) -> usize {
    let weights: Vec<f64> = doc_topic
        .iter()
        .enumerate()
        .map(|(t, &dt)| dt * topic_term[t][word])
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return rng.random_range(0..doc_topic.len());
    }
    let mut u = rng.random::<f64>() * total;
    for (t, &w) in weights.iter().enumerate() {
        u -= w;
        if u <= 0.0 {
            return t;
        }
    }
    doc_topic.len() - 1
}

impl LdaModel {
    /// One Gibbs chain: `niters` sweeps starting from `init`, returning the
    /// final document-topic vector.
    fn gibbs_chain<R: Rng>(&self, counts: &[f64], init: &[f64], niters: usize, rng: &mut R) -> Vec<f64> {
        let k = self.ntopics();
        let mut doc_topic = init.to_vec();
        for _ in 0..niters {
            let mut produced = vec![0.0; k];
            for (w, &c) in counts.iter().enumerate() {
                for _ in 0..c as usize {
                    let t = draw_topic(&doc_topic, &self.topic_term, w, rng);
                    produced[t] += 1.0;
                }
            }
            let alpha: Vec<f64> = doc_topic
                .iter()
                .zip(&produced)
                .map(|(&d, &p)| d + p)
                .collect();
            doc_topic = dirichlet_sample(&alpha, rng);
        }
        doc_topic
    }

    /// Draw `cfg.nsamples` topic vectors for one document: `nsamples − 1`
    /// independent Gibbs chains plus the deterministic point estimate
    /// appended last. With a single topic every sample is `[1.0]`.
    pub fn posterior_samples<S: AsRef<str>>(
        &self,
        document: &[S],
        cfg: &GibbsConfig,
    ) -> Vec<Vec<f64>> {
        let (counts, _) = self.vectorizer.transform(document);
        let (point, _) = self.infer_one(document);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(cfg.seed);

        let mut samples = Vec::with_capacity(cfg.nsamples);
        let k = self.ntopics();
        for _ in 1..cfg.nsamples {
            let init = if cfg.random_init {
                dirichlet_sample(&vec![1.0; k], &mut rng)
            } else {
                point.clone()
            };
            samples.push(self.gibbs_chain(&counts, &init, cfg.niters, &mut rng));
        }
        if cfg.nsamples > 0 {
            samples.push(point);
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::lda::LdaConfig;

    fn model(k: usize) -> LdaModel {
        let docs: Vec<Vec<String>> = vec![
            vec!["open".into(), "read".into(), "close".into()],
            vec!["open".into(), "read".into()],
            vec!["connect".into(), "send".into(), "recv".into()],
            vec!["connect".into(), "send".into()],
        ];
        LdaModel::train(&docs, &LdaConfig::new(k))
    }

    #[test]
    fn test_single_topic_samples_are_degenerate() {
        let m = model(1);
        let doc = vec!["open".to_string(), "read".to_string()];
        let samples = m.posterior_samples(&doc, &GibbsConfig::default());
        assert_eq!(samples.len(), 10);
        for s in &samples {
            assert_eq!(s, &vec![1.0]);
        }
    }

    #[test]
    fn test_samples_are_distributions() {
        let m = model(3);
        let doc = vec!["open".to_string(), "read".to_string(), "read".to_string()];
        let samples = m.posterior_samples(&doc, &GibbsConfig::default());
        for s in &samples {
            assert_eq!(s.len(), 3);
            let total: f64 = s.iter().sum();
            assert!((total - 1.0).abs() < 1e-9, "sample sums to {}", total);
            assert!(s.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn test_point_estimate_is_last_sample() {
        let m = model(2);
        let doc = vec!["connect".to_string(), "send".to_string()];
        let (point, _) = m.infer_one(&doc);
        let samples = m.posterior_samples(&doc, &GibbsConfig::default());
        assert_eq!(samples.last().unwrap(), &point);
    }

    #[test]
    fn test_deterministic_under_seed() {
        let m = model(2);
        let doc = vec!["open".to_string(), "read".to_string()];
        let cfg = GibbsConfig {
            seed: 99,
            ..GibbsConfig::default()
        };
        let a = m.posterior_samples(&doc, &cfg);
        let b = m.posterior_samples(&doc, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_init_still_valid() {
        let m = model(2);
        let doc = vec!["open".to_string()];
        let cfg = GibbsConfig {
            random_init: true,
            nsamples: 5,
            niters: 5,
            seed: 3,
        };
        let samples = m.posterior_samples(&doc, &cfg);
        assert_eq!(samples.len(), 5);
        for s in &samples {
            let total: f64 = s.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dirichlet_dimension_one() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let draw = dirichlet_sample(&[2.5], &mut rng);
        assert_eq!(draw, vec![1.0]);
    }
}
