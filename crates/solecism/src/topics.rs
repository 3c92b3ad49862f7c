//! Corpus-level topic annotation.
//!
//! Bridges the topic engine and the trace corpus: each package's distinct
//! calls form one document, the model is trained or applied over all of
//! them, and the resulting topic vectors are written back onto the packages
//! (where the predictor picks them up as conditioning evidence).

use solecism_core::corpus::Corpus;
use solecism_core::topic::{LdaConfig, LdaModel};

/// Train a topic model over the corpus's per-package call bags.
pub fn train_from_corpus(corpus: &Corpus, cfg: &LdaConfig) -> LdaModel {
    let documents: Vec<Vec<String>> = corpus
        .packages
        .iter()
        .map(|p| p.call_bag().into_iter().map(str::to_string).collect())
        .collect();
    LdaModel::train(&documents, cfg)
}

/// Infer and attach a topic vector to every package. Returns the
/// not-in-vocabulary calls encountered per package, in corpus order.
pub fn annotate_topics(corpus: &mut Corpus, model: &LdaModel) -> Vec<Vec<String>> {
    let mut all_missing = Vec::with_capacity(corpus.packages.len());
    for package in &mut corpus.packages {
        let bag: Vec<String> = package.call_bag().into_iter().map(str::to_string).collect();
        let (topic, missing) = model.infer_one(&bag);
        package.topic = Some(topic);
        all_missing.push(missing);
    }
    all_missing
}
