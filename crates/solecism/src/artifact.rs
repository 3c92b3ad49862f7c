//! Topic-model persistence.
//!
//! A trained [`LdaModel`] is saved as JSON: the normalized topic-term matrix,
//! the fitted vocabulary, and the document-topic prior. The vectorizer's
//! lookup table is rebuilt on load (it is skipped during serialization).

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use solecism_core::topic::LdaModel;

use crate::probfile::ReportError;

/// Save a trained model to a JSON file.
pub fn save_model<P: AsRef<Path>>(model: &LdaModel, path: P) -> Result<(), ReportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, model)?;
    writer.flush()?;
    Ok(())
}

/// Load a model from a JSON file.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<LdaModel, ReportError> {
    model_from_reader(BufReader::new(File::open(path)?))
}

/// Load a model from any reader.
pub fn model_from_reader<R: Read>(reader: R) -> Result<LdaModel, ReportError> {
    let mut model: LdaModel = serde_json::from_reader(reader)?;
    model.vectorizer.rebuild_index();
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solecism_core::topic::LdaConfig;

    fn trained() -> LdaModel {
        let docs: Vec<Vec<String>> = vec![
            vec!["open".into(), "read".into()],
            vec!["connect".into(), "send".into()],
        ];
        LdaModel::train(&docs, &LdaConfig::new(2))
    }

    #[test]
    fn test_round_trip_preserves_inference() {
        let model = trained();
        let json = serde_json::to_vec(&model).unwrap();
        let restored = model_from_reader(json.as_slice()).unwrap();

        assert_eq!(model.topic_term, restored.topic_term);
        let doc = vec!["open".to_string(), "read".to_string()];
        assert_eq!(
            model.infer_one(&doc),
            restored.infer_one(&doc),
            "restored model must infer identically"
        );
    }

    #[test]
    fn test_restored_vectorizer_resolves_terms() {
        let model = trained();
        let json = serde_json::to_vec(&model).unwrap();
        let restored = model_from_reader(json.as_slice()).unwrap();
        let (counts, missing) = restored.vectorizer.transform(&["open".to_string()]);
        assert_eq!(counts.iter().sum::<f64>(), 1.0);
        assert!(missing.is_empty());
    }
}
