//! JSON corpus reader.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use solecism_core::corpus::{CallEvent, Corpus, Event, Package, Sequence};

use super::CorpusError;

#[derive(Debug, Deserialize)]
struct RawCorpus {
    packages: Vec<RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    name: String,
    data: Vec<RawSequence>,
    #[serde(default)]
    topic: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct RawSequence {
    sequence: Vec<RawEvent>,
}

/// Untagged event shape; validated into the call/branch union below.
#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    call: Option<String>,
    #[serde(default)]
    states: Option<Vec<i64>>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    branches: Option<u32>,
}

fn validate_event(
    raw: RawEvent,
    package: usize,
    sequence: usize,
    event: usize,
) -> Result<Event, CorpusError> {
    let malformed = |reason: &str| CorpusError::MalformedEvent {
        package,
        sequence,
        event,
        reason: reason.to_string(),
    };
    match (raw.call, raw.branches) {
        (Some(_), Some(_)) => Err(malformed("event carries both call and branch attributes")),
        (None, None) => Err(malformed("event carries neither a call nor a branch factor")),
        (None, Some(factor)) => {
            if raw.states.is_some() || raw.location.is_some() {
                return Err(malformed("branch event carries call attributes"));
            }
            Ok(Event::Branch { factor })
        }
        (Some(call), None) => {
            let location = raw
                .location
                .ok_or_else(|| malformed("call event is missing its location"))?;
            Ok(Event::Call(CallEvent {
                call,
                states: raw.states.unwrap_or_default(),
                location,
            }))
        }
    }
}

fn validate(raw: RawCorpus) -> Result<Corpus, CorpusError> {
    let mut packages = Vec::with_capacity(raw.packages.len());
    for (k, package) in raw.packages.into_iter().enumerate() {
        let mut sequences = Vec::with_capacity(package.data.len());
        for (j, seq) in package.data.into_iter().enumerate() {
            let mut events = Vec::with_capacity(seq.sequence.len());
            for (i, event) in seq.sequence.into_iter().enumerate() {
                events.push(validate_event(event, k, j, i)?);
            }
            sequences.push(Sequence::new(events));
        }
        packages.push(Package {
            name: package.name,
            sequences,
            topic: package.topic,
        });
    }
    Ok(Corpus { packages })
}

/// Load a corpus from a JSON file.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Corpus, CorpusError> {
    corpus_from_reader(BufReader::new(File::open(path)?))
}

/// Load a corpus from any reader.
pub fn corpus_from_reader<R: Read>(reader: R) -> Result<Corpus, CorpusError> {
    let raw: RawCorpus = serde_json::from_reader(reader)?;
    validate(raw)
}

/// Load a corpus from an in-memory JSON string.
pub fn corpus_from_str(json: &str) -> Result<Corpus, CorpusError> {
    let raw: RawCorpus = serde_json::from_str(json)?;
    validate(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"{
        "packages": [
            {
                "name": "demo",
                "data": [
                    {"sequence": [
                        {"call": "open", "states": [0, 1], "location": "a.c:10"},
                        {"call": "close", "states": [], "location": "a.c:12"}
                    ]},
                    {"sequence": [{"branches": 2}]}
                ],
                "topic": [0.25, 0.75]
            }
        ]
    }"#;

    #[test]
    fn test_parse_well_formed() {
        let corpus = corpus_from_str(WELL_FORMED).unwrap();
        assert_eq!(corpus.packages.len(), 1);
        let package = &corpus.packages[0];
        assert_eq!(package.name, "demo");
        assert_eq!(package.sequences.len(), 2);
        assert_eq!(package.topic, Some(vec![0.25, 0.75]));

        let first = package.sequences[0].call_events().next().unwrap();
        assert_eq!(first.call, "open");
        assert_eq!(first.states, vec![0, 1]);
        assert_eq!(first.location, "a.c:10");

        assert!(matches!(
            package.sequences[1].events[0],
            Event::Branch { factor: 2 }
        ));
    }

    #[test]
    fn test_states_default_to_empty() {
        let corpus = corpus_from_str(
            r#"{"packages":[{"name":"p","data":[{"sequence":[{"call":"f","location":"l"}]}]}]}"#,
        )
        .unwrap();
        let event = corpus.packages[0].sequences[0].call_events().next().unwrap();
        assert!(event.states.is_empty());
    }

    #[test]
    fn test_event_with_both_attribute_sets_fails() {
        let err = corpus_from_str(
            r#"{"packages":[{"name":"p","data":[{"sequence":[
                {"call":"f","location":"l","branches":3}
            ]}]}]}"#,
        )
        .unwrap_err();
        match err {
            CorpusError::MalformedEvent {
                package,
                sequence,
                event,
                ..
            } => {
                assert_eq!((package, sequence, event), (0, 0, 0));
            }
            other => panic!("expected MalformedEvent, got {:?}", other),
        }
    }

    #[test]
    fn test_call_without_location_fails() {
        let err = corpus_from_str(
            r#"{"packages":[{"name":"p","data":[{"sequence":[{"call":"f"}]}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CorpusError::MalformedEvent { .. }));
    }

    #[test]
    fn test_empty_event_names_indices() {
        let err = corpus_from_str(
            r#"{"packages":[{"name":"p","data":[
                {"sequence":[{"call":"f","location":"l"}]},
                {"sequence":[{"call":"g","location":"l"},{}]}
            ]}]}"#,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(
            message.contains("sequence 1") && message.contains("event 1"),
            "error should name the offender: {}",
            message
        );
    }
}
