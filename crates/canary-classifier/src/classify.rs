use canary_protocol::{
    CanaryResult, Codec, DeserializeFailure, DeserializeOutcome, DeserializedMessage, Finding,
    RawObservation, RoundTripMismatch, SerializeFailure, SerializeOutcome,
};
use tracing::{debug, instrument};

use crate::normalize::equivalent;

/// Run one observed line through the codec and decide where it belongs.
///
/// `Ok(None)` means the line survived the round trip and is not recorded.
/// `Err` means the codec could not be consulted; nothing can be said about
/// the line.
#[instrument(skip(codec, observation), fields(room = %observation.room))]
pub async fn classify(
    codec: &dyn Codec,
    observation: RawObservation,
) -> CanaryResult<Option<Finding>> {
    let (name, payload, kwargs) = match codec.deserialize(&observation.raw_message).await? {
        DeserializeOutcome::Failed { errors } => {
            debug!(errors = errors.len(), "line failed to deserialize");
            return Ok(Some(Finding::from(DeserializeFailure {
                observation,
                errors,
            })));
        }
        DeserializeOutcome::Unhandled => {
            debug!("line not handled by codec");
            return Ok(Some(Finding::from(observation)));
        }
        DeserializeOutcome::Recognized {
            name,
            payload,
            kwargs,
        } => (name, payload, kwargs),
    };

    let serialized = codec.serialize(&name, &payload, &kwargs).await?;
    let deserialized_message = DeserializedMessage::new(payload, kwargs);

    match serialized {
        SerializeOutcome::Failed { errors } => {
            debug!(message = %name, errors = errors.len(), "message failed to serialize");
            Ok(Some(Finding::from(SerializeFailure {
                observation,
                deserialized_message,
                errors,
            })))
        }
        SerializeOutcome::Serialized { text } => {
            if equivalent(&observation.raw_message, &text) {
                return Ok(None);
            }
            debug!(message = %name, "round trip changed the line");
            Ok(Some(Finding::from(RoundTripMismatch {
                observation,
                deserialized_message,
                serialized_message: text,
            })))
        }
    }
}

/// A deserialization error reported by the transport rather than the codec.
pub fn transport_failure(observation: RawObservation, errors: Vec<String>) -> Finding {
    Finding::from(DeserializeFailure {
        observation,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use canary_protocol::{CanaryError, Category, KeywordArguments};
    use chrono::Utc;
    use serde_json::{Value, json};

    use super::*;

    /// Codec that answers from fixed tables keyed by line and message name.
    #[derive(Default)]
    struct ScriptedCodec {
        deserialize: HashMap<String, DeserializeOutcome>,
        serialize: HashMap<String, SerializeOutcome>,
    }

    impl ScriptedCodec {
        fn reads(mut self, raw: &str, outcome: DeserializeOutcome) -> Self {
            self.deserialize.insert(raw.to_owned(), outcome);
            self
        }

        fn writes(mut self, name: &str, outcome: SerializeOutcome) -> Self {
            self.serialize.insert(name.to_owned(), outcome);
            self
        }
    }

    #[async_trait]
    impl Codec for ScriptedCodec {
        async fn deserialize(&self, raw: &str) -> CanaryResult<DeserializeOutcome> {
            self.deserialize
                .get(raw)
                .cloned()
                .ok_or_else(|| CanaryError::Codec(format!("no script for {raw}")))
        }

        async fn serialize(
            &self,
            name: &str,
            _payload: &Value,
            _kwargs: &KeywordArguments,
        ) -> CanaryResult<SerializeOutcome> {
            self.serialize
                .get(name)
                .cloned()
                .ok_or_else(|| CanaryError::Codec(format!("no script for {name}")))
        }
    }

    fn recognized(name: &str) -> DeserializeOutcome {
        DeserializeOutcome::Recognized {
            name: name.to_owned(),
            payload: json!({ "name": name }),
            kwargs: KeywordArguments::new(),
        }
    }

    fn serialized(text: &str) -> SerializeOutcome {
        SerializeOutcome::Serialized {
            text: text.to_owned(),
        }
    }

    fn observe(raw: &str) -> RawObservation {
        RawObservation::new(Utc::now(), "lobby", raw)
    }

    #[tokio::test]
    async fn reordered_keywords_round_trip_cleanly() {
        let codec = ScriptedCodec::default()
            .reads("|chat|[id]42|[color]red", recognized("chat"))
            .writes("chat", serialized("|chat|[color]red|[id]42"));

        let outcome = classify(&codec, observe("|chat|[id]42|[color]red"))
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn changed_text_is_a_mismatch() {
        let codec = ScriptedCodec::default()
            .reads("|foo|bar", recognized("foo"))
            .writes("foo", serialized("|foo|baz"));

        let outcome = classify(&codec, observe("|foo|bar")).await.unwrap();
        let Some(Finding::Inequal(mismatch)) = outcome else {
            panic!("expected a mismatch, got {outcome:?}");
        };
        assert_eq!(mismatch.serialized_message, "|foo|baz");
        assert_eq!(mismatch.observation.raw_message, "|foo|bar");
        assert_eq!(mismatch.deserialized_message.payload(), &json!({ "name": "foo" }));
    }

    #[tokio::test]
    async fn deserialize_failure_is_terminal() {
        let codec = ScriptedCodec::default().reads(
            "|move|",
            DeserializeOutcome::Failed {
                errors: vec!["missing pokemon".to_owned()],
            },
        );

        let outcome = classify(&codec, observe("|move|")).await.unwrap().unwrap();
        assert_eq!(outcome.category(), Category::Undeserializable);
        let Finding::Undeserializable(failure) = outcome else {
            unreachable!();
        };
        assert_eq!(failure.errors, vec!["missing pokemon".to_owned()]);
    }

    #[tokio::test]
    async fn unhandled_line_is_recorded_raw() {
        let codec = ScriptedCodec::default().reads("|mystery|", DeserializeOutcome::Unhandled);

        let observation = observe("|mystery|");
        let outcome = classify(&codec, observation.clone()).await.unwrap();
        assert_eq!(outcome, Some(Finding::Unhandled(observation)));
    }

    #[tokio::test]
    async fn serialize_failure_keeps_deserialized_form() {
        let mut kwargs = KeywordArguments::new();
        kwargs.insert("from".to_owned(), "ability: Intimidate".to_owned());
        let codec = ScriptedCodec::default()
            .reads(
                "|-unboost|p2a: X|atk|1|[from] ability: Intimidate",
                DeserializeOutcome::Recognized {
                    name: "-unboost".to_owned(),
                    payload: json!(["p2a: X", "atk", 1]),
                    kwargs: kwargs.clone(),
                },
            )
            .writes(
                "-unboost",
                SerializeOutcome::Failed {
                    errors: vec!["stat out of range".to_owned()],
                },
            );

        let outcome = classify(
            &codec,
            observe("|-unboost|p2a: X|atk|1|[from] ability: Intimidate"),
        )
        .await
        .unwrap();
        let Some(Finding::Unserializable(failure)) = outcome else {
            panic!("expected a serialize failure, got {outcome:?}");
        };
        assert_eq!(failure.deserialized_message.kwargs(), &kwargs);
        assert_eq!(failure.errors, vec!["stat out of range".to_owned()]);
    }

    #[tokio::test]
    async fn unreachable_codec_is_an_error_not_a_finding() {
        let codec = ScriptedCodec::default();
        let result = classify(&codec, observe("|anything")).await;
        assert!(matches!(result, Err(CanaryError::Codec(_))));
    }

    #[tokio::test]
    async fn clean_round_trip_is_idempotent() {
        let codec = ScriptedCodec::default()
            .reads("|j| Trainer|[rank]+", recognized("join"))
            .reads("|j|Trainer|[rank]+", recognized("join"))
            .writes("join", serialized("|j|Trainer|[rank]+"));

        // The received line has a leading space in the name, so it does not survive.
        let first = classify(&codec, observe("|j| Trainer|[rank]+")).await.unwrap();
        assert!(matches!(first, Some(Finding::Inequal(_))));

        let clean = classify(&codec, observe("|j|Trainer|[rank]+")).await.unwrap();
        assert!(clean.is_none());
        let again = classify(&codec, observe("|j|Trainer|[rank]+")).await.unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn transport_failure_files_as_undeserializable() {
        let finding = transport_failure(observe("|\u{fffd}"), vec!["invalid utf-8".to_owned()]);
        assert_eq!(finding.category(), Category::Undeserializable);
    }
}
