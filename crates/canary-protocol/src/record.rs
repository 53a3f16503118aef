//! Finding records.
//!
//! Every record embeds the [`RawObservation`] it was derived from; the wider
//! kinds add what the classifier learned before the round trip broke.
//! [`Finding`] is the closed union of the four kinds, one variant per
//! [`Category`].

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::category::Category;

/// Keyword arguments in the order the codec reported them.
pub type KeywordArguments = IndexMap<String, String>;

/// A raw protocol line as it was observed on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub room: String,
    pub raw_message: String,
}

impl RawObservation {
    pub fn new(
        timestamp: DateTime<Utc>,
        room: impl Into<String>,
        raw_message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            room: room.into(),
            raw_message: raw_message.into(),
        }
    }
}

/// The codec's structured reading of a line: `[payload, kwargs]` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeserializedMessage(pub Value, pub KeywordArguments);

impl DeserializedMessage {
    pub fn new(payload: Value, kwargs: KeywordArguments) -> Self {
        Self(payload, kwargs)
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    pub fn kwargs(&self) -> &KeywordArguments {
        &self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeserializeFailure {
    #[serde(flatten)]
    pub observation: RawObservation,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializeFailure {
    #[serde(flatten)]
    pub observation: RawObservation,
    pub deserialized_message: DeserializedMessage,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTripMismatch {
    #[serde(flatten)]
    pub observation: RawObservation,
    pub deserialized_message: DeserializedMessage,
    pub serialized_message: String,
}

/// One classified line, tagged by the log it is filed under.
///
/// Serializes untagged so HTTP clients see the flat record shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Finding {
    Unhandled(RawObservation),
    Undeserializable(DeserializeFailure),
    Unserializable(SerializeFailure),
    Inequal(RoundTripMismatch),
}

impl Finding {
    pub fn category(&self) -> Category {
        match self {
            Finding::Unhandled(_) => Category::Unhandled,
            Finding::Undeserializable(_) => Category::Undeserializable,
            Finding::Unserializable(_) => Category::Unserializable,
            Finding::Inequal(_) => Category::Inequal,
        }
    }

    pub fn observation(&self) -> &RawObservation {
        match self {
            Finding::Unhandled(observation) => observation,
            Finding::Undeserializable(record) => &record.observation,
            Finding::Unserializable(record) => &record.observation,
            Finding::Inequal(record) => &record.observation,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.observation().timestamp
    }

    /// Drop everything the classifier added, keeping the wire line.
    pub fn into_observation(self) -> RawObservation {
        match self {
            Finding::Unhandled(observation) => observation,
            Finding::Undeserializable(record) => record.observation,
            Finding::Unserializable(record) => record.observation,
            Finding::Inequal(record) => record.observation,
        }
    }
}

impl From<RawObservation> for Finding {
    fn from(value: RawObservation) -> Self {
        Finding::Unhandled(value)
    }
}

impl From<DeserializeFailure> for Finding {
    fn from(value: DeserializeFailure) -> Self {
        Finding::Undeserializable(value)
    }
}

impl From<SerializeFailure> for Finding {
    fn from(value: SerializeFailure) -> Self {
        Finding::Unserializable(value)
    }
}

impl From<RoundTripMismatch> for Finding {
    fn from(value: RoundTripMismatch) -> Self {
        Finding::Inequal(value)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn observation() -> RawObservation {
        let timestamp = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        RawObservation::new(timestamp, "lobby", "|c|~user|hello")
    }

    #[test]
    fn mismatch_serializes_flat_with_camel_case_keys() {
        let mut kwargs = KeywordArguments::new();
        kwargs.insert("from".to_owned(), "item: Leftovers".to_owned());
        let record = RoundTripMismatch {
            observation: observation(),
            deserialized_message: DeserializedMessage::new(json!({"user": "~user"}), kwargs),
            serialized_message: "|c|~user|hello ".to_owned(),
        };

        let value = serde_json::to_value(Finding::from(record)).unwrap();
        assert_eq!(
            value,
            json!({
                "timestamp": 1_700_000_000_123_i64,
                "room": "lobby",
                "rawMessage": "|c|~user|hello",
                "deserializedMessage": [{"user": "~user"}, {"from": "item: Leftovers"}],
                "serializedMessage": "|c|~user|hello ",
            })
        );
    }

    #[test]
    fn failure_reads_document_shape() {
        let record: DeserializeFailure = serde_json::from_value(json!({
            "timestamp": 1_700_000_000_123_i64,
            "room": "battle-gen9ou-1",
            "rawMessage": "|move|p1a: X",
            "errors": ["missing target"],
        }))
        .unwrap();

        assert_eq!(record.observation, {
            let mut expected = observation();
            expected.room = "battle-gen9ou-1".to_owned();
            expected.raw_message = "|move|p1a: X".to_owned();
            expected
        });
        assert_eq!(record.errors, vec!["missing target".to_owned()]);
    }

    #[test]
    fn category_follows_variant() {
        let failure = DeserializeFailure {
            observation: observation(),
            errors: Vec::new(),
        };
        assert_eq!(Finding::from(observation()).category(), Category::Unhandled);
        assert_eq!(
            Finding::from(failure.clone()).category(),
            Category::Undeserializable
        );
        assert_eq!(Finding::from(failure).into_observation(), observation());
    }
}
