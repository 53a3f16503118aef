//! Boundaries between the canary and its external collaborators.
//!
//! The codec under test and the persistent store backend are implemented
//! elsewhere; these traits are the only way the classifier, the store and the
//! reclassification job reach them.
//!
//! Object-safety note:
//! - Traits use `async-trait` for async dyn-dispatch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::StoreDocument;
use crate::error::CanaryResult;
use crate::record::KeywordArguments;

/// What the codec made of a raw line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeserializeOutcome {
    /// A known message shape, ready to be serialized again.
    Recognized {
        name: String,
        payload: Value,
        #[serde(default)]
        kwargs: KeywordArguments,
    },
    /// The codec knows no message shape for this line.
    Unhandled,
    /// The codec tried and reported diagnostics.
    Failed {
        #[serde(default)]
        errors: Vec<String>,
    },
}

/// What the codec produced when asked to emit a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SerializeOutcome {
    Serialized {
        text: String,
    },
    Failed {
        #[serde(default)]
        errors: Vec<String>,
    },
}

/// The protocol codec being exercised.
///
/// Reported failures come back as `Ok(..::Failed)`; an `Err` means the codec
/// could not be consulted at all.
#[async_trait]
pub trait Codec: Send + Sync {
    async fn deserialize(&self, raw: &str) -> CanaryResult<DeserializeOutcome>;

    async fn serialize(
        &self,
        name: &str,
        payload: &Value,
        kwargs: &KeywordArguments,
    ) -> CanaryResult<SerializeOutcome>;
}

/// Whole-document persistence for the categorized store.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn load(&self) -> CanaryResult<StoreDocument>;
    async fn save(&self, document: &StoreDocument) -> CanaryResult<()>;
}
