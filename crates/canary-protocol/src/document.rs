//! The persisted store document.
//!
//! One JSON object holds the total-seen counter and the four finding logs.
//! Field names match the historical `db.json` layout so existing documents
//! load unchanged.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::record::{
    DeserializeFailure, Finding, RawObservation, RoundTripMismatch, SerializeFailure,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreDocument {
    pub total_messages: u64,
    pub unhandled_messages: Vec<RawObservation>,
    pub undeserializable_messages: Vec<DeserializeFailure>,
    pub unserializable_messages: Vec<SerializeFailure>,
    pub not_equal_messages: Vec<RoundTripMismatch>,
}

/// Per-log counts plus the total-seen counter, read together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub seen: u64,
    pub unhandled: usize,
    pub undeserializable: usize,
    pub unserializable: usize,
    pub inequal: usize,
}

impl StoreDocument {
    /// An empty document that remembers how many lines were seen.
    pub fn with_total(total_messages: u64) -> Self {
        Self {
            total_messages,
            ..Self::default()
        }
    }

    /// Append a finding to the log its variant names.
    pub fn push(&mut self, finding: Finding) {
        match finding {
            Finding::Unhandled(record) => self.unhandled_messages.push(record),
            Finding::Undeserializable(record) => self.undeserializable_messages.push(record),
            Finding::Unserializable(record) => self.unserializable_messages.push(record),
            Finding::Inequal(record) => self.not_equal_messages.push(record),
        }
    }

    pub fn len(&self, category: Category) -> usize {
        match category {
            Category::Unhandled => self.unhandled_messages.len(),
            Category::Undeserializable => self.undeserializable_messages.len(),
            Category::Unserializable => self.unserializable_messages.len(),
            Category::Inequal => self.not_equal_messages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.into_iter().all(|category| self.len(category) == 0)
    }

    /// Clone the findings of one log in `range`. The range must be in bounds.
    pub fn findings(&self, category: Category, range: Range<usize>) -> Vec<Finding> {
        match category {
            Category::Unhandled => self.unhandled_messages[range]
                .iter()
                .cloned()
                .map(Finding::from)
                .collect(),
            Category::Undeserializable => self.undeserializable_messages[range]
                .iter()
                .cloned()
                .map(Finding::from)
                .collect(),
            Category::Unserializable => self.unserializable_messages[range]
                .iter()
                .cloned()
                .map(Finding::from)
                .collect(),
            Category::Inequal => self.not_equal_messages[range]
                .iter()
                .cloned()
                .map(Finding::from)
                .collect(),
        }
    }

    /// Every stored wire line, log by log, in stored order.
    pub fn observations(&self) -> impl Iterator<Item = &RawObservation> + '_ {
        self.unhandled_messages
            .iter()
            .chain(
                self.undeserializable_messages
                    .iter()
                    .map(|record| &record.observation),
            )
            .chain(
                self.unserializable_messages
                    .iter()
                    .map(|record| &record.observation),
            )
            .chain(
                self.not_equal_messages
                    .iter()
                    .map(|record| &record.observation),
            )
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            seen: self.total_messages,
            unhandled: self.unhandled_messages.len(),
            undeserializable: self.undeserializable_messages.len(),
            unserializable: self.unserializable_messages.len(),
            inequal: self.not_equal_messages.len(),
        }
    }
}
