//! # canary-protocol — Codec Canary Contract
//!
//! This crate defines the shared record types, the persisted store document,
//! and the trait ports that the rest of the canary depends on.
//!
//! It is intentionally dependency-light (no tokio, axum, or filesystem access)
//! so it can be used as a pure contract crate by both the live daemon and the
//! offline reclassification tool.
//!
//! ## Module Overview
//!
//! - [`record`] — RawObservation, DeserializeFailure, SerializeFailure, RoundTripMismatch, Finding
//! - [`category`] — Category (the four log names and their wire form)
//! - [`document`] — StoreDocument, Metrics (the whole persisted state)
//! - [`ports`] — Codec and StoreBackend boundaries
//! - [`error`] — CanaryError, CanaryResult

pub mod category;
pub mod document;
pub mod error;
pub mod ports;
pub mod record;

pub use category::Category;
pub use document::{Metrics, StoreDocument};
pub use error::{CanaryError, CanaryResult};
pub use ports::{Codec, DeserializeOutcome, SerializeOutcome, StoreBackend};
pub use record::{
    DeserializeFailure, DeserializedMessage, Finding, KeywordArguments, RawObservation,
    RoundTripMismatch, SerializeFailure,
};
