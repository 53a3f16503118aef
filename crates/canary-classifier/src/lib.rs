//! Round-trip classification for the codec canary.
//!
//! - [`normalize`] splits a protocol line into its ordered prefix and its
//!   order-independent trailing keyword arguments.
//! - [`classify`] runs a line through a [`canary_protocol::Codec`] and files
//!   the result under one of the four finding logs, or nowhere.

mod classify;
mod normalize;

pub use classify::{classify, transport_failure};
pub use normalize::{NormalizedLine, equivalent, normalize};
