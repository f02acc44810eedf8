//! Event log replay for relfeed
//!
//! This crate provides the change source side of a decoding session: it reads
//! JSON-lines event logs (catalog snapshots, transaction boundaries, row
//! changes and catalog invalidations) and drives a
//! [`relfeed_json::JsonDecoder`] with them.

pub mod event;
mod replay;

pub use event::{parse_event, Event, EventReader, SourceError};
pub use replay::{ReplaySummary, Replayer};
