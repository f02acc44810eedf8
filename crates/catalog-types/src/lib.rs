//! Core types for the relfeed change stream.
//!
//! This crate provides the data model exchanged between a change-stream
//! source and the JSON output decoder:
//!
//! - [`RelationInfo`] - Live catalog snapshot of a relation (columns, identity index)
//! - [`RowImage`] / [`Datum`] - Before/after images of a row, one datum per column
//! - [`ChangeEvent`] - One insert, update or delete observed on a relation
//! - [`TxnInfo`] / [`Lsn`] - Transaction metadata carried by begin/commit
//!
//! # Architecture
//!
//! ```text
//! relfeed-types (this crate)
//!    │
//!    ├─── relfeed-json           (rule engine, descriptor cache, encoder)
//!    └─── relfeed-replay-source  (event log reader feeding the decoder)
//! ```

pub mod relation;
pub mod row;
pub mod txn;
pub mod types;

pub use relation::{Attribute, RelationId, RelationInfo, ReplicaIdentity};
pub use row::{ChangeEvent, ChangeOp, Datum, RowImage};
pub use txn::{format_timestamptz, Lsn, TxnInfo};
pub use types::{type_category, Oid, TypeCategory};

/// Error type for catalog and metadata construction.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// An identity column does not exist in the relation
    #[error("Identity column '{column}' not found in relation '{relation}'")]
    IdentityColumnNotFound { relation: String, column: String },

    /// LSN text is not in the `X/X` hexadecimal form
    #[error("Invalid LSN '{0}': expected format like '0/16B3748'")]
    InvalidLsn(String),
}
