//! JSON output for committed row changes.
//!
//! This crate turns a stream of transaction begin/change/commit calls into
//! one JSON document per transaction:
//!
//! - [`RuleSet`] - Ordered include/exclude rules with column projection and row filters
//! - [`RelationCache`] - Per-relation verdicts, projections and schema fragments
//! - [`ChangeEncoder`] - Type-aware rendering of a single change
//! - [`TransactionEnvelope`] - Transaction header/footer, chunked or buffered output
//! - [`JsonDecoder`] - The session tying them together
//!
//! # Example
//!
//! ```rust
//! use relfeed_json::{DecoderConfig, JsonDecoder, MemorySink};
//! use relfeed_types::types::{INT4_OID, TEXT_OID};
//! use relfeed_types::{Attribute, ChangeEvent, Datum, Lsn, RelationId, RelationInfo, TxnInfo};
//!
//! let config = DecoderConfig::from_pairs([
//!     ("include", Some(r#"{"table": "orders"}"#)),
//!     ("include-schemas", Some("false")),
//!     ("include-types", Some("false")),
//! ])?;
//! let mut decoder = JsonDecoder::new(config, MemorySink::new());
//!
//! let orders = RelationInfo::new(
//!     RelationId(16384),
//!     "public",
//!     "orders",
//!     vec![
//!         Attribute::new("id", "int4", INT4_OID),
//!         Attribute::new("name", "text", TEXT_OID),
//!     ],
//! );
//!
//! decoder.begin(TxnInfo {
//!     xid: 1,
//!     end_lsn: Lsn(0),
//!     commit_time: chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
//! })?;
//! decoder.change(&orders, &ChangeEvent::insert(vec![Datum::text("1"), Datum::text("a")]))?;
//! decoder.commit()?;
//!
//! assert_eq!(
//!     decoder.sink().messages(),
//!     [r#"{"change":[{"op":"I","table":"orders","colnames":["id","name"],"values":[1,"a"]}]}"#]
//! );
//! # Ok::<(), relfeed_json::DecodeError>(())
//! ```

pub mod decoder;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod options;
pub mod reldata;
pub mod rules;
pub mod sink;
pub mod value;

pub use decoder::{ChangeOutcome, JsonDecoder};
pub use encoder::{ChangeEncoder, EncodeError, EncodedChange};
pub use envelope::TransactionEnvelope;
pub use error::{CompileError, ConfigError, DecodeError, RowAnomaly};
pub use filter::{ComparisonCompiler, FilterCompiler, RejectingCompiler, RowPredicate};
pub use options::{parse_bool, DecoderConfig, DecoderOptions};
pub use reldata::{ProjectedColumn, RelationCache, RelationDescriptor, SchemaFragments, Verdict};
pub use rules::{include_column, ColumnSelection, Rule, RuleKind, RuleSet, RuleSetBuilder};
pub use sink::{MemorySink, OutputSink, WriterSink};
