//! Relfeed Library
//!
//! Streams committed row changes as JSON, one document per transaction,
//! with per-table inclusion rules, column projection and row filters.
//!
//! # Crates
//!
//! - `relfeed_types` - Catalog snapshots, row images and change events
//! - `relfeed_json` - Rule engine, relation cache, change encoder and decoding session
//! - `relfeed_replay_source` - JSON-lines event log reader driving a session
//!
//! # CLI Usage
//!
//! ```bash
//! # Decode an event log with a configuration file
//! relfeed decode --input changes.jsonl --config relfeed.toml
//!
//! # Options on the command line, appended after the file's
//! relfeed decode -o include-xids -o 'include={"table": "orders"}' < changes.jsonl
//!
//! # Validate a configuration
//! relfeed check-config --config relfeed.toml
//! ```

pub mod config;

pub use config::{load_decoder_config, parse_option_arg, FileConfig, RuleEntry};
pub use relfeed_json as json;
pub use relfeed_replay_source as replay;
pub use relfeed_types as types;
