//! Decoder options.
//!
//! Options arrive as an ordered list of `(name, value)` pairs, as a host
//! passes them when a stream starts. Everything is validated here so that
//! configuration errors surface before the first change is decoded.

use tracing::info;

use crate::error::ConfigError;
use crate::rules::{RuleSet, RuleSetBuilder};

/// Output switches of a decoding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Embed the transaction id in the envelope header
    pub include_xids: bool,
    /// Embed the commit timestamp
    pub include_timestamp: bool,
    /// Emit the namespace of each changed table
    pub include_schemas: bool,
    /// Emit column-type arrays next to column-name arrays
    pub include_types: bool,
    /// Indented, multi-line output
    pub pretty_print: bool,
    /// Flush after every change instead of once per transaction
    pub write_in_chunks: bool,
    /// Embed the transaction's end log position
    pub include_lsn: bool,
    /// Emit an envelope even for transactions without surviving changes
    pub include_empty_xacts: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            include_xids: false,
            include_timestamp: false,
            include_schemas: true,
            include_types: true,
            pretty_print: false,
            write_in_chunks: false,
            include_lsn: false,
            include_empty_xacts: false,
        }
    }
}

/// Parsed configuration: output switches plus the rule set.
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    pub options: DecoderOptions,
    pub rules: RuleSet,
}

impl DecoderConfig {
    /// Parse an ordered option list.
    ///
    /// A boolean option without a value means `true`. Unknown options are
    /// rejected.
    ///
    /// # Arguments
    /// * `pairs` - `(name, value)` pairs in the order the host supplied them
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = DecoderOptions::default();
        let mut rules = RuleSetBuilder::default();

        for (name, value) in pairs {
            let name = name.as_ref();
            let value = value.as_ref().map(AsRef::<str>::as_ref);

            let flag = match name {
                "include-xids" => &mut options.include_xids,
                "include-timestamp" => &mut options.include_timestamp,
                "include-schemas" => &mut options.include_schemas,
                "include-types" => &mut options.include_types,
                "pretty-print" => &mut options.pretty_print,
                "write-in-chunks" => &mut options.write_in_chunks,
                "include-lsn" => &mut options.include_lsn,
                "include-empty-xacts" => &mut options.include_empty_xacts,
                "include" => {
                    let text = value.ok_or_else(|| ConfigError::MissingRule(name.to_string()))?;
                    rules.include(text)?;
                    continue;
                }
                "exclude" => {
                    let text = value.ok_or_else(|| ConfigError::MissingRule(name.to_string()))?;
                    rules.exclude(text)?;
                    continue;
                }
                _ => {
                    return Err(ConfigError::UnknownOption {
                        name: name.to_string(),
                        value: value.unwrap_or("(null)").to_string(),
                    })
                }
            };

            *flag = match value {
                None => {
                    info!("{} argument is null", name);
                    true
                }
                Some(text) => parse_bool(text).ok_or_else(|| ConfigError::InvalidBool {
                    name: name.to_string(),
                    value: text.to_string(),
                })?,
            };
        }

        Ok(Self {
            options,
            rules: rules.build(),
        })
    }
}

/// Parse a boolean the way the server does for option values.
///
/// Accepts, case-insensitively and ignoring surrounding whitespace, any
/// unambiguous prefix of `true`, `false`, `yes`, `no`; `on` and `off` with at
/// least two characters; `1` and `0`.
pub fn parse_bool(text: &str) -> Option<bool> {
    let value = text.trim().to_ascii_lowercase();
    if value.is_empty() {
        return None;
    }

    let is_prefix = |word: &str, min_len: usize| value.len() >= min_len && word.starts_with(&value);

    if is_prefix("true", 1) || is_prefix("yes", 1) || is_prefix("on", 2) || value == "1" {
        Some(true)
    } else if is_prefix("false", 1) || is_prefix("no", 1) || is_prefix("off", 2) || value == "0" {
        Some(false)
    } else {
        None
    }
}
