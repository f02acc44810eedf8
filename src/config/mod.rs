//! Configuration file and command-line option handling.
//!
//! A configuration file is TOML with the boolean options at the top level and
//! an ordered list of rules:
//!
//! ```toml
//! include-xids = true
//! pretty-print = false
//!
//! [[rule]]
//! include = { table = "orders", columns = ["id", "total"] }
//!
//! [[rule]]
//! exclude = { tables = "^tmp_" }
//! ```
//!
//! The file is flattened into the same ordered `(name, value)` list a host
//! would pass, and `-o name[=value]` options from the command line are
//! appended after it.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use relfeed_json::DecoderConfig;
use serde::Deserialize;

/// Contents of a configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub include_xids: Option<bool>,
    pub include_timestamp: Option<bool>,
    pub include_schemas: Option<bool>,
    pub include_types: Option<bool>,
    pub pretty_print: Option<bool>,
    pub write_in_chunks: Option<bool>,
    pub include_lsn: Option<bool>,
    pub include_empty_xacts: Option<bool>,

    /// Rules in evaluation order
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleEntry>,
}

/// One `[[rule]]` entry: exactly one of `include` or `exclude`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEntry {
    pub include: Option<toml::Table>,
    pub exclude: Option<toml::Table>,
}

impl FileConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }

    /// Flatten into ordered option pairs.
    ///
    /// Rule tables are rendered as the JSON objects the `include` and
    /// `exclude` options take.
    pub fn to_pairs(&self) -> anyhow::Result<Vec<(String, Option<String>)>> {
        let flags = [
            ("include-xids", self.include_xids),
            ("include-timestamp", self.include_timestamp),
            ("include-schemas", self.include_schemas),
            ("include-types", self.include_types),
            ("pretty-print", self.pretty_print),
            ("write-in-chunks", self.write_in_chunks),
            ("include-lsn", self.include_lsn),
            ("include-empty-xacts", self.include_empty_xacts),
        ];

        let mut pairs: Vec<(String, Option<String>)> = flags
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), Some(v.to_string()))))
            .collect();

        for (index, rule) in self.rules.iter().enumerate() {
            let (directive, table) = match (&rule.include, &rule.exclude) {
                (Some(table), None) => ("include", table),
                (None, Some(table)) => ("exclude", table),
                _ => bail!(
                    "rule {} must have exactly one of \"include\" or \"exclude\"",
                    index + 1
                ),
            };
            let json = serde_json::to_string(table)
                .with_context(|| format!("Failed to convert rule {} to JSON", index + 1))?;
            pairs.push((directive.to_string(), Some(json)));
        }

        Ok(pairs)
    }
}

/// Split a command-line option `name[=value]`
pub fn parse_option_arg(arg: &str) -> (String, Option<String>) {
    match arg.split_once('=') {
        Some((name, value)) => (name.trim().to_string(), Some(value.to_string())),
        None => (arg.trim().to_string(), None),
    }
}

/// Build the decoder configuration from an optional file and command-line
/// options.
///
/// # Arguments
/// * `path` - TOML configuration file, if any
/// * `options` - `name[=value]` options, applied after the file's
pub fn load_decoder_config(
    path: Option<&Path>,
    options: &[String],
) -> anyhow::Result<DecoderConfig> {
    let mut pairs = match path {
        Some(path) => FileConfig::from_file(path)?.to_pairs()?,
        None => Vec::new(),
    };
    pairs.extend(options.iter().map(|arg| parse_option_arg(arg)));

    DecoderConfig::from_pairs(pairs).context("Invalid decoder configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_to_pairs() {
        let config = FileConfig::from_toml(
            r#"
            include-xids = true
            include-types = false

            [[rule]]
            include = { table = "orders", columns = ["id"] }

            [[rule]]
            exclude = { tables = "^tmp_" }
            "#,
        )
        .unwrap();

        let pairs = config.to_pairs().unwrap();
        assert_eq!(pairs[0], ("include-xids".to_string(), Some("true".to_string())));
        assert_eq!(pairs[1], ("include-types".to_string(), Some("false".to_string())));
        assert_eq!(pairs[2].0, "include");
        let rule: serde_json::Value = serde_json::from_str(pairs[2].1.as_deref().unwrap()).unwrap();
        assert_eq!(rule, serde_json::json!({"table": "orders", "columns": ["id"]}));
        assert_eq!(pairs[3].0, "exclude");
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn test_rule_entry_needs_one_directive() {
        let config = FileConfig::from_toml(
            r#"
            [[rule]]
            include = { table = "a" }
            exclude = { table = "b" }
            "#,
        )
        .unwrap();
        assert!(config.to_pairs().is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(FileConfig::from_toml("include-everything = true").is_err());
    }

    #[test]
    fn test_parse_option_arg() {
        assert_eq!(
            parse_option_arg("pretty-print=1"),
            ("pretty-print".to_string(), Some("1".to_string()))
        );
        assert_eq!(parse_option_arg("include-xids"), ("include-xids".to_string(), None));
        assert_eq!(
            parse_option_arg(r#"include={"where": "a = 1"}"#),
            ("include".to_string(), Some(r#"{"where": "a = 1"}"#.to_string()))
        );
    }
}
