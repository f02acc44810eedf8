//! Error types for configuration, filter compilation and decoding.
//!
//! Configuration and filter-compilation errors are fatal and surface before
//! (or at the first use of) a relation. Per-row problems are not errors:
//! they are reported as [`RowAnomaly`] values and the change is dropped.

use std::fmt;

use relfeed_types::{ChangeOp, Oid, RelationId};

/// Invalid decoder configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Option name is not recognised
    #[error("option \"{name}\" = \"{value}\" is unknown")]
    UnknownOption { name: String, value: String },

    /// Boolean option value cannot be parsed
    #[error("could not parse value \"{value}\" for parameter \"{name}\"")]
    InvalidBool { name: String, value: String },

    /// `include`/`exclude` given without a value
    #[error("parameter \"{0}\" requires a json object value")]
    MissingRule(String),

    /// Rule text is not valid JSON
    #[error("parameter \"{directive}\" is not valid json: {source}")]
    RuleSyntax {
        directive: String,
        #[source]
        source: serde_json::Error,
    },

    /// Rule is valid JSON but not an object
    #[error("parameter \"{directive}\" must be a json object, got \"{value}\"")]
    RuleNotObject { directive: String, value: String },

    /// Rule object has unknown or duplicate members, or members of the wrong type
    #[error("invalid \"{directive}\" command \"{value}\": {source}")]
    RuleShape {
        directive: String,
        value: String,
        #[source]
        source: serde_json::Error,
    },

    /// Rule names neither `table` nor `tables`
    #[error("{directive} command doesn't specify what to filter: \"{value}\"")]
    RuleWithoutTarget { directive: String, value: String },

    /// Rule names both `table` and `tables`
    #[error("you can't have \"table\" and \"tables\", in \"{0}\"")]
    AmbiguousTarget(String),

    /// Rule has both an allow-list and a deny-list of columns
    #[error("you can't have \"columns\" and \"skip_columns\", in \"{0}\"")]
    ConflictingColumns(String),

    /// Table pattern does not compile
    #[error("invalid regular expression \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Row filter that cannot be turned into a predicate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid row_filter expression \"{source_text}\": {reason}")]
pub struct CompileError {
    /// The offending filter text
    pub source_text: String,
    /// What is wrong with it
    pub reason: String,
}

impl CompileError {
    pub fn new(source_text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal decoding error: the stream cannot continue.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Row filter of the rule selecting a relation failed to compile
    #[error("row filter for table \"{relation}\" failed to compile: {source}")]
    FilterCompile {
        relation: String,
        #[source]
        source: CompileError,
    },

    /// A column's type has no output routine
    #[error("no output function for type {type_oid} of column \"{column}\" in table \"{relation}\"")]
    UnknownType {
        relation: String,
        column: String,
        type_oid: Oid,
    },

    /// Writing to the output sink failed
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// Change or commit received with no transaction in progress
    #[error("{0} received outside of a transaction")]
    NoTransaction(&'static str),

    /// Begin received while a transaction is still in progress
    #[error("transaction {new} began while transaction {current} is in progress")]
    NestedTransaction { current: u32, new: u32 },
}

/// Per-row problem: the change is logged and dropped, the stream continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAnomaly {
    /// The operation requires tuple data the source did not supply
    MissingTuple { op: ChangeOp, relation: String },

    /// Update/delete on a table without identity information
    NoIdentity { op: ChangeOp, relation: String },

    /// Numeric column whose text is not a number
    NotANumber { column: String, value: String },

    /// Row image references a relation the catalog no longer describes
    ShapeMismatch { relation: RelationId, columns: usize },
}

impl fmt::Display for RowAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowAnomaly::MissingTuple { op, relation } => {
                write!(f, "no tuple data for {op} in table \"{relation}\"")
            }
            RowAnomaly::NoIdentity { op, relation } => write!(
                f,
                "table \"{relation}\" has no primary key or replica identity for {op}"
            ),
            RowAnomaly::NotANumber { column, value } => {
                write!(f, "{value} is not a number (column \"{column}\")")
            }
            RowAnomaly::ShapeMismatch { relation, columns } => write!(
                f,
                "row image of relation {relation} has more columns than its catalog ({columns})"
            ),
        }
    }
}
