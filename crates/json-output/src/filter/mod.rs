//! Row filter contract.
//!
//! A rule's `where` member is handed to a [`FilterCompiler`] the first time a
//! relation chosen by that rule is decoded. The resulting [`RowPredicate`] is
//! owned by the relation's descriptor and evaluated once per change; a
//! `false` or NULL result drops the change.

mod comparison;

use std::fmt;

use relfeed_types::{RelationInfo, RowImage};

use crate::error::CompileError;

pub use comparison::ComparisonCompiler;

/// Compiled row filter.
///
/// `evaluate` takes `&mut self` so implementations may keep per-relation
/// scratch state between rows.
pub trait RowPredicate: fmt::Debug {
    /// Evaluate against a row image: `Some(bool)`, or `None` for NULL
    fn evaluate(&mut self, row: &RowImage) -> Option<bool>;
}

/// Turns row filter source text into a predicate over a relation's rows.
pub trait FilterCompiler {
    /// Compile `source` for `relation`.
    ///
    /// Fails if the text does not parse, references columns the relation
    /// lacks or another relation, or does not reduce to a boolean.
    fn compile(
        &self,
        source: &str,
        relation: &RelationInfo,
    ) -> Result<Box<dyn RowPredicate>, CompileError>;
}

/// Compiler for hosts without expression support: every filter is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingCompiler;

impl FilterCompiler for RejectingCompiler {
    fn compile(
        &self,
        source: &str,
        _relation: &RelationInfo,
    ) -> Result<Box<dyn RowPredicate>, CompileError> {
        Err(CompileError::new(source, "row filters are not supported"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relfeed_types::RelationId;

    #[test]
    fn test_rejecting_compiler_cites_source() {
        let relation = RelationInfo::new(RelationId(1), "public", "t", vec![]);
        let err = RejectingCompiler.compile("id > 1", &relation).unwrap_err();
        assert_eq!(err.source_text, "id > 1");
    }
}
