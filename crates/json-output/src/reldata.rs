//! Relation descriptor cache.
//!
//! The first change seen for a relation classifies it against the rule set
//! and, if it is included, computes the projected column lists, the schema
//! fragments spliced into the output and the compiled row filter. All of it
//! is kept until the relation is invalidated.
//!
//! Invalidation notifications are honoured only while the cache is armed.
//! The decoding session arms the cache when a transaction begins and disarms
//! it once the transaction's changes have been read, so notifications that
//! belong to unrelated catalog activity cannot touch a descriptor in use.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use relfeed_types::{type_category, Oid, RelationId, RelationInfo, RowImage, TypeCategory};
use tracing::debug;

use crate::error::DecodeError;
use crate::filter::{FilterCompiler, RowPredicate};
use crate::rules::{include_column, Rule, RuleSet};
use crate::value::quoted;

/// Classification state of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verdict {
    /// Not classified yet
    #[default]
    Unknown,
    Include,
    Exclude,
}

/// One column of a projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedColumn {
    /// Position in the relation's column list (and in row images)
    pub position: usize,
    pub name: String,
    pub type_oid: Oid,
    pub category: TypeCategory,
}

/// Ready-to-splice contents of the `colnames`/`coltypes` (or
/// `keynames`/`keytypes`) arrays, without the brackets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaFragments {
    pub names: String,
    pub types: String,
}

impl SchemaFragments {
    fn render(relation: &RelationInfo, columns: &[ProjectedColumn], separator: &str) -> Self {
        let names = columns
            .iter()
            .map(|c| quoted(&c.name))
            .collect::<Vec<_>>()
            .join(separator);
        let types = columns
            .iter()
            .map(|c| quoted(&relation.columns[c.position].type_name))
            .collect::<Vec<_>>()
            .join(separator);
        Self { names, types }
    }
}

/// Cached state of one relation.
pub struct RelationDescriptor {
    relid: RelationId,
    verdict: Verdict,
    chosen_by: Option<Arc<Rule>>,
    columns: Vec<ProjectedColumn>,
    key_columns: Vec<ProjectedColumn>,
    row_schema: SchemaFragments,
    key_schema: SchemaFragments,
    row_filter: Option<Box<dyn RowPredicate>>,
    row_schema_emitted: bool,
    key_schema_emitted: bool,
}

impl fmt::Debug for RelationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDescriptor")
            .field("relid", &self.relid)
            .field("verdict", &self.verdict)
            .field("chosen_by", &self.chosen_by.as_ref().map(|r| r.ordinal()))
            .field("columns", &self.columns)
            .field("key_columns", &self.key_columns)
            .field("has_row_filter", &self.row_filter.is_some())
            .field("row_schema_emitted", &self.row_schema_emitted)
            .field("key_schema_emitted", &self.key_schema_emitted)
            .finish()
    }
}

impl RelationDescriptor {
    fn new(relid: RelationId) -> Self {
        Self {
            relid,
            verdict: Verdict::Unknown,
            chosen_by: None,
            columns: Vec::new(),
            key_columns: Vec::new(),
            row_schema: SchemaFragments::default(),
            key_schema: SchemaFragments::default(),
            row_filter: None,
            row_schema_emitted: false,
            key_schema_emitted: false,
        }
    }

    /// Run the rule engine for the relation
    fn classify(&mut self, relation: &RelationInfo, rules: &RuleSet) {
        let (include, chosen_by) = rules.evaluate(&relation.name);
        self.verdict = if include {
            Verdict::Include
        } else {
            Verdict::Exclude
        };
        self.chosen_by = chosen_by;
    }

    /// Compute projections, schema fragments and the row filter of an
    /// included relation.
    fn complete(
        &mut self,
        relation: &RelationInfo,
        compiler: &dyn FilterCompiler,
        separator: &str,
    ) -> Result<(), DecodeError> {
        let rule = self.chosen_by.as_deref();

        for (position, attr) in relation.columns.iter().enumerate() {
            if !attr.is_visible() || !include_column(rule, &attr.name) {
                continue;
            }
            let column = ProjectedColumn {
                position,
                name: attr.name.clone(),
                type_oid: attr.type_oid,
                category: type_category(attr.type_oid),
            };
            if relation.is_identity_column(position) {
                self.key_columns.push(column.clone());
            }
            self.columns.push(column);
        }

        self.row_schema = SchemaFragments::render(relation, &self.columns, separator);
        self.key_schema = SchemaFragments::render(relation, &self.key_columns, separator);

        if let Some(source) = rule.and_then(Rule::row_filter) {
            let predicate = compiler.compile(source, relation).map_err(|source| {
                DecodeError::FilterCompile {
                    relation: relation.qualified_name(),
                    source,
                }
            })?;
            debug!(
                "compiled row filter for table \"{}\": {:?}",
                relation.name, predicate
            );
            self.row_filter = Some(predicate);
        }

        Ok(())
    }

    pub fn relid(&self) -> RelationId {
        self.relid
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn is_included(&self) -> bool {
        self.verdict == Verdict::Include
    }

    /// Rule that produced the verdict; `None` for the default verdict
    pub fn chosen_by(&self) -> Option<&Arc<Rule>> {
        self.chosen_by.as_ref()
    }

    /// Columns emitted for full-row output
    pub fn columns(&self) -> &[ProjectedColumn] {
        &self.columns
    }

    /// Columns emitted for identity output, as declared by the identity index
    pub fn key_columns(&self) -> &[ProjectedColumn] {
        &self.key_columns
    }

    /// Identity projection, falling back to the full-row projection when the
    /// relation has no identity columns
    pub fn effective_key_columns(&self) -> &[ProjectedColumn] {
        if self.key_columns.is_empty() {
            &self.columns
        } else {
            &self.key_columns
        }
    }

    pub fn row_schema(&self) -> &SchemaFragments {
        &self.row_schema
    }

    /// Identity schema, with the same fallback as [`effective_key_columns`]
    ///
    /// [`effective_key_columns`]: Self::effective_key_columns
    pub fn key_schema(&self) -> &SchemaFragments {
        if self.key_columns.is_empty() {
            &self.row_schema
        } else {
            &self.key_schema
        }
    }

    pub fn has_row_filter(&self) -> bool {
        self.row_filter.is_some()
    }

    /// Evaluate the row filter; `true` keeps the change.
    ///
    /// A NULL result drops the change like `false` does.
    pub fn evaluate_filter(&mut self, row: &RowImage) -> bool {
        match self.row_filter.as_mut() {
            Some(predicate) => predicate.evaluate(row).unwrap_or(false),
            None => true,
        }
    }

    pub fn row_schema_emitted(&self) -> bool {
        self.row_schema_emitted
    }

    pub fn key_schema_emitted(&self) -> bool {
        self.key_schema_emitted
    }

    pub fn mark_row_schema_emitted(&mut self) {
        self.row_schema_emitted = true;
    }

    pub fn mark_key_schema_emitted(&mut self) {
        self.key_schema_emitted = true;
    }
}

/// Descriptors of every relation seen in the stream, keyed by relation id.
#[derive(Debug, Default)]
pub struct RelationCache {
    entries: HashMap<RelationId, RelationDescriptor>,
    armed: bool,
    separator: &'static str,
}

impl RelationCache {
    /// Create an empty, disarmed cache.
    ///
    /// # Arguments
    /// * `pretty` - whether schema fragments are rendered for pretty output
    pub fn new(pretty: bool) -> Self {
        Self {
            entries: HashMap::new(),
            armed: false,
            separator: if pretty { ", " } else { "," },
        }
    }

    /// Start honouring invalidations
    pub fn arm(&mut self) {
        debug!("relation cache will be invalidated");
        self.armed = true;
    }

    /// Ignore invalidations until the next [`arm`](Self::arm)
    pub fn disarm(&mut self) {
        debug!("invalidation will be ignored");
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Drop the descriptor of a relation whose catalog shape changed.
    ///
    /// Ignored while disarmed. Returns whether a descriptor was dropped.
    pub fn invalidate(&mut self, relid: RelationId) -> bool {
        if !self.armed {
            return false;
        }
        let removed = self.entries.remove(&relid).is_some();
        if removed {
            debug!("entry for relation {} removed", relid);
        }
        removed
    }

    pub fn get(&self, relid: RelationId) -> Option<&RelationDescriptor> {
        self.entries.get(&relid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptor for `relation`, classifying and completing it on first use.
    ///
    /// # Errors
    /// * `DecodeError::FilterCompile` - the chosen rule's row filter does not
    ///   compile; nothing is cached for the relation
    pub fn resolve(
        &mut self,
        relation: &RelationInfo,
        rules: &RuleSet,
        compiler: &dyn FilterCompiler,
    ) -> Result<&mut RelationDescriptor, DecodeError> {
        match self.entries.entry(relation.id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!("entry for relation {} is new", relation.id);
                let mut descriptor = RelationDescriptor::new(relation.id);
                descriptor.classify(relation, rules);
                if descriptor.is_included() {
                    descriptor.complete(relation, compiler, self.separator)?;
                }
                Ok(entry.insert(descriptor))
            }
        }
    }
}
