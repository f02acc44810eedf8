//! Inclusion/exclusion rules.
//!
//! A [`RuleSet`] is an ordered list of rules built once from `include` and
//! `exclude` directives. Each directive is a JSON object:
//!
//! ```json
//! {"table": "orders", "columns": ["id", "total"]}
//! {"tables": "^audit_", "where": "id > 100"}
//! {"table": "users", "skip_columns": ["password"]}
//! ```
//!
//! Rules are evaluated front to back and the last matching rule wins. If
//! the first directive is an exclusion an implicit "include everything" rule
//! is put in front of it, so `exclude X` reads as "everything except X".

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

/// What a rule matches and whether a match includes or excludes
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Matches every relation
    IncludeAll,
    /// Exact relation name
    IncludeTable(String),
    /// Relation name pattern
    IncludeTablePattern(Regex),
    ExcludeTable(String),
    ExcludeTablePattern(Regex),
}

impl RuleKind {
    /// Whether a match of this rule includes the relation
    pub fn is_include(&self) -> bool {
        matches!(
            self,
            RuleKind::IncludeAll | RuleKind::IncludeTable(_) | RuleKind::IncludeTablePattern(_)
        )
    }

    /// Test a bare relation name
    pub fn matches(&self, relation_name: &str) -> bool {
        match self {
            RuleKind::IncludeAll => true,
            RuleKind::IncludeTable(name) | RuleKind::ExcludeTable(name) => name == relation_name,
            RuleKind::IncludeTablePattern(re) | RuleKind::ExcludeTablePattern(re) => {
                re.is_match(relation_name)
            }
        }
    }

    fn into_exclusion(self) -> Self {
        match self {
            RuleKind::IncludeTable(name) => RuleKind::ExcludeTable(name),
            RuleKind::IncludeTablePattern(re) => RuleKind::ExcludeTablePattern(re),
            other => other,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::IncludeAll => write!(f, "include all"),
            RuleKind::IncludeTable(name) => write!(f, "include table \"{name}\""),
            RuleKind::IncludeTablePattern(re) => write!(f, "include tables /{}/", re.as_str()),
            RuleKind::ExcludeTable(name) => write!(f, "exclude table \"{name}\""),
            RuleKind::ExcludeTablePattern(re) => write!(f, "exclude tables /{}/", re.as_str()),
        }
    }
}

/// Column projection of a rule. Allow- and deny-lists are exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnSelection {
    #[default]
    All,
    /// Only these columns
    Only(Vec<String>),
    /// Every column but these
    Skip(Vec<String>),
}

/// One configured directive.
#[derive(Debug, Clone)]
pub struct Rule {
    ordinal: usize,
    kind: RuleKind,
    columns: ColumnSelection,
    row_filter: Option<String>,
}

impl Rule {
    /// Position in evaluation order
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn columns(&self) -> &ColumnSelection {
        &self.columns
    }

    /// Row filter source text, if the rule has a `where` member
    pub fn row_filter(&self) -> Option<&str> {
        self.row_filter.as_deref()
    }

    /// Whether a column is emitted for relations chosen by this rule
    pub fn includes_column(&self, column: &str) -> bool {
        match &self.columns {
            ColumnSelection::All => true,
            ColumnSelection::Only(names) => names.iter().any(|n| n == column),
            ColumnSelection::Skip(names) => !names.iter().any(|n| n == column),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule {}: {}", self.ordinal, self.kind)?;
        match &self.columns {
            ColumnSelection::All => {}
            ColumnSelection::Only(names) => write!(f, ", columns {names:?}")?,
            ColumnSelection::Skip(names) => write!(f, ", skip_columns {names:?}")?,
        }
        if let Some(filter) = &self.row_filter {
            write!(f, ", where {filter}")?;
        }
        Ok(())
    }
}

/// Column projection decision for a relation chosen by `rule`.
///
/// With no rule (no rules configured) every column is emitted.
pub fn include_column(rule: Option<&Rule>, column: &str) -> bool {
    rule.map_or(true, |rule| rule.includes_column(column))
}

/// Immutable, ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// Rule set with no rules: everything is included
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RuleSetBuilder {
        RuleSetBuilder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    /// Decide whether a relation is emitted.
    ///
    /// Only the bare relation name is matched; the namespace plays no part.
    ///
    /// # Returns
    /// * `(verdict, chosen)` - the verdict of the last matching rule and that
    ///   rule, or `(true, None)` when no rules are configured
    pub fn evaluate(&self, relation_name: &str) -> (bool, Option<Arc<Rule>>) {
        let mut verdict = self.rules.is_empty();
        let mut chosen = None;

        for rule in &self.rules {
            if rule.kind.matches(relation_name) {
                verdict = rule.kind.is_include();
                chosen = Some(Arc::clone(rule));
            }
        }

        match &chosen {
            Some(rule) => debug!(
                "table \"{}\" included? {} by rule {}",
                relation_name,
                if verdict { "yes" } else { "no" },
                rule.ordinal
            ),
            None => debug!(
                "table \"{}\" included? {} by default",
                relation_name,
                if verdict { "yes" } else { "no" }
            ),
        }

        (verdict, chosen)
    }
}

/// Shape of an `include`/`exclude` directive
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDirective {
    table: Option<String>,
    tables: Option<String>,
    columns: Option<Vec<String>>,
    skip_columns: Option<Vec<String>>,
    #[serde(rename = "where")]
    row_filter: Option<String>,
}

/// Accumulates directives in configuration order.
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    rules: Vec<Rule>,
}

impl RuleSetBuilder {
    /// Append an `include` directive.
    pub fn include(&mut self, text: &str) -> Result<&mut Self, ConfigError> {
        let rule = self.parse("include", text)?;
        self.push(rule);
        Ok(self)
    }

    /// Append an `exclude` directive.
    ///
    /// If it is the first directive, an implicit include-all rule goes first.
    pub fn exclude(&mut self, text: &str) -> Result<&mut Self, ConfigError> {
        let (kind, columns, row_filter) = self.parse("exclude", text)?;
        if self.rules.is_empty() {
            self.push((RuleKind::IncludeAll, ColumnSelection::All, None));
        }
        self.push((kind.into_exclusion(), columns, row_filter));
        Ok(self)
    }

    pub fn build(self) -> RuleSet {
        RuleSet {
            rules: self.rules.into_iter().map(Arc::new).collect(),
        }
    }

    fn push(&mut self, (kind, columns, row_filter): (RuleKind, ColumnSelection, Option<String>)) {
        let rule = Rule {
            ordinal: self.rules.len(),
            kind,
            columns,
            row_filter,
        };
        debug!("{}", rule);
        self.rules.push(rule);
    }

    fn parse(
        &self,
        directive: &str,
        text: &str,
    ) -> Result<(RuleKind, ColumnSelection, Option<String>), ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|source| ConfigError::RuleSyntax {
                directive: directive.to_string(),
                source,
            })?;
        if !value.is_object() {
            return Err(ConfigError::RuleNotObject {
                directive: directive.to_string(),
                value: text.to_string(),
            });
        }

        // Deserialize from the text, not the parsed map, so that duplicate
        // members are still visible.
        let parsed: RuleDirective =
            serde_json::from_str(text).map_err(|source| ConfigError::RuleShape {
                directive: directive.to_string(),
                value: text.to_string(),
                source,
            })?;

        let kind = match (parsed.table, parsed.tables) {
            (Some(_), Some(_)) => return Err(ConfigError::AmbiguousTarget(text.to_string())),
            (Some(name), None) => RuleKind::IncludeTable(name),
            (None, Some(pattern)) => {
                let re = Regex::new(&pattern)
                    .map_err(|source| ConfigError::InvalidPattern { pattern, source })?;
                RuleKind::IncludeTablePattern(re)
            }
            (None, None) => {
                return Err(ConfigError::RuleWithoutTarget {
                    directive: directive.to_string(),
                    value: text.to_string(),
                })
            }
        };

        let columns = match (parsed.columns, parsed.skip_columns) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingColumns(text.to_string())),
            (Some(only), None) => ColumnSelection::Only(only),
            (None, Some(skip)) => ColumnSelection::Skip(skip),
            (None, None) => ColumnSelection::All,
        };

        Ok((kind, columns, parsed.row_filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(directives: &[(&str, &str)]) -> RuleSet {
        let mut builder = RuleSet::builder();
        for (directive, text) in directives {
            match *directive {
                "include" => builder.include(text).unwrap(),
                "exclude" => builder.exclude(text).unwrap(),
                other => panic!("unexpected directive {other}"),
            };
        }
        builder.build()
    }

    #[test]
    fn test_empty_rule_set_includes_everything() {
        let rules = RuleSet::new();
        let (verdict, chosen) = rules.evaluate("anything");
        assert!(verdict);
        assert!(chosen.is_none());
    }

    #[test]
    fn test_include_first_excludes_unmatched() {
        let rules = build(&[("include", r#"{"table": "orders"}"#)]);
        assert!(rules.evaluate("orders").0);

        let (verdict, chosen) = rules.evaluate("other");
        assert!(!verdict);
        assert!(chosen.is_none());
    }

    #[test]
    fn test_exclude_first_adds_implicit_include_all() {
        let rules = build(&[("exclude", r#"{"table": "secrets"}"#)]);
        assert_eq!(rules.len(), 2);
        assert!(matches!(
            rules.iter().next().unwrap().kind(),
            RuleKind::IncludeAll
        ));

        assert!(!rules.evaluate("secrets").0);
        let (verdict, chosen) = rules.evaluate("orders");
        assert!(verdict);
        assert_eq!(chosen.unwrap().ordinal(), 0);
    }

    #[test]
    fn test_last_match_wins() {
        let rules = build(&[
            ("include", r#"{"tables": "^order"}"#),
            ("exclude", r#"{"table": "order_archive"}"#),
            ("include", r#"{"tables": "archive$", "columns": ["id"]}"#),
        ]);

        let (verdict, chosen) = rules.evaluate("order_archive");
        assert!(verdict);
        assert_eq!(chosen.as_ref().unwrap().ordinal(), 2);
        assert_eq!(
            chosen.unwrap().columns(),
            &ColumnSelection::Only(vec!["id".to_string()])
        );

        let (verdict, chosen) = rules.evaluate("orders");
        assert!(verdict);
        assert_eq!(chosen.unwrap().ordinal(), 0);

        assert!(!rules.evaluate("users").0);
    }

    #[test]
    fn test_pattern_is_unanchored_search() {
        let rules = build(&[("include", r#"{"tables": "item"}"#)]);
        assert!(rules.evaluate("line_items").0);
        assert!(!rules.evaluate("orders").0);
    }

    #[test]
    fn test_include_column() {
        let rules = build(&[
            ("include", r#"{"table": "a", "columns": ["id", "name"]}"#),
            ("include", r#"{"table": "b", "skip_columns": ["secret"]}"#),
            ("include", r#"{"table": "c"}"#),
        ]);

        let a = rules.evaluate("a").1;
        assert!(include_column(a.as_deref(), "id"));
        assert!(!include_column(a.as_deref(), "secret"));

        let b = rules.evaluate("b").1;
        assert!(include_column(b.as_deref(), "id"));
        assert!(!include_column(b.as_deref(), "secret"));

        let c = rules.evaluate("c").1;
        assert!(include_column(c.as_deref(), "secret"));

        assert!(include_column(None, "whatever"));
    }

    #[test]
    fn test_row_filter_is_kept() {
        let rules = build(&[("include", r#"{"table": "a", "where": "id > 10"}"#)]);
        let chosen = rules.evaluate("a").1.unwrap();
        assert_eq!(chosen.row_filter(), Some("id > 10"));
    }

    #[test]
    fn test_rejects_malformed_directives() {
        let mut builder = RuleSet::builder();

        let err = builder.include("[1, 2]").unwrap_err();
        assert!(matches!(err, ConfigError::RuleNotObject { .. }));

        let err = builder.include("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::RuleSyntax { .. }));

        let err = builder.include(r#"{"columns": ["a"]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::RuleWithoutTarget { .. }));

        let err = builder
            .include(r#"{"table": "a", "columns": ["x"], "skip_columns": ["y"]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingColumns(_)));

        let err = builder.include(r#"{"table": "a", "colour": 1}"#).unwrap_err();
        assert!(matches!(err, ConfigError::RuleShape { .. }));

        let err = builder
            .include(r#"{"table": "a", "table": "b"}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::RuleShape { .. }));

        let err = builder.include(r#"{"table": "a", "tables": "b"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousTarget(_)));

        let err = builder.include(r#"{"tables": "(unclosed"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));

        let err = builder.include(r#"{"table": "a", "columns": "id"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::RuleShape { .. }));

        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_rule_display() {
        let rules = build(&[("exclude", r#"{"tables": "^tmp_", "skip_columns": ["x"]}"#)]);
        let described: Vec<String> = rules.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            described,
            vec![
                "rule 0: include all".to_string(),
                r#"rule 1: exclude tables /^tmp_/, skip_columns ["x"]"#.to_string(),
            ]
        );
    }
}
