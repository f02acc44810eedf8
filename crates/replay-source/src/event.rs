//! Event log records and their conversion to catalog and change types.
//!
//! Each line of an event log is a JSON object tagged by `action`:
//!
//! ```json
//! {"action": "R", "relid": 16384, "schema": "public", "table": "orders",
//!  "columns": [{"name": "id", "type": "int4", "typeoid": 23}], "identity": ["id"]}
//! {"action": "B", "xid": 742, "lsn": "0/16B3748", "timestamp": "2024-01-01T00:00:00Z"}
//! {"action": "I", "relid": 16384, "new": [1]}
//! {"action": "X", "relid": 16384}
//! {"action": "C"}
//! ```

use std::io::BufRead;

use chrono::{DateTime, FixedOffset, Utc};
use relfeed_types::{
    Attribute, ChangeEvent, Datum, Lsn, RelationId, RelationInfo, ReplicaIdentity, RowImage,
    TxnInfo, TypesError,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Error reading or interpreting an event log.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },

    /// Line is not a valid event record
    #[error("error parsing event at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Change or invalidation for a relation never described by an `R` record
    #[error("unknown relation {relid} at line {line}")]
    UnknownRelation { line: usize, relid: u32 },

    /// Column value of an unsupported JSON shape
    #[error("unsupported column value {value} at line {line}")]
    InvalidValue { line: usize, value: String },

    /// `replident` is not one of `d`, `n`, `f`, `i`
    #[error("invalid replica identity \"{value}\" at line {line}")]
    InvalidReplicaIdentity { line: usize, value: String },

    /// Relation or transaction metadata is inconsistent
    #[error("invalid metadata at line {line}: {source}")]
    Metadata {
        line: usize,
        #[source]
        source: TypesError,
    },
}

/// One record of the event log
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action")]
pub enum Event {
    /// Catalog snapshot of a relation
    #[serde(rename = "R")]
    Relation(RelationRecord),
    #[serde(rename = "B")]
    Begin(BeginRecord),
    #[serde(rename = "I")]
    Insert(ChangeRecord),
    #[serde(rename = "U")]
    Update(ChangeRecord),
    #[serde(rename = "D")]
    Delete(ChangeRecord),
    /// Catalog invalidation for a relation
    #[serde(rename = "X")]
    Invalidate { relid: u32 },
    #[serde(rename = "C")]
    Commit,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub typeoid: u32,
    #[serde(default)]
    pub dropped: bool,
    /// Only needed for system columns (negative numbers)
    pub attnum: Option<i16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationRecord {
    pub relid: u32,
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnRecord>,
    /// Column names of the identity index
    pub identity: Option<Vec<String>>,
    /// `d` (default), `n` (nothing), `f` (full) or `i` (index)
    pub replident: Option<String>,
}

impl RelationRecord {
    /// Build the catalog snapshot described by the record.
    pub fn to_relation(&self, line: usize) -> Result<RelationInfo, SourceError> {
        let columns = self
            .columns
            .iter()
            .map(|col| {
                let mut attr = Attribute::new(&col.name, &col.type_name, col.typeoid);
                attr.dropped = col.dropped;
                if let Some(attnum) = col.attnum {
                    attr.attnum = attnum;
                }
                attr
            })
            .collect();

        let mut relation =
            RelationInfo::new(RelationId(self.relid), &self.schema, &self.table, columns);

        if let Some(identity) = &self.identity {
            let names: Vec<&str> = identity.iter().map(String::as_str).collect();
            relation = relation
                .with_identity(&names)
                .map_err(|source| SourceError::Metadata { line, source })?;
        }

        if let Some(replident) = &self.replident {
            let identity = match replident.as_str() {
                "d" => ReplicaIdentity::Default,
                "n" => ReplicaIdentity::Nothing,
                "f" => ReplicaIdentity::Full,
                "i" => ReplicaIdentity::Index,
                other => {
                    return Err(SourceError::InvalidReplicaIdentity {
                        line,
                        value: other.to_string(),
                    })
                }
            };
            relation = relation.with_replica_identity(identity);
        }

        Ok(relation)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeginRecord {
    pub xid: u32,
    /// End position of the transaction, `X/X`
    pub lsn: Option<String>,
    /// Commit time, RFC 3339
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl BeginRecord {
    pub fn to_txn(&self, line: usize) -> Result<TxnInfo, SourceError> {
        let end_lsn = match &self.lsn {
            Some(text) => text
                .parse::<Lsn>()
                .map_err(|source| SourceError::Metadata { line, source })?,
            None => Lsn::default(),
        };
        let commit_time = self.timestamp.unwrap_or_else(|| {
            debug!("transaction {} has no commit time, using now", self.xid);
            Utc::now().fixed_offset()
        });

        Ok(TxnInfo {
            xid: self.xid,
            end_lsn,
            commit_time,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeRecord {
    pub relid: u32,
    pub new: Option<Vec<Value>>,
    pub old: Option<Vec<Value>>,
}

impl ChangeRecord {
    pub fn new_row(&self, line: usize) -> Result<Option<RowImage>, SourceError> {
        self.new.as_deref().map(|v| to_row(v, line)).transpose()
    }

    pub fn old_row(&self, line: usize) -> Result<Option<RowImage>, SourceError> {
        self.old.as_deref().map(|v| to_row(v, line)).transpose()
    }
}

impl Event {
    /// Change event for `I`/`U`/`D` records, `None` for the others
    pub fn to_change(&self, line: usize) -> Result<Option<(u32, ChangeEvent)>, SourceError> {
        let change = match self {
            Event::Insert(record) => (
                record.relid,
                ChangeEvent::Insert {
                    new: record.new_row(line)?,
                },
            ),
            Event::Update(record) => (
                record.relid,
                ChangeEvent::Update {
                    new: record.new_row(line)?,
                    old: record.old_row(line)?,
                },
            ),
            Event::Delete(record) => (
                record.relid,
                ChangeEvent::Delete {
                    old: record.old_row(line)?,
                },
            ),
            _ => return Ok(None),
        };
        Ok(Some(change))
    }
}

fn to_row(values: &[Value], line: usize) -> Result<RowImage, SourceError> {
    values
        .iter()
        .map(|value| to_datum(value, line))
        .collect::<Result<Vec<_>, _>>()
        .map(RowImage::new)
}

/// Column value in its textual form
fn to_datum(value: &Value, line: usize) -> Result<Datum, SourceError> {
    match value {
        Value::Null => Ok(Datum::Null),
        Value::String(s) => Ok(Datum::Text(s.clone())),
        Value::Number(n) => Ok(Datum::Text(n.to_string())),
        Value::Bool(b) => Ok(Datum::text(if *b { "t" } else { "f" })),
        Value::Object(map) if map.get("unchanged") == Some(&Value::Bool(true)) => {
            Ok(Datum::UnchangedToast)
        }
        other => Err(SourceError::InvalidValue {
            line,
            value: other.to_string(),
        }),
    }
}

/// Parse one line of the event log.
///
/// # Arguments
/// * `line` - 1-based line number, for error messages
/// * `text` - the line
pub fn parse_event(line: usize, text: &str) -> Result<Event, SourceError> {
    serde_json::from_str(text).map_err(|source| SourceError::Parse { line, source })
}

/// Iterates over the events of a log, skipping blank lines.
///
/// Items are `(line number, event)`.
pub struct EventReader<R> {
    lines: std::io::Lines<R>,
    line: usize,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<(usize, Event), SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = self.lines.next()?;
            self.line += 1;
            let line = self.line;

            let text = match text {
                Ok(text) => text,
                Err(source) => return Some(Err(SourceError::Read { line, source })),
            };
            if text.trim().is_empty() {
                continue;
            }
            return Some(parse_event(line, &text).map(|event| (line, event)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relfeed_types::types::INT4_OID;

    #[test]
    fn test_parse_relation() {
        let event = parse_event(
            1,
            r#"{"action": "R", "relid": 5, "schema": "s", "table": "t",
                "columns": [
                    {"name": "id", "type": "int4", "typeoid": 23},
                    {"name": "gone", "type": "text", "typeoid": 25, "dropped": true},
                    {"name": "ctid", "type": "tid", "typeoid": 27, "attnum": -1}
                ],
                "identity": ["id"], "replident": "i"}"#,
        )
        .unwrap();

        let Event::Relation(record) = event else {
            panic!("expected a relation record");
        };
        let relation = record.to_relation(1).unwrap();
        assert_eq!(relation.id, RelationId(5));
        assert_eq!(relation.qualified_name(), "s.t");
        assert_eq!(relation.columns[0].type_oid, INT4_OID);
        assert!(relation.columns[1].dropped);
        assert!(relation.columns[2].is_system());
        assert_eq!(relation.identity_index, Some(vec![0]));
        assert_eq!(relation.replica_identity, ReplicaIdentity::Index);
    }

    #[test]
    fn test_relation_with_unknown_identity_column() {
        let Event::Relation(record) = parse_event(
            3,
            r#"{"action": "R", "relid": 5, "schema": "s", "table": "t",
                "columns": [{"name": "id", "type": "int4", "typeoid": 23}],
                "identity": ["nope"]}"#,
        )
        .unwrap() else {
            panic!("expected a relation record");
        };
        let err = record.to_relation(3).unwrap_err();
        assert!(matches!(err, SourceError::Metadata { line: 3, .. }));
    }

    #[test]
    fn test_parse_begin() {
        let Event::Begin(record) = parse_event(
            1,
            r#"{"action": "B", "xid": 9, "lsn": "1/A0", "timestamp": "2024-02-03T04:05:06+02:00"}"#,
        )
        .unwrap() else {
            panic!("expected a begin record");
        };
        let txn = record.to_txn(1).unwrap();
        assert_eq!(txn.xid, 9);
        assert_eq!(txn.end_lsn.to_string(), "1/A0");
        assert_eq!(txn.commit_time.to_rfc3339(), "2024-02-03T04:05:06+02:00");
    }

    #[test]
    fn test_change_values() {
        let event = parse_event(
            1,
            r#"{"action": "U", "relid": 5, "new": [1, "x", true, null, {"unchanged": true}, 2.5], "old": [0]}"#,
        )
        .unwrap();
        let (relid, change) = event.to_change(1).unwrap().unwrap();
        assert_eq!(relid, 5);

        let new = change.new_row().unwrap();
        let values: Vec<&Datum> = new.iter().collect();
        assert_eq!(
            values,
            [
                &Datum::text("1"),
                &Datum::text("x"),
                &Datum::text("t"),
                &Datum::Null,
                &Datum::UnchangedToast,
                &Datum::text("2.5"),
            ]
        );
        assert_eq!(change.old_row().unwrap().get(0), &Datum::text("0"));
    }

    #[test]
    fn test_unsupported_value() {
        let event = parse_event(7, r#"{"action": "I", "relid": 5, "new": [[1, 2]]}"#).unwrap();
        let err = event.to_change(7).unwrap_err();
        assert!(matches!(err, SourceError::InvalidValue { line: 7, .. }));
    }

    #[test]
    fn test_reader_skips_blank_lines_and_counts() {
        let log = "{\"action\": \"B\", \"xid\": 1}\n\n   \n{\"action\": \"C\"}\n{\"action\": \"?\"}\n";
        let mut reader = EventReader::new(log.as_bytes());

        assert!(matches!(reader.next(), Some(Ok((1, Event::Begin(_))))));
        assert!(matches!(reader.next(), Some(Ok((4, Event::Commit)))));
        assert!(matches!(
            reader.next(),
            Some(Err(SourceError::Parse { line: 5, .. }))
        ));
        assert!(reader.next().is_none());
    }
}
