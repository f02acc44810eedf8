//! Rendering of a single change as a JSON object body.
//!
//! The encoder writes the members of one element of the `change` array
//! (`op`, `schema`, `table`, schema arrays, `values`, `oldkey`). Braces and
//! separators between changes belong to the transaction envelope.

use relfeed_types::{ChangeEvent, Datum, RelationInfo, RowImage, TypeCategory};
use tracing::{debug, warn};

use crate::error::{DecodeError, RowAnomaly};
use crate::options::DecoderOptions;
use crate::reldata::{ProjectedColumn, RelationDescriptor};
use crate::value::{is_special_number, quoted, write_value, ValueError};

/// Schema fragments written while encoding a change.
///
/// The caller marks them emitted on the descriptor once the change is
/// actually part of the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodedChange {
    pub row_schema: bool,
    pub key_schema: bool,
}

/// Why a change could not be encoded
#[derive(Debug)]
pub enum EncodeError {
    /// Drop the change and carry on
    Skip(RowAnomaly),
    /// The stream cannot continue
    Fatal(DecodeError),
}

/// Which row section is being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Full row under `values`
    Row,
    /// Identity columns under `oldkey`
    Key,
}

/// Renders changes according to the session's output switches.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEncoder {
    pretty: bool,
    include_schemas: bool,
    include_types: bool,
}

impl ChangeEncoder {
    pub fn new(options: &DecoderOptions) -> Self {
        Self {
            pretty: options.pretty_print,
            include_schemas: options.include_schemas,
            include_types: options.include_types,
        }
    }

    /// Append the members of one change object to `out`.
    ///
    /// `out` may hold partial output when an error is returned; callers
    /// encode into scratch space and discard it on failure.
    ///
    /// # Arguments
    /// * `relation` - live catalog snapshot of the changed relation
    /// * `event` - the change
    /// * `descriptor` - completed descriptor of an included relation
    pub fn encode(
        &self,
        out: &mut String,
        relation: &RelationInfo,
        event: &ChangeEvent,
        descriptor: &RelationDescriptor,
    ) -> Result<EncodedChange, EncodeError> {
        let op = event.op();
        let missing = || {
            EncodeError::Skip(RowAnomaly::MissingTuple {
                op,
                relation: relation.name.clone(),
            })
        };

        self.member(out, "op");
        out.push_str(&quoted(op.tag()));
        self.end_member(out, true);

        if self.include_schemas {
            self.member(out, "schema");
            out.push_str(&quoted(&relation.namespace));
            self.end_member(out, true);
        }
        self.member(out, "table");
        out.push_str(&quoted(&relation.name));
        self.end_member(out, true);

        let mut encoded = EncodedChange::default();
        match event {
            ChangeEvent::Insert { new } => {
                let new = new.as_ref().ok_or_else(missing)?;
                self.write_section(out, relation, descriptor, new, Section::Row, false)?;
                encoded.row_schema = true;
            }
            ChangeEvent::Update { new, old } => {
                let new = new.as_ref().ok_or_else(missing)?;
                self.write_section(out, relation, descriptor, new, Section::Row, true)?;
                encoded.row_schema = true;

                // Without an old image the identity is taken from the new
                // row, which is only right if the update left it unchanged.
                let key_row = match old {
                    Some(old) => old,
                    None => {
                        debug!("old tuple is null");
                        new
                    }
                };
                self.write_section(out, relation, descriptor, key_row, Section::Key, false)?;
                encoded.key_schema = true;
            }
            ChangeEvent::Delete { old } => {
                let old = old.as_ref().ok_or_else(missing)?;
                self.write_section(out, relation, descriptor, old, Section::Key, false)?;
                encoded.key_schema = true;
            }
        }

        Ok(encoded)
    }

    /// Write the schema arrays (if still due) and the values of one row
    fn write_section(
        &self,
        out: &mut String,
        relation: &RelationInfo,
        descriptor: &RelationDescriptor,
        row: &RowImage,
        section: Section,
        more_follows: bool,
    ) -> Result<(), EncodeError> {
        let (columns, schema, schema_emitted, keys) = match section {
            Section::Row => (
                descriptor.columns(),
                descriptor.row_schema(),
                descriptor.row_schema_emitted(),
                ("colnames", "coltypes", "values"),
            ),
            Section::Key => (
                descriptor.effective_key_columns(),
                descriptor.key_schema(),
                descriptor.key_schema_emitted(),
                ("keynames", "keytypes", "oldkey"),
            ),
        };
        let (names_key, types_key, values_key) = keys;

        if !schema_emitted {
            self.write_array(out, names_key, &schema.names, true);
            if self.include_types {
                self.write_array(out, types_key, &schema.types, true);
            }
        }

        self.member(out, values_key);
        out.push('[');
        self.write_values(out, relation, row, columns)?;
        out.push(']');
        self.end_member(out, more_follows);
        Ok(())
    }

    fn write_array(&self, out: &mut String, key: &str, items: &str, more_follows: bool) {
        self.member(out, key);
        out.push('[');
        out.push_str(items);
        out.push(']');
        self.end_member(out, more_follows);
    }

    fn write_values(
        &self,
        out: &mut String,
        relation: &RelationInfo,
        row: &RowImage,
        columns: &[ProjectedColumn],
    ) -> Result<(), EncodeError> {
        let separator = if self.pretty { ", " } else { "," };
        let mut first = true;

        for column in columns {
            if column.category == TypeCategory::Unknown {
                return Err(EncodeError::Fatal(DecodeError::UnknownType {
                    relation: relation.qualified_name(),
                    column: column.name.clone(),
                    type_oid: column.type_oid,
                }));
            }

            let datum = row.get(column.position);
            if matches!(datum, Datum::UnchangedToast) {
                warn!("column \"{}\" has an unchanged TOAST", column.name);
                continue;
            }

            if !first {
                out.push_str(separator);
            }
            first = false;

            let Datum::Text(text) = datum else {
                out.push_str("null");
                continue;
            };

            if column.category == TypeCategory::Numeric && is_special_number(text) {
                debug!("attribute \"{}\" is special: {}", column.name, text);
            }
            write_value(out, column.category, text).map_err(|err| match err {
                ValueError::NotANumber => EncodeError::Skip(RowAnomaly::NotANumber {
                    column: column.name.clone(),
                    value: text.clone(),
                }),
                ValueError::UnknownType => EncodeError::Fatal(DecodeError::UnknownType {
                    relation: relation.qualified_name(),
                    column: column.name.clone(),
                    type_oid: column.type_oid,
                }),
            })?;
        }

        Ok(())
    }

    /// Start a member: indentation and key
    fn member(&self, out: &mut String, key: &str) {
        if self.pretty {
            out.push_str("\t\t\t\"");
            out.push_str(key);
            out.push_str("\": ");
        } else {
            out.push('"');
            out.push_str(key);
            out.push_str("\":");
        }
    }

    fn end_member(&self, out: &mut String, more_follows: bool) {
        if more_follows {
            out.push(',');
        }
        if self.pretty {
            out.push('\n');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::RejectingCompiler;
    use crate::reldata::RelationCache;
    use crate::rules::RuleSet;
    use relfeed_types::types::{BOOL_OID, INT4_OID, NUMERIC_OID, TEXT_OID};
    use relfeed_types::{Attribute, ChangeOp, RelationId};

    fn orders() -> RelationInfo {
        RelationInfo::new(
            RelationId(1),
            "public",
            "orders",
            vec![
                Attribute::new("id", "int4", INT4_OID),
                Attribute::new("name", "text", TEXT_OID),
                Attribute::new("paid", "bool", BOOL_OID),
                Attribute::new("total", "numeric", NUMERIC_OID),
            ],
        )
        .with_identity(&["id"])
        .unwrap()
    }

    fn row(values: &[Option<&str>]) -> RowImage {
        RowImage::new(
            values
                .iter()
                .map(|v| v.map_or(Datum::Null, Datum::text))
                .collect(),
        )
    }

    fn encode(
        options: DecoderOptions,
        cache: &mut RelationCache,
        event: &ChangeEvent,
    ) -> Result<(String, EncodedChange), EncodeError> {
        let relation = orders();
        let descriptor = cache
            .resolve(&relation, &RuleSet::new(), &RejectingCompiler)
            .unwrap();
        let mut out = String::new();
        let encoded = ChangeEncoder::new(&options).encode(&mut out, &relation, event, descriptor)?;
        if encoded.row_schema {
            descriptor.mark_row_schema_emitted();
        }
        if encoded.key_schema {
            descriptor.mark_key_schema_emitted();
        }
        Ok((out, encoded))
    }

    #[test]
    fn test_insert_compact() {
        let mut cache = RelationCache::new(false);
        let event = ChangeEvent::insert(row(&[Some("1"), Some("a\"b"), Some("t"), Some("NaN")]));

        let (out, encoded) = encode(DecoderOptions::default(), &mut cache, &event).unwrap();
        assert_eq!(
            out,
            concat!(
                r#""op":"I","schema":"public","table":"orders","#,
                r#""colnames":["id","name","paid","total"],"#,
                r#""coltypes":["int4","text","bool","numeric"],"#,
                r#""values":[1,"a\"b",true,null]"#
            )
        );
        assert!(encoded.row_schema);
        assert!(!encoded.key_schema);

        // schema arrays are emitted once per relation
        let (out, _) = encode(DecoderOptions::default(), &mut cache, &event).unwrap();
        assert_eq!(
            out,
            r#""op":"I","schema":"public","table":"orders","values":[1,"a\"b",true,null]"#
        );
    }

    #[test]
    fn test_update_without_old_row_uses_new_identity() {
        let options = DecoderOptions {
            include_schemas: false,
            include_types: false,
            ..Default::default()
        };
        let mut cache = RelationCache::new(false);
        let event = ChangeEvent::update(row(&[Some("7"), None, Some("f"), Some("1.5")]), None);

        let (out, encoded) = encode(options, &mut cache, &event).unwrap();
        assert_eq!(
            out,
            concat!(
                r#""op":"U","table":"orders","#,
                r#""colnames":["id","name","paid","total"],"#,
                r#""values":[7,null,false,1.5],"#,
                r#""keynames":["id"],"oldkey":[7]"#
            )
        );
        assert!(encoded.row_schema && encoded.key_schema);
    }

    #[test]
    fn test_update_with_old_row() {
        let options = DecoderOptions {
            include_schemas: false,
            include_types: false,
            ..Default::default()
        };
        let mut cache = RelationCache::new(false);
        let event = ChangeEvent::update(
            row(&[Some("8"), Some("x"), Some("t"), Some("2")]),
            Some(row(&[Some("7"), None, None, None])),
        );

        let (out, _) = encode(options, &mut cache, &event).unwrap();
        assert!(out.ends_with(r#""keynames":["id"],"oldkey":[7]"#), "{out}");
    }

    #[test]
    fn test_delete_pretty() {
        let options = DecoderOptions {
            pretty_print: true,
            ..Default::default()
        };
        let mut cache = RelationCache::new(true);
        let event = ChangeEvent::delete(row(&[Some("3")]));

        let (out, encoded) = encode(options, &mut cache, &event).unwrap();
        assert_eq!(
            out,
            concat!(
                "\t\t\t\"op\": \"D\",\n",
                "\t\t\t\"schema\": \"public\",\n",
                "\t\t\t\"table\": \"orders\",\n",
                "\t\t\t\"keynames\": [\"id\"],\n",
                "\t\t\t\"keytypes\": [\"int4\"],\n",
                "\t\t\t\"oldkey\": [3]\n",
            )
        );
        assert!(encoded.key_schema);
        assert!(!encoded.row_schema);
    }

    #[test]
    fn test_pretty_values_separator() {
        let options = DecoderOptions {
            pretty_print: true,
            include_types: false,
            include_schemas: false,
            ..Default::default()
        };
        let mut cache = RelationCache::new(true);
        let event = ChangeEvent::insert(row(&[Some("1"), Some("a"), None, Some("-2e3")]));

        let (out, _) = encode(options, &mut cache, &event).unwrap();
        assert!(out.contains("\t\t\t\"colnames\": [\"id\", \"name\", \"paid\", \"total\"],\n"));
        assert!(out.ends_with("\t\t\t\"values\": [1, \"a\", null, -2e3]\n"));
    }

    #[test]
    fn test_unchanged_toast_is_skipped() {
        let options = DecoderOptions {
            include_schemas: false,
            include_types: false,
            ..Default::default()
        };
        let mut cache = RelationCache::new(false);
        let new = RowImage::new(vec![
            Datum::text("1"),
            Datum::UnchangedToast,
            Datum::text("t"),
            Datum::text("3"),
        ]);
        let (out, _) = encode(options, &mut cache, &ChangeEvent::insert(new)).unwrap();
        assert!(out.ends_with(r#""values":[1,true,3]"#), "{out}");
    }

    #[test]
    fn test_not_a_number_is_skipped() {
        let mut cache = RelationCache::new(false);
        let event = ChangeEvent::insert(row(&[Some("one"), None, None, None]));

        let err = encode(DecoderOptions::default(), &mut cache, &event).unwrap_err();
        match err {
            EncodeError::Skip(RowAnomaly::NotANumber { column, value }) => {
                assert_eq!(column, "id");
                assert_eq!(value, "one");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!cache.get(RelationId(1)).unwrap().row_schema_emitted());
    }

    #[test]
    fn test_missing_tuple() {
        let mut cache = RelationCache::new(false);
        let event = ChangeEvent::Delete { old: None };
        let err = encode(DecoderOptions::default(), &mut cache, &event).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::Skip(RowAnomaly::MissingTuple {
                op: ChangeOp::Delete,
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let relation = RelationInfo::new(
            RelationId(2),
            "public",
            "odd",
            vec![Attribute::new("blob", "mystery", relfeed_types::types::INVALID_OID)],
        );
        let mut cache = RelationCache::new(false);
        let descriptor = cache
            .resolve(&relation, &RuleSet::new(), &RejectingCompiler)
            .unwrap();
        let mut out = String::new();
        let err = ChangeEncoder::new(&DecoderOptions::default())
            .encode(
                &mut out,
                &relation,
                &ChangeEvent::insert(row(&[Some("x")])),
                descriptor,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            EncodeError::Fatal(DecodeError::UnknownType { type_oid: 0, .. })
        ));
    }
}
