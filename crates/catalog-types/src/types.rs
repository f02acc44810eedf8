//! Type identifiers and their output categories.
//!
//! Values arrive already rendered as text; the type OID only decides how
//! that text is placed into JSON.

/// PostgreSQL-style object identifier for a data type
pub type Oid = u32;

/// No type: columns carrying it have no output routine
pub const INVALID_OID: Oid = 0;
pub const BOOL_OID: Oid = 16;
pub const INT8_OID: Oid = 20;
pub const INT2_OID: Oid = 21;
pub const INT4_OID: Oid = 23;
pub const TEXT_OID: Oid = 25;
pub const OID_OID: Oid = 26;
pub const FLOAT4_OID: Oid = 700;
pub const FLOAT8_OID: Oid = 701;
pub const VARCHAR_OID: Oid = 1043;
pub const DATE_OID: Oid = 1082;
pub const TIMESTAMPTZ_OID: Oid = 1184;
pub const NUMERIC_OID: Oid = 1700;

/// How values of a type are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// Integer, float and decimal family: unquoted when the text is a number
    Numeric,
    /// Unquoted `true` / `false`
    Boolean,
    /// Everything else: quoted, escaped string
    Text,
    /// No output routine is known for the type
    Unknown,
}

/// Classify a type OID
pub fn type_category(oid: Oid) -> TypeCategory {
    match oid {
        INVALID_OID => TypeCategory::Unknown,
        INT2_OID | INT4_OID | INT8_OID | OID_OID | FLOAT4_OID | FLOAT8_OID | NUMERIC_OID => {
            TypeCategory::Numeric
        }
        BOOL_OID => TypeCategory::Boolean,
        _ => TypeCategory::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_category() {
        assert_eq!(type_category(INT4_OID), TypeCategory::Numeric);
        assert_eq!(type_category(NUMERIC_OID), TypeCategory::Numeric);
        assert_eq!(type_category(FLOAT8_OID), TypeCategory::Numeric);
        assert_eq!(type_category(BOOL_OID), TypeCategory::Boolean);
        assert_eq!(type_category(TEXT_OID), TypeCategory::Text);
        assert_eq!(type_category(DATE_OID), TypeCategory::Text);
        assert_eq!(type_category(INVALID_OID), TypeCategory::Unknown);
    }
}
