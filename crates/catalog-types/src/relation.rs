//! Relation catalog snapshots.
//!
//! A [`RelationInfo`] is the live shape of a table as seen by the change
//! source at the time a change is decoded: its name and namespace, ordered
//! column list and the declared replica identity.

use std::fmt;

use crate::types::Oid;
use crate::TypesError;

/// Stable identity of a relation (its OID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub u32);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Column definition in a relation snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Column name
    pub name: String,

    /// Type name as shown to consumers (e.g. `int4`, `text`)
    pub type_name: String,

    /// Type identifier, decides value rendering
    pub type_oid: Oid,

    /// Attribute number; negative for system columns
    pub attnum: i16,

    /// Column has been dropped but still occupies its position
    pub dropped: bool,
}

impl Attribute {
    /// Create a live user column.
    ///
    /// The attribute number is assigned when the column is added to a
    /// [`RelationInfo`].
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            type_oid,
            attnum: 0,
            dropped: false,
        }
    }

    /// Mark the column as dropped.
    pub fn dropped(mut self) -> Self {
        self.dropped = true;
        self
    }

    /// True for system columns (negative attribute numbers)
    pub fn is_system(&self) -> bool {
        self.attnum < 0
    }

    /// Whether the column takes part in output at all
    pub fn is_visible(&self) -> bool {
        !self.dropped && !self.is_system()
    }
}

/// Replica identity setting of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicaIdentity {
    /// Primary key, if any
    #[default]
    Default,
    /// No identity information is logged
    Nothing,
    /// The whole old row is logged
    Full,
    /// An explicitly chosen unique index
    Index,
}

/// Live catalog snapshot of a relation.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationInfo {
    /// Relation identity
    pub id: RelationId,

    /// Schema the relation lives in
    pub namespace: String,

    /// Bare relation name
    pub name: String,

    /// Ordered column list, including dropped columns
    pub columns: Vec<Attribute>,

    /// Column positions of the declared identity index, if any
    pub identity_index: Option<Vec<usize>>,

    /// Replica identity setting
    pub replica_identity: ReplicaIdentity,
}

impl RelationInfo {
    /// Create a relation snapshot without identity index.
    ///
    /// Attribute numbers are assigned from the column positions unless a
    /// column already carries a negative (system) number.
    pub fn new(
        id: RelationId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<Attribute>,
    ) -> Self {
        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(pos, mut attr)| {
                if attr.attnum >= 0 {
                    attr.attnum = (pos + 1) as i16;
                }
                attr
            })
            .collect();

        Self {
            id,
            namespace: namespace.into(),
            name: name.into(),
            columns,
            identity_index: None,
            replica_identity: ReplicaIdentity::Default,
        }
    }

    /// Declare the identity index by column names.
    pub fn with_identity(mut self, names: &[&str]) -> Result<Self, TypesError> {
        let positions = names
            .iter()
            .map(|name| {
                self.column_position(name)
                    .ok_or_else(|| TypesError::IdentityColumnNotFound {
                        relation: self.name.clone(),
                        column: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.identity_index = Some(positions);
        Ok(self)
    }

    /// Set the replica identity.
    pub fn with_replica_identity(mut self, identity: ReplicaIdentity) -> Self {
        self.replica_identity = identity;
        self
    }

    /// Position of a live column by name
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|attr| attr.is_visible() && attr.name == name)
    }

    /// Whether a column position belongs to the identity index
    pub fn is_identity_column(&self, position: usize) -> bool {
        self.identity_index
            .as_ref()
            .is_some_and(|index| index.contains(&position))
    }

    /// Whether update/delete changes on this relation carry enough
    /// information to locate the old row.
    ///
    /// The identity index only counts under `DEFAULT` or `INDEX` replica
    /// identity.
    pub fn has_identity(&self) -> bool {
        match self.replica_identity {
            ReplicaIdentity::Full => true,
            ReplicaIdentity::Default | ReplicaIdentity::Index => self.identity_index.is_some(),
            ReplicaIdentity::Nothing => false,
        }
    }

    /// `namespace.name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{INT4_OID, TEXT_OID};

    fn orders() -> RelationInfo {
        RelationInfo::new(
            RelationId(16384),
            "public",
            "orders",
            vec![
                Attribute::new("id", "int4", INT4_OID),
                Attribute::new("gone", "text", TEXT_OID).dropped(),
                Attribute::new("name", "text", TEXT_OID),
            ],
        )
    }

    #[test]
    fn test_attribute_numbers_follow_positions() {
        let rel = orders();
        let attnums: Vec<i16> = rel.columns.iter().map(|a| a.attnum).collect();
        assert_eq!(attnums, vec![1, 2, 3]);
    }

    #[test]
    fn test_column_position_skips_dropped() {
        let rel = orders();
        assert_eq!(rel.column_position("name"), Some(2));
        assert_eq!(rel.column_position("gone"), None);
        assert_eq!(rel.column_position("missing"), None);
    }

    #[test]
    fn test_with_identity() {
        let rel = orders().with_identity(&["id"]).unwrap();
        assert_eq!(rel.identity_index, Some(vec![0]));
        assert!(rel.is_identity_column(0));
        assert!(!rel.is_identity_column(2));
        assert!(rel.has_identity());

        let err = orders().with_identity(&["nope"]).unwrap_err();
        assert!(matches!(err, TypesError::IdentityColumnNotFound { .. }));
    }

    #[test]
    fn test_has_identity_with_full_replica_identity() {
        let rel = orders();
        assert!(!rel.has_identity());
        let rel = rel.with_replica_identity(ReplicaIdentity::Full);
        assert!(rel.has_identity());
        assert_eq!(rel.qualified_name(), "public.orders");
    }

    #[test]
    fn test_replica_identity_nothing_ignores_index() {
        let rel = orders().with_identity(&["id"]).unwrap();
        assert!(rel.with_replica_identity(ReplicaIdentity::Index).has_identity());

        let rel = orders()
            .with_identity(&["id"])
            .unwrap()
            .with_replica_identity(ReplicaIdentity::Nothing);
        assert!(!rel.has_identity());
    }
}
