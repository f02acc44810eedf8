//! Row images and change events.

use std::fmt;

/// One column value in a row image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datum {
    /// SQL NULL
    Null,
    /// Textual form produced by the type's output routine
    Text(String),
    /// Externally stored large value that the change did not touch; its
    /// content is not available in the change record
    UnchangedToast,
}

impl Datum {
    /// Convenience constructor for textual values
    pub fn text(value: impl Into<String>) -> Self {
        Datum::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Snapshot of one row: one datum per column position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowImage {
    values: Vec<Datum>,
}

impl RowImage {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    /// Datum at a column position; positions beyond the image read as NULL
    pub fn get(&self, position: usize) -> &Datum {
        self.values.get(position).unwrap_or(&Datum::Null)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Datum> {
        self.values.iter()
    }
}

impl From<Vec<Datum>> for RowImage {
    fn from(values: Vec<Datum>) -> Self {
        Self::new(values)
    }
}

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    /// Single-letter tag used in the output
    pub fn tag(&self) -> &'static str {
        match self {
            ChangeOp::Insert => "I",
            ChangeOp::Update => "U",
            ChangeOp::Delete => "D",
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeOp::Insert => "INSERT",
            ChangeOp::Update => "UPDATE",
            ChangeOp::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One change observed on a relation.
///
/// Tuple data is optional because the source may fail to supply it; the
/// decoder treats missing required data as a per-row anomaly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Insert with the new row
    Insert { new: Option<RowImage> },
    /// Update with the new row and, when the identity changed or the
    /// replica identity is FULL, the old row
    Update {
        new: Option<RowImage>,
        old: Option<RowImage>,
    },
    /// Delete with the old row (or its identity columns)
    Delete { old: Option<RowImage> },
}

impl ChangeEvent {
    pub fn insert(new: impl Into<RowImage>) -> Self {
        ChangeEvent::Insert {
            new: Some(new.into()),
        }
    }

    pub fn update(new: impl Into<RowImage>, old: Option<RowImage>) -> Self {
        ChangeEvent::Update {
            new: Some(new.into()),
            old,
        }
    }

    pub fn delete(old: impl Into<RowImage>) -> Self {
        ChangeEvent::Delete {
            old: Some(old.into()),
        }
    }

    pub fn op(&self) -> ChangeOp {
        match self {
            ChangeEvent::Insert { .. } => ChangeOp::Insert,
            ChangeEvent::Update { .. } => ChangeOp::Update,
            ChangeEvent::Delete { .. } => ChangeOp::Delete,
        }
    }

    pub fn new_row(&self) -> Option<&RowImage> {
        match self {
            ChangeEvent::Insert { new } | ChangeEvent::Update { new, .. } => new.as_ref(),
            ChangeEvent::Delete { .. } => None,
        }
    }

    pub fn old_row(&self) -> Option<&RowImage> {
        match self {
            ChangeEvent::Update { old, .. } | ChangeEvent::Delete { old } => old.as_ref(),
            ChangeEvent::Insert { .. } => None,
        }
    }

    /// Row a row filter is evaluated against: the new image if present,
    /// else the old one
    pub fn filter_row(&self) -> Option<&RowImage> {
        self.new_row().or_else(|| self.old_row())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_image_get_past_end_is_null() {
        let row = RowImage::new(vec![Datum::text("1")]);
        assert_eq!(row.get(0), &Datum::text("1"));
        assert_eq!(row.get(5), &Datum::Null);
    }

    #[test]
    fn test_filter_row_prefers_new() {
        let new = RowImage::new(vec![Datum::text("new")]);
        let old = RowImage::new(vec![Datum::text("old")]);

        let update = ChangeEvent::update(new.clone(), Some(old.clone()));
        assert_eq!(update.filter_row(), Some(&new));
        assert_eq!(update.op().tag(), "U");

        let delete = ChangeEvent::delete(old.clone());
        assert_eq!(delete.filter_row(), Some(&old));
        assert_eq!(delete.new_row(), None);

        let broken = ChangeEvent::Insert { new: None };
        assert_eq!(broken.filter_row(), None);
        assert_eq!(broken.op().to_string(), "INSERT");
    }
}
