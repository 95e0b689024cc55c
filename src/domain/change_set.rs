//! Ordered field changes computed before any write is issued.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::fields::{Field, FieldMap, FieldValue};

/// Minimal ordered mapping from field to new value.
///
/// Iteration follows field declaration order. An empty change-set means
/// "nothing to do".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(FieldMap);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, value: FieldValue) {
        self.0.insert(field, value);
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.0.get(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &FieldValue)> {
        self.0.iter().map(|(f, v)| (*f, v))
    }

    pub fn fields(&self) -> Vec<Field> {
        self.0.keys().copied().collect()
    }

    /// Keeps only fields in `owned`.
    ///
    /// Status and ended travel together: if either is not owned, both go.
    pub fn restricted_to(&self, owned: &[Field]) -> Self {
        let pair_owned = owned.contains(&Field::Status) && owned.contains(&Field::Ended);
        let kept = self
            .0
            .iter()
            .filter(|(field, _)| match field {
                Field::Status | Field::Ended => pair_owned,
                other => owned.contains(other),
            })
            .map(|(f, v)| (*f, v.clone()))
            .collect();
        Self(kept)
    }
}

impl FromIterator<(Field, FieldValue)> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = (Field, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = (&'a Field, &'a FieldValue);
    type IntoIter = std::collections::btree_map::Iter<'a, Field, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("{}");
        }
        let parts: Vec<String> = self.iter().map(|(field, v)| format!("{field}: {v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::listing::{ListingStatus, Money};

    fn sample() -> ChangeSet {
        [
            (Field::Ended, FieldValue::Flag(true)),
            (Field::Price, FieldValue::Money(Money::new(45_000, "CAD"))),
            (Field::Status, FieldValue::Status(ListingStatus::Ended)),
            (Field::Views, FieldValue::Count(12)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn iterates_in_declaration_order() {
        assert_eq!(
            sample().fields(),
            vec![Field::Price, Field::Status, Field::Ended, Field::Views]
        );
        assert_eq!(
            sample().to_string(),
            "{price: 450.00 CAD, status: Ended, ended: true, views: 12}"
        );
    }

    #[test]
    fn restriction_keeps_lifecycle_pair_together() {
        let only_status = sample().restricted_to(&[Field::Price, Field::Status]);
        assert_eq!(only_status.fields(), vec![Field::Price]);

        let both = sample().restricted_to(&[Field::Status, Field::Ended, Field::Views]);
        assert_eq!(both.fields(), vec![Field::Status, Field::Ended, Field::Views]);
    }
}
