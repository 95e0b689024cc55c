//! Differ: minimal ordered change-set between stored and observed state.

use crate::domain::change_set::ChangeSet;
use crate::domain::fields::ComparePolicy;
use crate::domain::listing::CanonicalRecord;
use crate::domain::system_record::SystemRecord;

/// Fields of `incoming` that must be written over `existing`.
///
/// With no stored record every observed field is returned (the create
/// payload). Fields absent on `incoming` never appear. Status and ended
/// are written together whenever either one differs.
pub fn diff(existing: Option<&SystemRecord>, incoming: &CanonicalRecord) -> ChangeSet {
    let observed = incoming.observed_fields();
    let Some(existing) = existing else {
        return observed.into_iter().collect();
    };

    let lifecycle_changed = observed.iter().any(|(field, value)| {
        field.policy() == ComparePolicy::LifecyclePair
            && field.policy().requires_update(existing.get(*field), value)
    });

    observed
        .into_iter()
        .filter(|(field, value)| match field.policy() {
            ComparePolicy::LifecyclePair => lifecycle_changed,
            policy => policy.requires_update(existing.get(*field), value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fields::{Field, FieldValue};
    use crate::domain::listing::{ExternalId, ListingStatus, Money};
    use crate::domain::subject::SubjectKey;
    use crate::domain::system_record::RecordId;

    fn incoming() -> CanonicalRecord {
        let id = ExternalId::parse("https://reverb.com/item/9-x").unwrap();
        let mut record = CanonicalRecord::new(id);
        record.name = Some("Godin Stadium HT".into());
        record.price = Some(Money::new(45_000, "CAD"));
        record.status = ListingStatus::Ended;
        record.ended = true;
        record
    }

    fn stored(fields: Vec<(Field, FieldValue)>) -> SystemRecord {
        let mut record = SystemRecord::new(RecordId(7), SubjectKey(1));
        record.fields.extend(fields);
        record
    }

    #[test]
    fn absent_existing_returns_full_record() {
        let changes = diff(None, &incoming());
        assert_eq!(
            changes.fields(),
            vec![Field::ExternalId, Field::Name, Field::Price, Field::Status, Field::Ended]
        );
    }

    #[test]
    fn lifecycle_pair_moves_together() {
        // stored status already Ended but the flag lags behind
        let existing = stored(vec![
            (Field::Status, FieldValue::Status(ListingStatus::Ended)),
            (Field::Ended, FieldValue::Flag(false)),
        ]);
        let changes = diff(Some(&existing), &incoming());
        assert!(changes.contains(Field::Status));
        assert!(changes.contains(Field::Ended));
    }

    #[test]
    fn unknown_status_is_never_written() {
        let mut record = incoming();
        record.status = ListingStatus::Unknown;
        record.ended = false;
        let existing = stored(vec![
            (Field::Status, FieldValue::Status(ListingStatus::Active)),
            (Field::Ended, FieldValue::Flag(false)),
        ]);
        let changes = diff(Some(&existing), &record);
        assert!(!changes.contains(Field::Status));
        assert!(!changes.contains(Field::Ended));
    }

    #[test]
    fn applied_diff_is_current() {
        let existing = stored(vec![(Field::Views, FieldValue::Count(3))]);
        let changes = diff(Some(&existing), &incoming());
        assert!(!changes.is_empty());
        assert!(diff(Some(&existing.apply(&changes)), &incoming()).is_empty());
    }
}
