//! Domain module - listing value objects, change-sets, outcomes and the
//! boundary traits of the reconciliation core.
//!
//! Each module is its own file in the domain/ directory; the commonly used
//! items are re-exported here.

pub mod change_set;
pub mod errors;
pub mod fields;
pub mod listing;
pub mod outcome;
pub mod repositories;
pub mod subject;
pub mod system_record;

pub use change_set::ChangeSet;
pub use errors::{SyncError, TransportError};
pub use fields::{ComparePolicy, Field, FieldMap, FieldValue};
pub use listing::{CanonicalRecord, ExternalId, ListingStatus, Money, RawPayload};
pub use outcome::{
    RecordOutcome, RecordReport, RunMode, RunReport, RunSummary, SubjectReport, SubjectStatus,
};
pub use repositories::{ListingSource, SystemOfRecord};
pub use subject::{Subject, SubjectKey};
pub use system_record::{LookupCriteria, RecordId, SystemRecord};
