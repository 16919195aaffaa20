pub mod case;
pub mod migration;
pub mod query;
pub mod run;

pub use case::{CaseData, CaseId, CaseRecord, CaseValue};
pub use migration::{
	AcceptPredicate, MIGRATION_CASE_ID_FIELD, MIGRATION_ID_FIELD, MigrationDefinition,
	MigrationMode, Transform, TransformError,
};
pub use query::{QueryClause, QueryError, RangeBound, SearchContext, SortOrder};
pub use run::{MigrationRunResult, RecordOutcome};
