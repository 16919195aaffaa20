use std::{fmt, sync::Arc};

use crate::{
	case::{CaseData, CaseRecord},
	query::QueryClause,
};

/// Data key stamped with the migration identifier before the accept predicate runs.
pub const MIGRATION_ID_FIELD: &str = "migrationId";
/// Data key stamped with the case reference before the accept predicate runs.
pub const MIGRATION_CASE_ID_FIELD: &str = "migrationCaseId";

pub type AcceptPredicate = Arc<dyn Fn(&CaseRecord) -> bool + Send + Sync>;
pub type Transform =
	Arc<dyn Fn(CaseData, &str) -> Result<CaseData, TransformError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transform failed: {message}")]
pub struct TransformError {
	pub message: String,
}
impl TransformError {
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Forward runs apply a change; rollback runs apply its registered inverse. Both use the same
/// engine and protocol; only wording in logs and summaries differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationMode {
	#[default]
	Forward,
	Rollback,
}
impl MigrationMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Forward => "forward",
			Self::Rollback => "rollback",
		}
	}

	/// Past-tense verb used for successful records.
	pub fn done_verb(&self) -> &'static str {
		match self {
			Self::Forward => "Migrated",
			Self::Rollback => "Rolled back",
		}
	}
}

#[derive(Clone)]
pub struct MigrationDefinition {
	pub id: String,
	pub mode: MigrationMode,
	pub accept: AcceptPredicate,
	pub transform: Transform,
	pub query: QueryClause,
}
impl MigrationDefinition {
	pub fn new<P, T>(id: impl Into<String>, query: QueryClause, accept: P, transform: T) -> Self
	where
		P: Fn(&CaseRecord) -> bool + Send + Sync + 'static,
		T: Fn(CaseData, &str) -> Result<CaseData, TransformError> + Send + Sync + 'static,
	{
		Self {
			id: id.into(),
			mode: MigrationMode::Forward,
			accept: Arc::new(accept),
			transform: Arc::new(transform),
			query,
		}
	}

	pub fn rollback(mut self) -> Self {
		self.mode = MigrationMode::Rollback;

		self
	}

	pub fn accepts(&self, record: &CaseRecord) -> bool {
		(self.accept)(record)
	}

	pub fn apply(&self, data: CaseData, migration_id: &str) -> Result<CaseData, TransformError> {
		(self.transform)(data, migration_id)
	}
}
impl fmt::Debug for MigrationDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MigrationDefinition")
			.field("id", &self.id)
			.field("mode", &self.mode)
			.field("query", &self.query)
			.finish_non_exhaustive()
	}
}
