use std::{collections::BTreeMap, sync::Arc};

use casemig_domain::{
	CaseData, CaseRecord, MigrationDefinition, QueryClause, QueryError, TransformError,
};

use crate::{Error, Result};

/// Suffix appended to a forward migration id to name its inverse.
pub const ROLLBACK_SUFFIX: &str = "-rollback";

/// Named migration definitions available to a runner.
#[derive(Debug, Default, Clone)]
pub struct MigrationRegistry {
	definitions: BTreeMap<String, Arc<MigrationDefinition>>,
}
impl MigrationRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, definition: MigrationDefinition) -> Result<()> {
		let id = definition.id.trim().to_string();

		if id.is_empty() {
			return Err(Error::configuration("Migration id must be non-blank."));
		}
		if self.definitions.contains_key(&id) {
			return Err(Error::configuration(format!("Migration {id} is already registered.")));
		}

		self.definitions.insert(id, Arc::new(definition));

		Ok(())
	}

	/// Registers a field rename as `id` and its inverse as `id` + `-rollback`.
	pub fn register_rename(&mut self, id: &str, from: &str, to: &str) -> Result<()> {
		let forward = rename_field(id, from, to)?;
		let rollback = rename_field(format!("{id}{ROLLBACK_SUFFIX}"), to, from)?.rollback();

		self.register(forward)?;
		self.register(rollback)
	}

	pub fn get(&self, id: &str) -> Result<Arc<MigrationDefinition>> {
		self.definitions.get(id.trim()).cloned().ok_or_else(|| {
			Error::configuration(format!(
				"Unknown migration {id:?}. Registered: {}.",
				self.ids().collect::<Vec<_>>().join(", ")
			))
		})
	}

	pub fn ids(&self) -> impl Iterator<Item = &str> {
		self.definitions.keys().map(String::as_str)
	}
}

/// Moves the value of data field `from` to `to`.
///
/// Candidates are cases where `from` is present and `to` is not. The predicate rechecks the same
/// condition on the fresh snapshot, so a second run over migrated cases submits nothing.
pub fn rename_field(
	id: impl Into<String>,
	from: &str,
	to: &str,
) -> Result<MigrationDefinition, QueryError> {
	let (from, to) = (from.trim().to_string(), to.trim().to_string());

	if from.is_empty() || to.is_empty() {
		return Err(QueryError::BlankField { clause: "exists" });
	}

	let query = QueryClause::bool(
		[QueryClause::exists(format!("data.{from}"))?],
		[QueryClause::exists(format!("data.{to}"))?],
		[],
	);
	let accept = {
		let (from, to) = (from.clone(), to.clone());

		move |record: &CaseRecord| is_set(&record.data, &from) && !is_set(&record.data, &to)
	};
	let transform = move |mut data: CaseData, _: &str| -> Result<CaseData, TransformError> {
		let value = data
			.remove(&from)
			.filter(|value| !value.is_null())
			.ok_or_else(|| TransformError::new(format!("Field {from} is not set.")))?;

		data.insert(to.clone(), value);

		Ok(data)
	};

	Ok(MigrationDefinition::new(id, query, accept, transform))
}

fn is_set(data: &CaseData, key: &str) -> bool {
	data.get(key).is_some_and(|value| !value.is_null())
}
