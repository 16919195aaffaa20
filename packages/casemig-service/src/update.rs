use std::sync::Arc;

use casemig_domain::{
	CaseId, CaseRecord, CaseValue, MIGRATION_CASE_ID_FIELD, MIGRATION_ID_FIELD,
	MigrationDefinition,
};

use crate::{CallAuth, CaseStore, EventDetails, EventTarget, Result, ServiceTokenGenerator};

/// Run-wide values every update needs. Built once per run and shared read-only by workers.
#[derive(Debug, Clone)]
pub struct UpdateContext {
	pub user_token: String,
	pub user_id: String,
	pub case_type: String,
	pub event_id: String,
	pub event_summary: String,
	pub event_description: String,
	pub migration_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
	Submitted(Box<CaseRecord>),
	/// The accept predicate rejected the fresh snapshot. Nothing was written.
	Skipped,
}

/// Read-modify-write of a single case through the store's start/submit event protocol.
#[derive(Clone)]
pub struct CaseUpdateClient {
	store: Arc<dyn CaseStore>,
	tokens: Arc<dyn ServiceTokenGenerator>,
}
impl CaseUpdateClient {
	pub fn new(store: Arc<dyn CaseStore>, tokens: Arc<dyn ServiceTokenGenerator>) -> Self {
		Self { store, tokens }
	}

	/// Starts the event, gates on the definition's predicate, transforms the fresh snapshot and
	/// submits it with the token from the same start. Errors are never retried here.
	pub async fn update(
		&self,
		ctx: &UpdateContext,
		jurisdiction: &str,
		case_id: CaseId,
		definition: &MigrationDefinition,
	) -> Result<UpdateOutcome> {
		let target = EventTarget {
			user_id: ctx.user_id.as_str(),
			jurisdiction,
			case_type: ctx.case_type.as_str(),
			case_id,
			event_id: ctx.event_id.as_str(),
		};
		let started = {
			let service_token = self.tokens.generate().await?;
			let auth =
				CallAuth { user_token: ctx.user_token.as_str(), service_token: &service_token };

			self.store.start_update(auth, target).await?
		};
		let mut snapshot = started.case;

		stamp_provenance(&mut snapshot, &ctx.migration_id, case_id);

		if !definition.accepts(&snapshot) {
			tracing::debug!(
				case_id,
				migration_id = %ctx.migration_id,
				"Case rejected by accept predicate."
			);

			return Ok(UpdateOutcome::Skipped);
		}

		let data = definition.apply(snapshot.data, &ctx.migration_id)?;
		let details = EventDetails {
			summary: ctx.event_summary.as_str(),
			description: ctx.event_description.as_str(),
		};
		let service_token = self.tokens.generate().await?;
		let auth = CallAuth { user_token: ctx.user_token.as_str(), service_token: &service_token };
		let updated =
			self.store.submit_update(auth, target, details, &started.token, data).await?;

		Ok(UpdateOutcome::Submitted(Box::new(updated)))
	}
}

fn stamp_provenance(snapshot: &mut CaseRecord, migration_id: &str, case_id: CaseId) {
	snapshot.data.insert(MIGRATION_ID_FIELD.to_string(), CaseValue::from(migration_id));
	snapshot.data.insert(MIGRATION_CASE_ID_FIELD.to_string(), CaseValue::from(case_id));
}
