//! Drives one migration run end to end.
//!
//! A run validates its inputs before touching the network, authenticates once, then walks the
//! candidate set page by page. Each record is an isolated unit of work: its failure is logged and
//! tallied, never propagated. Only configuration errors and a failed sizing probe abort a run.

use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tokio::sync::Semaphore;
use uuid::Uuid;

use casemig_domain::{CaseId, MigrationDefinition, MigrationRunResult, RecordOutcome};

use crate::{
	CallAuth, CaseUpdateClient, Collaborators, CursorFetcher, Error, Result, UpdateContext,
	UpdateOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
	Sequential,
	/// Records of one page are processed by at most `workers` concurrent tasks. The page is
	/// joined before the cursor advances.
	Parallel { workers: usize },
}

#[derive(Debug, Clone)]
pub struct RunOptions {
	pub page_size: u32,
	pub strategy: ExecutionStrategy,
	/// Upper bound on records attempted in one run.
	pub max_cases: Option<usize>,
}
impl Default for RunOptions {
	fn default() -> Self {
		Self { page_size: 100, strategy: ExecutionStrategy::Sequential, max_cases: None }
	}
}

#[derive(Debug, Clone)]
pub enum MigrationTarget {
	/// Candidates come from the definition's query through the search-after cursor.
	Query,
	/// Literal case references. The cursor is bypassed.
	CaseIds(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct EventSettings {
	pub id: String,
	pub summary: String,
	pub description: String,
}

#[derive(Debug, Clone)]
pub struct MigrationRequest {
	pub definition: Arc<MigrationDefinition>,
	pub case_type: Option<String>,
	/// Used for explicit ids when the store lookup does not report a jurisdiction.
	pub jurisdiction: Option<String>,
	pub target: MigrationTarget,
	pub username: Option<String>,
	pub password: Option<String>,
	pub event: EventSettings,
}

/// A record handed to a worker. Query hits carry their jurisdiction; explicit ids are looked up.
#[derive(Debug, Clone)]
struct WorkItem {
	case_id: CaseId,
	jurisdiction: Option<String>,
}

/// Validated inputs. Producing one performs no remote call.
struct RunPlan {
	case_type: String,
	username: String,
	password: String,
	case_ids: Option<Vec<CaseId>>,
}

/// Per-run shared state handed to every worker.
struct Worker {
	collaborators: Collaborators,
	updates: CaseUpdateClient,
	definition: Arc<MigrationDefinition>,
	ctx: UpdateContext,
	fallback_jurisdiction: Option<String>,
	/// Outcomes recorded by workers, drained into the run result.
	tally: Mutex<Vec<(CaseId, RecordOutcome)>>,
}
impl Worker {
	async fn process(&self, item: WorkItem) -> RecordOutcome {
		let case_id = item.case_id;
		let verb = self.definition.mode.done_verb();
		let outcome = match self.migrate(item).await {
			Ok(UpdateOutcome::Submitted(_)) => {
				tracing::info!(case_id, migration_id = %self.ctx.migration_id, "{verb} case.");

				RecordOutcome::Submitted
			},
			Ok(UpdateOutcome::Skipped) => {
				tracing::info!(case_id, migration_id = %self.ctx.migration_id, "Case skipped.");

				RecordOutcome::Skipped
			},
			Err(err) => {
				tracing::error!(
					case_id,
					migration_id = %self.ctx.migration_id,
					error = %err,
					"Case migration failed."
				);

				RecordOutcome::Failed
			},
		};

		self.record(case_id, outcome);

		outcome
	}

	async fn migrate(&self, item: WorkItem) -> Result<UpdateOutcome> {
		let jurisdiction = match item.jurisdiction.filter(|value| !value.trim().is_empty()) {
			Some(jurisdiction) => jurisdiction,
			None => self.lookup_jurisdiction(item.case_id).await?,
		};

		self.updates.update(&self.ctx, &jurisdiction, item.case_id, &self.definition).await
	}

	async fn lookup_jurisdiction(&self, case_id: CaseId) -> Result<String> {
		let service_token = self.collaborators.tokens.generate().await?;
		let auth =
			CallAuth { user_token: self.ctx.user_token.as_str(), service_token: &service_token };
		let record = self.collaborators.store.get_case(auth, case_id).await?;

		if record.case_type != self.ctx.case_type && !record.case_type.is_empty() {
			return Err(Error::NotFound {
				message: format!(
					"Case {case_id} belongs to case type {}, not {}.",
					record.case_type, self.ctx.case_type
				),
			});
		}
		if !record.jurisdiction.is_empty() {
			return Ok(record.jurisdiction);
		}

		self.fallback_jurisdiction.clone().ok_or_else(|| Error::NotFound {
			message: format!("Case {case_id} lookup did not report a jurisdiction."),
		})
	}

	fn record(&self, case_id: CaseId, outcome: RecordOutcome) {
		self.tally.lock().unwrap_or_else(|err| err.into_inner()).push((case_id, outcome));
	}

	fn drain_into(&self, result: &mut MigrationRunResult) {
		let mut tally = self.tally.lock().unwrap_or_else(|err| err.into_inner());

		for (case_id, outcome) in tally.drain(..) {
			result.record(case_id, outcome);
		}
	}
}

pub struct MigrationOrchestrator {
	collaborators: Collaborators,
	options: RunOptions,
}
impl MigrationOrchestrator {
	pub fn new(collaborators: Collaborators, options: RunOptions) -> Self {
		Self { collaborators, options }
	}

	/// Executes one run. Returns `Err` only for configuration problems, authentication failure,
	/// or a failed sizing probe; every per-record problem is reported inside the result.
	pub async fn run(&self, request: MigrationRequest) -> Result<MigrationRunResult> {
		let plan = self.validate(&request)?;
		let definition = request.definition.clone();
		let mut result = MigrationRunResult::empty(Uuid::new_v4(), &definition.id, definition.mode);

		tracing::info!(
			run_id = %result.run_id,
			migration_id = %definition.id,
			mode = definition.mode.as_str(),
			case_type = %plan.case_type,
			"Migration run starting."
		);

		if let Some(case_ids) = &plan.case_ids
			&& case_ids.is_empty()
		{
			tracing::info!(run_id = %result.run_id, "No case ids supplied. Nothing to migrate.");

			return Ok(self.finish(result));
		}

		let user_token =
			self.collaborators.identity.authenticate(&plan.username, &plan.password).await?;
		let user_id = self.collaborators.identity.user_id(&user_token).await?;
		let worker = Arc::new(Worker {
			collaborators: self.collaborators.clone(),
			updates: CaseUpdateClient::new(
				self.collaborators.store.clone(),
				self.collaborators.tokens.clone(),
			),
			definition: definition.clone(),
			ctx: UpdateContext {
				user_token,
				user_id,
				case_type: plan.case_type.clone(),
				event_id: request.event.id.clone(),
				event_summary: request.event.summary.clone(),
				event_description: request.event.description.clone(),
				migration_id: definition.id.clone(),
			},
			fallback_jurisdiction: request.jurisdiction.clone(),
			tally: Mutex::new(Vec::new()),
		});

		match plan.case_ids {
			Some(case_ids) => self.run_case_ids(&worker, case_ids, &mut result).await,
			None => self.run_query(&worker, &mut result).await?,
		}

		Ok(self.finish(result))
	}

	fn validate(&self, request: &MigrationRequest) -> Result<RunPlan> {
		if request.definition.id.trim().is_empty() {
			return Err(Error::configuration("Migration id must be non-blank."));
		}

		let case_type = match request.case_type.as_deref().map(str::trim) {
			None | Some("") => return Err(Error::configuration("Case type must be provided.")),
			Some(case_type) if case_type.contains(',') =>
				return Err(Error::configuration(format!(
					"Exactly one case type may be migrated per run, got {case_type:?}."
				))),
			Some(case_type) => case_type.to_string(),
		};
		let username = non_blank(request.username.as_deref())
			.ok_or_else(|| Error::configuration("Identity username must be set."))?;
		let password = non_blank(request.password.as_deref())
			.ok_or_else(|| Error::configuration("Identity password must be set."))?;

		if request.event.id.trim().is_empty() {
			return Err(Error::configuration("Event id must be non-blank."));
		}
		if self.options.page_size == 0 {
			return Err(Error::configuration("Page size must be greater than zero."));
		}
		if let ExecutionStrategy::Parallel { workers: 0 } = self.options.strategy {
			return Err(Error::configuration("Parallel runs need at least one worker."));
		}

		let case_ids = match &request.target {
			MigrationTarget::Query => None,
			MigrationTarget::CaseIds(raw) => Some(parse_case_ids(raw)?),
		};

		Ok(RunPlan { case_type, username, password, case_ids })
	}

	async fn run_query(
		&self,
		worker: &Arc<Worker>,
		result: &mut MigrationRunResult,
	) -> Result<()> {
		let fetcher = CursorFetcher::new(
			self.collaborators.store.clone(),
			self.collaborators.tokens.clone(),
			worker.definition.query.clone(),
		);
		let user_token = worker.ctx.user_token.as_str();
		let case_type = worker.ctx.case_type.as_str();
		let page_size = self.options.page_size;
		let total = fetcher.search_results_size(user_token, case_type).await?;

		result.total = total;

		tracing::info!(run_id = %result.run_id, total, "Candidate cases found.");

		if total == 0 {
			return Ok(());
		}

		let mut attempted = 0_usize;
		let mut seen = 0_u64;
		let mut page = match fetcher.fetch_first_page(user_token, case_type, page_size).await {
			Ok(page) => page,
			Err(err) => {
				interrupt(result, &err);

				return Ok(());
			},
		};
		let mut page_number = 1_u32;

		loop {
			let last_page = page.is_last(page_size);
			let Some(cursor_key) = page.cursor_key else {
				break;
			};

			seen += page.cases.len() as u64;

			if seen > result.total {
				tracing::info!(
					run_id = %result.run_id,
					probed = result.total,
					seen,
					"Candidates grew after sizing."
				);

				result.total = seen;
			}

			let items = page
				.cases
				.into_iter()
				.map(|case| WorkItem { case_id: case.id, jurisdiction: Some(case.jurisdiction) })
				.collect::<Vec<_>>();
			let items = self.take_within_limit(items, attempted);
			let reached_limit = self.limit_reached(attempted + items.len());

			tracing::debug!(
				run_id = %result.run_id,
				page = page_number,
				records = items.len(),
				"Processing page."
			);

			attempted += items.len();

			self.process_page(worker, items).await;

			if reached_limit {
				tracing::info!(run_id = %result.run_id, attempted, "Processing limit reached.");

				break;
			}
			if last_page {
				break;
			}

			let next = fetcher.fetch_next_page(user_token, case_type, cursor_key, page_size).await;

			page = match next {
				Ok(page) => page,
				Err(err) => {
					interrupt(result, &err);

					break;
				},
			};
			page_number += 1;
		}

		worker.drain_into(result);

		Ok(())
	}

	async fn run_case_ids(
		&self,
		worker: &Arc<Worker>,
		case_ids: Vec<CaseId>,
		result: &mut MigrationRunResult,
	) {
		let items = case_ids
			.into_iter()
			.map(|case_id| WorkItem { case_id, jurisdiction: None })
			.collect::<Vec<_>>();
		let items = self.take_within_limit(items, 0);

		result.total = items.len() as u64;

		for chunk in items.chunks(self.options.page_size as usize) {
			self.process_page(worker, chunk.to_vec()).await;
		}

		worker.drain_into(result);
	}

	async fn process_page(&self, worker: &Arc<Worker>, items: Vec<WorkItem>) {
		match self.options.strategy {
			ExecutionStrategy::Sequential =>
				for item in items {
					worker.process(item).await;
				},
			ExecutionStrategy::Parallel { workers } =>
				process_parallel(worker, items, workers).await,
		}
	}

	fn take_within_limit(&self, mut items: Vec<WorkItem>, attempted: usize) -> Vec<WorkItem> {
		if let Some(max_cases) = self.options.max_cases {
			items.truncate(max_cases.saturating_sub(attempted));
		}

		items
	}

	fn limit_reached(&self, attempted: usize) -> bool {
		self.options.max_cases.map(|max_cases| attempted >= max_cases).unwrap_or(false)
	}

	fn finish(&self, mut result: MigrationRunResult) -> MigrationRunResult {
		result.completed_at = OffsetDateTime::now_utc();

		tracing::info!(
			run_id = %result.run_id,
			migration_id = %result.migration_id,
			total = result.total,
			processed = result.processed(),
			migrated = result.migrated_ids.len(),
			failed = result.failed_ids.len(),
			skipped = result.skipped_ids.len(),
			elapsed_ms = result.elapsed().whole_milliseconds() as i64,
			"Migration run finished."
		);
		tracing::info!("{result}");

		result
	}
}

/// Fans a page out to at most `workers` tasks and waits for all of them.
async fn process_parallel(worker: &Arc<Worker>, items: Vec<WorkItem>, workers: usize) {
	let permits = Arc::new(Semaphore::new(workers.max(1)));
	let mut handles = Vec::with_capacity(items.len());

	for item in items {
		let case_id = item.case_id;
		let permit = match permits.clone().acquire_owned().await {
			Ok(permit) => permit,
			Err(err) => {
				tracing::error!(case_id, error = %err, "Worker pool closed.");
				worker.record(case_id, RecordOutcome::Failed);

				continue;
			},
		};
		let worker = worker.clone();

		handles.push((
			case_id,
			tokio::spawn(async move {
				let _permit = permit;

				worker.process(item).await
			}),
		));
	}

	for (case_id, handle) in handles {
		if let Err(err) = handle.await {
			let err = Error::Worker { message: err.to_string() };

			tracing::error!(case_id, error = %err, "Case worker aborted.");
			worker.record(case_id, RecordOutcome::Failed);
		}
	}
}

fn interrupt(result: &mut MigrationRunResult, err: &Error) {
	tracing::error!(run_id = %result.run_id, error = %err, "Search failed. Stopping the run.");

	result.interruption = Some(err.to_string());
}

fn non_blank(value: Option<&str>) -> Option<String> {
	value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

fn parse_case_ids(raw: &[String]) -> Result<Vec<CaseId>> {
	let mut ids = Vec::with_capacity(raw.len());

	for value in raw {
		let value = value.trim();

		if value.is_empty() {
			continue;
		}

		let id = value.parse::<CaseId>().map_err(|_| {
			Error::configuration(format!("Case id {value:?} is not a numeric case reference."))
		})?;

		if !ids.contains(&id) {
			ids.push(id);
		}
	}

	Ok(ids)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn case_ids_are_parsed_and_deduplicated() {
		let raw = vec!["101".to_string(), " 102 ".to_string(), "101".to_string(), String::new()];

		assert_eq!(parse_case_ids(&raw).expect("parse failed"), vec![101, 102]);
	}

	#[test]
	fn non_numeric_case_id_is_configuration_error() {
		let err = parse_case_ids(&["abc".to_string()]).expect_err("Expected error.");

		assert!(err.is_configuration());
	}
}
