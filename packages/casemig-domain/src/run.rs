use std::fmt::{self, Display, Formatter};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{case::CaseId, migration::MigrationMode};

/// Terminal state of one record in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
	Submitted,
	Skipped,
	Failed,
}

/// Outcome of a single migration run. Built by the orchestrator and handed back read-only.
#[derive(Debug, Clone)]
pub struct MigrationRunResult {
	pub run_id: Uuid,
	pub migration_id: String,
	pub mode: MigrationMode,
	/// Candidate count reported by the sizing probe, or the explicit id count.
	pub total: u64,
	pub migrated_ids: Vec<CaseId>,
	pub failed_ids: Vec<CaseId>,
	pub skipped_ids: Vec<CaseId>,
	pub started_at: OffsetDateTime,
	pub completed_at: OffsetDateTime,
	/// Set when paging stopped early because a search failed after the run had started.
	pub interruption: Option<String>,
}
impl MigrationRunResult {
	pub fn empty(run_id: Uuid, migration_id: impl Into<String>, mode: MigrationMode) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			run_id,
			migration_id: migration_id.into(),
			mode,
			total: 0,
			migrated_ids: Vec::new(),
			failed_ids: Vec::new(),
			skipped_ids: Vec::new(),
			started_at: now,
			completed_at: now,
			interruption: None,
		}
	}

	pub fn record(&mut self, case_id: CaseId, outcome: RecordOutcome) {
		match outcome {
			RecordOutcome::Submitted => self.migrated_ids.push(case_id),
			RecordOutcome::Skipped => self.skipped_ids.push(case_id),
			RecordOutcome::Failed => self.failed_ids.push(case_id),
		}
	}

	pub fn processed(&self) -> usize {
		self.migrated_ids.len() + self.failed_ids.len() + self.skipped_ids.len()
	}

	pub fn elapsed(&self) -> Duration {
		self.completed_at - self.started_at
	}

	/// True when every attempted record either migrated or was skipped and paging completed.
	pub fn is_clean(&self) -> bool {
		self.failed_ids.is_empty() && self.interruption.is_none()
	}
}
impl Display for MigrationRunResult {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let verb = self.mode.done_verb();

		writeln!(
			f,
			"Migration {} ({}) run {} summary:",
			self.migration_id,
			self.mode.as_str(),
			self.run_id
		)?;
		writeln!(f, "  Total cases processed: {} of {}", self.processed(), self.total)?;
		writeln!(f, "  {verb}: {}", self.migrated_ids.len())?;
		writeln!(f, "  {verb} cases: {}", format_ids(&self.migrated_ids))?;
		writeln!(f, "  Failed: {}", self.failed_ids.len())?;
		writeln!(f, "  Failed cases: {}", format_ids(&self.failed_ids))?;
		writeln!(f, "  Skipped: {}", self.skipped_ids.len())?;

		if let Some(reason) = &self.interruption {
			writeln!(f, "  Interrupted: {reason}")?;
		}

		write!(f, "  Elapsed: {:.3}s", self.elapsed().as_seconds_f64())
	}
}

fn format_ids(ids: &[CaseId]) -> String {
	if ids.is_empty() {
		return "none".to_string();
	}

	let mut sorted = ids.to_vec();

	sorted.sort_unstable();

	sorted.iter().map(CaseId::to_string).collect::<Vec<_>>().join(", ")
}
