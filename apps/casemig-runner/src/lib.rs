use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use casemig_config::Config;
use casemig_domain::{MigrationDefinition, MigrationRunResult};
use casemig_service::{
	Collaborators, EventSettings, ExecutionStrategy, MigrationOrchestrator, MigrationRegistry,
	MigrationRequest, MigrationTarget, RunOptions,
};

#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Run this registered migration instead of `migration.id`.
	#[arg(long, short = 'm', value_name = "ID")]
	pub migration: Option<String>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = casemig_config::load(&args.config)?;

	init_tracing(&config);

	let registry = build_registry(&config)?;
	let migration_id = args.migration.as_deref().unwrap_or(&config.migration.id);
	let definition = registry.get(migration_id)?;
	let orchestrator =
		MigrationOrchestrator::new(Collaborators::http(&config), run_options(&config));
	let result = orchestrator.run(migration_request(&config, definition)).await?;

	println!("{result}");

	ensure_clean(&result)
}

fn init_tracing(config: &Config) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(config.service.log_level.as_str()));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn build_registry(config: &Config) -> casemig_service::Result<MigrationRegistry> {
	let mut registry = MigrationRegistry::new();

	for rename in &config.renames {
		registry.register_rename(&rename.id, &rename.from, &rename.to)?;

		tracing::debug!(
			migration_id = %rename.id,
			from = %rename.from,
			to = %rename.to,
			"Registered rename migration."
		);
	}

	Ok(registry)
}

pub fn run_options(config: &Config) -> RunOptions {
	let strategy = if config.migration.parallel {
		ExecutionStrategy::Parallel { workers: config.migration.max_workers }
	} else {
		ExecutionStrategy::Sequential
	};

	RunOptions {
		page_size: config.migration.page_size,
		strategy,
		max_cases: config.migration.max_cases,
	}
}

pub fn migration_request(
	config: &Config,
	definition: Arc<MigrationDefinition>,
) -> MigrationRequest {
	let target = match &config.migration.case_ids {
		Some(case_ids) => MigrationTarget::CaseIds(case_ids.clone()),
		None => MigrationTarget::Query,
	};

	MigrationRequest {
		definition,
		case_type: Some(config.migration.case_type.clone()),
		jurisdiction: config.migration.jurisdiction.clone(),
		target,
		username: config.idam.username.clone(),
		password: config.idam.password.clone(),
		event: EventSettings {
			id: config.migration.event_id.clone(),
			summary: config.migration.event_summary.clone(),
			description: config.migration.event_description.clone(),
		},
	}
}

/// Fails the process when any record failed or paging stopped early.
pub fn ensure_clean(result: &MigrationRunResult) -> color_eyre::Result<()> {
	if let Some(reason) = &result.interruption {
		return Err(eyre::eyre!("Migration {} was interrupted: {reason}", result.migration_id));
	}
	if !result.failed_ids.is_empty() {
		return Err(eyre::eyre!(
			"Migration {} failed for {} case(s).",
			result.migration_id,
			result.failed_ids.len()
		));
	}

	Ok(())
}
