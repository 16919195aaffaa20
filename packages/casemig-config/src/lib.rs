mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Ccd, Config, Idam, Migration, RenameMigration, S2s, Service};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (key, value) in [
		("idam.api_base", &cfg.idam.api_base),
		("idam.client_id", &cfg.idam.client_id),
		("idam.redirect_uri", &cfg.idam.redirect_uri),
		("s2s.api_base", &cfg.s2s.api_base),
		("s2s.microservice", &cfg.s2s.microservice),
		("ccd.api_base", &cfg.ccd.api_base),
		("migration.event_id", &cfg.migration.event_id),
	] {
		if value.trim().is_empty() {
			return Err(Error::MissingSetting { key: key.to_string() });
		}
	}

	for (key, timeout_ms) in [
		("idam.timeout_ms", cfg.idam.timeout_ms),
		("s2s.timeout_ms", cfg.s2s.timeout_ms),
		("ccd.timeout_ms", cfg.ccd.timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Validation { message: format!("{key} must be greater than zero.") });
		}
	}

	if cfg.migration.page_size == 0 {
		return Err(Error::Validation {
			message: "migration.page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.migration.parallel && cfg.migration.max_workers == 0 {
		return Err(Error::Validation {
			message: "migration.max_workers must be greater than zero for parallel runs."
				.to_string(),
		});
	}
	if let Some(max_cases) = cfg.migration.max_cases
		&& max_cases == 0
	{
		return Err(Error::Validation {
			message: "migration.max_cases must be greater than zero when set.".to_string(),
		});
	}

	for (index, rename) in cfg.renames.iter().enumerate() {
		for (key, value) in [("id", &rename.id), ("from", &rename.from), ("to", &rename.to)] {
			if value.trim().is_empty() {
				return Err(Error::MissingSetting { key: format!("renames[{index}].{key}") });
			}
		}

		if rename.from.trim() == rename.to.trim() {
			return Err(Error::Validation {
				message: format!("renames[{index}] must move a field to a different name."),
			});
		}
	}

	for (key, value) in &cfg.ccd.default_headers {
		if !value.is_string() {
			return Err(Error::Validation {
				message: format!("ccd.default_headers.{key} must be a string."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.idam.username.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
		cfg.idam.username = None;
	}
	if cfg.idam.password.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false) {
		cfg.idam.password = None;
	}
	if cfg.migration.jurisdiction.as_deref().map(|value| value.trim().is_empty()).unwrap_or(false)
	{
		cfg.migration.jurisdiction = None;
	}
	if let Some(case_ids) = cfg.migration.case_ids.as_mut() {
		case_ids.retain(|id| !id.trim().is_empty());

		for id in case_ids.iter_mut() {
			*id = id.trim().to_string();
		}
	}

	cfg.migration.id = cfg.migration.id.trim().to_string();
	cfg.migration.case_type = cfg.migration.case_type.trim().to_string();
}
