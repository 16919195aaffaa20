use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use casemig_config::Error;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let table = root
		.as_table_mut()
		.expect("Template config must be a table.")
		.get_mut(section)
		.and_then(Value::as_table_mut)
		.expect("Template config must include the requested section.");

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("casemig_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> casemig_config::Result<casemig_config::Config> {
	let path = write_temp_config(payload);
	let result = casemig_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

#[test]
fn loads_sample_config_with_defaults() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Sample config should load.");

	assert_eq!(cfg.migration.case_type, "CARE_SUPERVISION_EPO");
	assert_eq!(cfg.migration.event_summary, "Migrate case");
	assert_eq!(cfg.idam.token_path, "/o/token");
	assert_eq!(cfg.s2s.lease_path, "/testing-support/lease");
	assert!(cfg.migration.case_ids.is_none());
	assert!(cfg.migration.jurisdiction.is_none());
}

#[test]
fn blank_credentials_are_normalized_to_none() {
	let payload = sample_toml_with("idam", "password", Value::String("   ".to_string()));
	let cfg = load_payload(payload).expect("Blank password is resolved at run time.");

	assert!(cfg.idam.password.is_none());
	assert_eq!(cfg.idam.username.as_deref(), Some("caseworker@example.com"));
}

#[test]
fn zero_page_size_is_rejected() {
	let payload = sample_toml_with("migration", "page_size", Value::Integer(0));
	let err = load_payload(payload).expect_err("Expected page_size validation error.");
	let message = err.to_string();

	assert!(
		message.contains("migration.page_size must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn parallel_runs_need_workers() {
	let payload = sample_toml_with("migration", "max_workers", Value::Integer(0));
	let payload = {
		let mut root: Value = toml::from_str(&payload).expect("Failed to parse payload.");

		root.get_mut("migration")
			.and_then(Value::as_table_mut)
			.expect("Payload must include [migration].")
			.insert("parallel".to_string(), Value::Boolean(true));

		toml::to_string(&root).expect("Failed to render payload.")
	};
	let err = load_payload(payload).expect_err("Expected max_workers validation error.");

	assert!(err.to_string().contains("migration.max_workers"));
}

#[test]
fn missing_event_id_is_reported_by_key() {
	let payload = sample_toml_with("migration", "event_id", Value::String(String::new()));
	let err = load_payload(payload).expect_err("Expected missing setting error.");

	match err {
		Error::MissingSetting { key } => assert_eq!(key, "migration.event_id"),
		other => panic!("Unexpected error: {other}"),
	}
}

#[test]
fn explicit_case_ids_are_trimmed() {
	let payload = sample_toml_with(
		"migration",
		"case_ids",
		Value::Array(vec![
			Value::String(" 1583841721773828 ".to_string()),
			Value::String(String::new()),
		]),
	);
	let cfg = load_payload(payload).expect("Case id list should load.");

	assert_eq!(cfg.migration.case_ids, Some(vec!["1583841721773828".to_string()]));
}

#[test]
fn non_string_default_headers_are_rejected() {
	let mut headers = toml::map::Map::new();

	headers.insert("experimental".to_string(), Value::Boolean(true));

	let payload = sample_toml_with("ccd", "default_headers", Value::Table(headers));
	let err = load_payload(payload).expect_err("Expected header validation error.");

	assert!(err.to_string().contains("ccd.default_headers.experimental must be a string."));
}

#[test]
fn unreadable_path_reports_read_error() {
	let err = casemig_config::load(&PathBuf::from("/nonexistent/casemig.toml"))
		.expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
}

#[test]
fn rename_entries_are_loaded() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Sample config should load.");

	assert_eq!(cfg.renames.len(), 1);
	assert_eq!(cfg.renames[0].from, "applicantName");
	assert_eq!(cfg.renames[0].to, "applicantFullName");
}

#[test]
fn rename_onto_itself_is_rejected() {
	let payload = SAMPLE_CONFIG_TEMPLATE_TOML
		.replace(r#"to   = "applicantFullName""#, r#"to   = "applicantName""#);
	let err = load_payload(payload).expect_err("Expected rename validation error.");

	assert!(err.to_string().contains("renames[0]"));
}
