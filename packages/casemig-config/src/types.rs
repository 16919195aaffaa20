use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub idam: Idam,
	pub s2s: S2s,
	pub ccd: Ccd,
	pub migration: Migration,
	/// Field renames registered as `id` and `id-rollback`.
	#[serde(default)]
	pub renames: Vec<RenameMigration>,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

/// Identity provider used to obtain the caseworker bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct Idam {
	pub api_base: String,
	#[serde(default = "default_token_path")]
	pub token_path: String,
	#[serde(default = "default_user_info_path")]
	pub user_info_path: String,
	pub client_id: String,
	pub client_secret: String,
	pub redirect_uri: String,
	#[serde(default = "default_scope")]
	pub scope: String,
	/// Blank values are normalized to `None` and rejected when the run starts.
	pub username: Option<String>,
	pub password: Option<String>,
	pub timeout_ms: u64,
}

/// Service-to-service token issuer. A new token is leased for every case store call.
#[derive(Debug, Clone, Deserialize)]
pub struct S2s {
	pub api_base: String,
	#[serde(default = "default_lease_path")]
	pub lease_path: String,
	pub microservice: String,
	pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ccd {
	pub api_base: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Migration {
	pub id: String,
	/// Exactly one case type. Comma-separated lists are rejected by the orchestrator.
	pub case_type: String,
	pub jurisdiction: Option<String>,
	pub event_id: String,
	#[serde(default = "default_event_summary")]
	pub event_summary: String,
	#[serde(default = "default_event_description")]
	pub event_description: String,
	#[serde(default = "default_page_size")]
	pub page_size: u32,
	#[serde(default)]
	pub parallel: bool,
	#[serde(default = "default_max_workers")]
	pub max_workers: usize,
	pub max_cases: Option<usize>,
	/// When present the cursor is bypassed and only these cases are processed.
	pub case_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameMigration {
	pub id: String,
	pub from: String,
	pub to: String,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_token_path() -> String {
	"/o/token".to_string()
}

fn default_user_info_path() -> String {
	"/o/userinfo".to_string()
}

fn default_scope() -> String {
	"openid profile roles".to_string()
}

fn default_lease_path() -> String {
	"/testing-support/lease".to_string()
}

fn default_event_summary() -> String {
	"Migrate case".to_string()
}

fn default_event_description() -> String {
	"Migrate case".to_string()
}

fn default_page_size() -> u32 {
	100
}

fn default_max_workers() -> usize {
	10
}
