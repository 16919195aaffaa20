//! Case data store adapter.
//!
//! Covers the four calls the migration engine needs: `searchCases`, the event-trigger start
//! that hands out an optimistic-lock token, the event submit that consumes it, and the v2
//! single case lookup.

use reqwest::header::{HeaderName, HeaderValue};
use serde_json::{Map, Value};

use casemig_domain::{
	CaseData, CaseId, CaseRecord,
	case::{data_from_json, data_to_json},
};

use crate::{Error, Result};

const EXPERIMENTAL_HEADER: &str = "experimental";

/// Caller identity for one store call. The service token must be freshly leased per call.
#[derive(Debug, Clone, Copy)]
pub struct CallAuth<'a> {
	pub user_token: &'a str,
	pub service_token: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
	pub total: u64,
	pub cases: Vec<CaseRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StartedEvent {
	pub token: String,
	pub case: CaseRecord,
}

/// Address of an event on a single case.
#[derive(Debug, Clone, Copy)]
pub struct EventTarget<'a> {
	pub user_id: &'a str,
	pub jurisdiction: &'a str,
	pub case_type: &'a str,
	pub case_id: CaseId,
	pub event_id: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct EventDetails<'a> {
	pub summary: &'a str,
	pub description: &'a str,
}

pub async fn search(
	cfg: &casemig_config::Ccd,
	auth: CallAuth<'_>,
	case_type: &str,
	query: &Value,
) -> Result<SearchResult> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::join_url(&cfg.api_base, "/searchCases");
	let res = client
		.post(url)
		.query(&[("ctid", case_type)])
		.headers(crate::auth_headers(auth.user_token, auth.service_token, &cfg.default_headers)?)
		.json(query)
		.send()
		.await?;
	let json: Value = crate::check_status(res).await?.json().await?;
	let result = parse_search_response(&json, case_type)?;

	tracing::debug!(
		case_type,
		total = result.total,
		hits = result.cases.len(),
		"Case search returned."
	);

	Ok(result)
}

pub async fn start_event(
	cfg: &casemig_config::Ccd,
	auth: CallAuth<'_>,
	target: EventTarget<'_>,
) -> Result<StartedEvent> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::join_url(
		&cfg.api_base,
		&format!("{}/event-triggers/{}/token", case_path(&target), target.event_id),
	);
	let res = client
		.get(url)
		.headers(crate::auth_headers(auth.user_token, auth.service_token, &cfg.default_headers)?)
		.send()
		.await?;
	let json: Value = crate::check_status(res).await?.json().await?;

	parse_start_response(&json, target.case_type)
}

pub async fn submit_event(
	cfg: &casemig_config::Ccd,
	auth: CallAuth<'_>,
	target: EventTarget<'_>,
	details: EventDetails<'_>,
	event_token: &str,
	data: CaseData,
) -> Result<CaseRecord> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::join_url(&cfg.api_base, &format!("{}/events", case_path(&target)));
	let body = submit_body(&target, details, event_token, data);
	let res = client
		.post(url)
		.headers(crate::auth_headers(auth.user_token, auth.service_token, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = crate::check_status(res).await?.json().await?;

	parse_case_details(&json, target.case_type)
}

pub async fn get_case(
	cfg: &casemig_config::Ccd,
	auth: CallAuth<'_>,
	case_id: CaseId,
) -> Result<CaseRecord> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::join_url(&cfg.api_base, &format!("/cases/{case_id}"));
	let mut headers =
		crate::auth_headers(auth.user_token, auth.service_token, &cfg.default_headers)?;

	headers.insert(HeaderName::from_static(EXPERIMENTAL_HEADER), HeaderValue::from_static("true"));

	let res = client.get(url).headers(headers).send().await?;
	let json: Value = crate::check_status(res).await?.json().await?;

	parse_case_details(&json, "")
}

fn case_path(target: &EventTarget<'_>) -> String {
	format!(
		"/caseworkers/{}/jurisdictions/{}/case-types/{}/cases/{}",
		target.user_id, target.jurisdiction, target.case_type, target.case_id
	)
}

fn submit_body(
	target: &EventTarget<'_>,
	details: EventDetails<'_>,
	event_token: &str,
	data: CaseData,
) -> Value {
	serde_json::json!({
		"data": Value::Object(data_to_json(data)),
		"event": {
			"id": target.event_id,
			"summary": details.summary,
			"description": details.description,
		},
		"event_token": event_token,
		"ignore_warning": false,
	})
}

fn parse_search_response(json: &Value, case_type: &str) -> Result<SearchResult> {
	let total = json.get("total").and_then(Value::as_u64).ok_or_else(|| Error::InvalidResponse {
		message: "Search response is missing total.".to_string(),
	})?;
	let cases = match json.get("cases") {
		None | Some(Value::Null) => Vec::new(),
		Some(Value::Array(items)) => items
			.iter()
			.map(|item| parse_case_details(item, case_type))
			.collect::<Result<Vec<_>>>()?,
		Some(_) =>
			return Err(Error::InvalidResponse {
				message: "Search response cases must be an array.".to_string(),
			}),
	};

	Ok(SearchResult { total, cases })
}

fn parse_start_response(json: &Value, case_type: &str) -> Result<StartedEvent> {
	let token = json
		.get("token")
		.and_then(Value::as_str)
		.filter(|token| !token.is_empty())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Start event response is missing token.".to_string(),
		})?;
	let details = json.get("case_details").ok_or_else(|| Error::InvalidResponse {
		message: "Start event response is missing case_details.".to_string(),
	})?;

	Ok(StartedEvent { token: token.to_string(), case: parse_case_details(details, case_type)? })
}

/// Accepts both the v1 (`case_type_id`, `case_data`) and v2 (`case_type`, `data`) shapes.
fn parse_case_details(json: &Value, fallback_case_type: &str) -> Result<CaseRecord> {
	let id = match json.get("id").or_else(|| json.get("reference")) {
		Some(Value::Number(number)) => number.as_i64(),
		Some(Value::String(text)) => text.parse::<CaseId>().ok(),
		_ => None,
	}
	.ok_or_else(|| Error::InvalidResponse {
		message: "Case details are missing a numeric id.".to_string(),
	})?;
	let jurisdiction = json.get("jurisdiction").and_then(Value::as_str).unwrap_or_default();
	let case_type = json
		.get("case_type_id")
		.or_else(|| json.get("case_type"))
		.and_then(Value::as_str)
		.unwrap_or(fallback_case_type);
	let data = match json.get("case_data").or_else(|| json.get("data")) {
		Some(Value::Object(map)) => data_from_json(map.clone()),
		None | Some(Value::Null) => data_from_json(Map::new()),
		Some(_) =>
			return Err(Error::InvalidResponse {
				message: format!("Case {id} data must be an object."),
			}),
	};
	let version = match json.get("version") {
		Some(Value::Number(number)) => Some(number.to_string()),
		Some(Value::String(text)) => Some(text.clone()),
		_ => None,
	};

	Ok(CaseRecord {
		id,
		jurisdiction: jurisdiction.to_string(),
		case_type: case_type.to_string(),
		data,
		version,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn target() -> EventTarget<'static> {
		EventTarget {
			user_id: "u1",
			jurisdiction: "PUBLICLAW",
			case_type: "CARE",
			case_id: 1_583_841_721_773_828,
			event_id: "migrateCase",
		}
	}

	#[test]
	fn parses_search_hits_with_source_subset() {
		let json = serde_json::json!({
			"total": 2,
			"cases": [
				{ "id": 1_583_841_721_773_828_i64, "jurisdiction": "PUBLICLAW", "case_data": {} },
				{ "reference": "1583841721773829", "jurisdiction": "PUBLICLAW" }
			]
		});
		let result = parse_search_response(&json, "CARE").expect("parse failed");

		assert_eq!(result.total, 2);
		assert_eq!(result.cases[1].id, 1_583_841_721_773_829);
		assert_eq!(result.cases[1].case_type, "CARE");
	}

	#[test]
	fn zero_total_without_cases_is_empty() {
		let result =
			parse_search_response(&serde_json::json!({ "total": 0 }), "CARE").expect("parse");

		assert!(result.cases.is_empty());
	}

	#[test]
	fn start_response_requires_token() {
		let json = serde_json::json!({
			"case_details": { "id": 1, "jurisdiction": "PUBLICLAW", "case_type_id": "CARE" }
		});

		assert!(parse_start_response(&json, "CARE").is_err());
	}

	#[test]
	fn start_response_carries_fresh_snapshot() {
		let json = serde_json::json!({
			"token": "tkn",
			"event_id": "migrateCase",
			"case_details": {
				"id": 7,
				"jurisdiction": "PUBLICLAW",
				"case_type_id": "CARE",
				"version": 4,
				"case_data": { "applicantName": "Jo", "dateSubmitted": "2021-03-04" }
			}
		});
		let started = parse_start_response(&json, "CARE").expect("parse failed");

		assert_eq!(started.token, "tkn");
		assert_eq!(started.case.version.as_deref(), Some("4"));
		assert_eq!(started.case.data.len(), 2);
	}

	#[test]
	fn submit_body_echoes_event_and_token() {
		let body = submit_body(
			&target(),
			EventDetails { summary: "Migrate case", description: "Rename field" },
			"tkn",
			CaseData::new(),
		);

		assert_eq!(body["event"]["id"], "migrateCase");
		assert_eq!(body["event_token"], "tkn");
		assert_eq!(body["ignore_warning"], false);
		assert_eq!(body["data"], serde_json::json!({}));
	}

	#[test]
	fn case_path_addresses_single_case() {
		assert_eq!(
			case_path(&target()),
			"/caseworkers/u1/jurisdictions/PUBLICLAW/case-types/CARE/cases/1583841721773828"
		);
	}
}
