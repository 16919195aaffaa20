use reqwest::header::AUTHORIZATION;
use serde_json::Value;

use crate::{Error, Result};

/// Exchanges caseworker credentials for a bearer token with the password grant.
pub async fn authenticate(
	cfg: &casemig_config::Idam,
	username: &str,
	password: &str,
) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::join_url(&cfg.api_base, &cfg.token_path);
	let form = [
		("grant_type", "password"),
		("username", username),
		("password", password),
		("client_id", cfg.client_id.as_str()),
		("client_secret", cfg.client_secret.as_str()),
		("redirect_uri", cfg.redirect_uri.as_str()),
		("scope", cfg.scope.as_str()),
	];
	let res = client.post(url).form(&form).send().await?;
	let json: Value = crate::check_status(res).await?.json().await?;

	parse_token_response(&json)
}

pub async fn user_id(cfg: &casemig_config::Idam, user_token: &str) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::join_url(&cfg.api_base, &cfg.user_info_path);
	let res = client.get(url).header(AUTHORIZATION, format!("Bearer {user_token}")).send().await?;
	let json: Value = crate::check_status(res).await?.json().await?;

	parse_user_info(&json)
}

fn parse_token_response(json: &Value) -> Result<String> {
	json.get("access_token")
		.and_then(Value::as_str)
		.filter(|token| !token.is_empty())
		.map(str::to_string)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Token response is missing access_token.".to_string(),
		})
}

fn parse_user_info(json: &Value) -> Result<String> {
	for key in ["uid", "id", "sub"] {
		if let Some(id) = json.get(key).and_then(Value::as_str).filter(|id| !id.is_empty()) {
			return Ok(id.to_string());
		}
	}

	Err(Error::InvalidResponse { message: "User info response is missing uid.".to_string() })
}
