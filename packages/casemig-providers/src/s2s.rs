use crate::{Error, Result};

/// Leases a fresh service-to-service token for the configured microservice.
pub async fn lease(cfg: &casemig_config::S2s) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = crate::join_url(&cfg.api_base, &cfg.lease_path);
	let body = serde_json::json!({ "microservice": cfg.microservice });
	let res = client.post(url).json(&body).send().await?;
	let text = crate::check_status(res).await?.text().await?;

	parse_lease(&text)
}

fn parse_lease(text: &str) -> Result<String> {
	let token = text.trim().trim_matches('"');

	if token.is_empty() {
		return Err(Error::InvalidResponse { message: "Lease response is empty.".to_string() });
	}

	Ok(token.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_whitespace_and_quotes() {
		assert_eq!(parse_lease(" \"eyJhbGciOi\"\n").expect("parse failed"), "eyJhbGciOi");
		assert!(parse_lease("  ").is_err());
	}
}
