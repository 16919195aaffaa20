pub mod ccd;
pub mod idam;
pub mod s2s;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client, Response,
	header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Map, Value};

/// Header carrying the service-to-service token. Header names are matched case-insensitively.
pub const SERVICE_AUTHORIZATION: &str = "serviceauthorization";

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Builds the header pair every case store call carries: the caseworker bearer token and the
/// service-to-service token, plus any configured defaults.
pub fn auth_headers(
	user_token: &str,
	service_token: &str,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, bearer(user_token).parse()?);
	headers.insert(HeaderName::from_static(SERVICE_AUTHORIZATION), bearer(service_token).parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: format!("Default header {key} must be a string."),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, HeaderValue::from_str(raw)?);
	}

	Ok(headers)
}

fn bearer(token: &str) -> String {
	if token.starts_with("Bearer ") { token.to_string() } else { format!("Bearer {token}") }
}

fn client(timeout_ms: u64) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?)
}

/// Turns a non-success response into [`Error::Status`], keeping a bounded slice of the body so
/// store-side rejection reasons reach the logs.
async fn check_status(res: Response) -> Result<Response> {
	let status = res.status();

	if status.is_success() {
		return Ok(res);
	}

	let url = res.url().to_string();
	let body = res.text().await.unwrap_or_default();
	let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();

	Err(Error::Status { url, status: status.as_u16(), body })
}

fn join_url(base: &str, path: &str) -> String {
	format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
