use casemig_domain::{QueryError, TransformError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Invalid query: {0}")]
	Query(#[from] QueryError),
	#[error("Search error: {message}")]
	Search { message: String },
	#[error("Transport error: {message}")]
	Transport { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error(transparent)]
	Transform(#[from] TransformError),
	#[error("Worker error: {message}")]
	Worker { message: String },
}
impl Error {
	pub fn configuration(message: impl Into<String>) -> Self {
		Self::Configuration { message: message.into() }
	}

	pub fn is_configuration(&self) -> bool {
		matches!(self, Self::Configuration { .. })
	}
}

impl From<casemig_providers::Error> for Error {
	fn from(err: casemig_providers::Error) -> Self {
		match err {
			casemig_providers::Error::Status { status: 404, .. } =>
				Self::NotFound { message: err.to_string() },
			casemig_providers::Error::InvalidConfig { message } => Self::Configuration { message },
			other => Self::Transport { message: other.to_string() },
		}
	}
}
