pub mod cursor;
pub mod orchestrator;
pub mod registry;
pub mod update;

mod error;

pub use casemig_providers::ccd::{CallAuth, EventDetails, EventTarget, SearchResult, StartedEvent};
pub use cursor::{CURSOR_SORT_FIELD, CursorFetcher, SearchPage};
pub use error::{Error, Result};
pub use orchestrator::{
	EventSettings, ExecutionStrategy, MigrationOrchestrator, MigrationRequest, MigrationTarget,
	RunOptions,
};
pub use registry::{MigrationRegistry, rename_field};
pub use update::{CaseUpdateClient, UpdateContext, UpdateOutcome};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use casemig_domain::{CaseData, CaseId, CaseRecord};
use casemig_providers::{ccd, idam, s2s};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the caseworker bearer credential for a run.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	fn authenticate<'a>(
		&'a self,
		username: &'a str,
		password: &'a str,
	) -> BoxFuture<'a, Result<String>>;

	fn user_id<'a>(&'a self, user_token: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Issues service-to-service credentials. Called once per store request; never cached.
pub trait ServiceTokenGenerator
where
	Self: Send + Sync,
{
	fn generate(&self) -> BoxFuture<'_, Result<String>>;
}

/// The remote case store and its search index.
pub trait CaseStore
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		auth: CallAuth<'a>,
		case_type: &'a str,
		query: &'a Value,
	) -> BoxFuture<'a, Result<SearchResult>>;

	fn start_update<'a>(
		&'a self,
		auth: CallAuth<'a>,
		target: EventTarget<'a>,
	) -> BoxFuture<'a, Result<StartedEvent>>;

	fn submit_update<'a>(
		&'a self,
		auth: CallAuth<'a>,
		target: EventTarget<'a>,
		details: EventDetails<'a>,
		event_token: &'a str,
		data: CaseData,
	) -> BoxFuture<'a, Result<CaseRecord>>;

	fn get_case<'a>(
		&'a self,
		auth: CallAuth<'a>,
		case_id: CaseId,
	) -> BoxFuture<'a, Result<CaseRecord>>;
}

/// Remote collaborators shared by every component of a run.
#[derive(Clone)]
pub struct Collaborators {
	pub identity: Arc<dyn IdentityProvider>,
	pub store: Arc<dyn CaseStore>,
	pub tokens: Arc<dyn ServiceTokenGenerator>,
}
impl Collaborators {
	pub fn http(cfg: &casemig_config::Config) -> Self {
		Self {
			identity: Arc::new(HttpIdentity { cfg: cfg.idam.clone() }),
			store: Arc::new(HttpCaseStore { cfg: cfg.ccd.clone() }),
			tokens: Arc::new(HttpServiceTokens { cfg: cfg.s2s.clone() }),
		}
	}
}

pub struct HttpIdentity {
	cfg: casemig_config::Idam,
}

pub struct HttpServiceTokens {
	cfg: casemig_config::S2s,
}

pub struct HttpCaseStore {
	cfg: casemig_config::Ccd,
}

impl IdentityProvider for HttpIdentity {
	fn authenticate<'a>(
		&'a self,
		username: &'a str,
		password: &'a str,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			if username.trim().is_empty() || password.trim().is_empty() {
				return Err(Error::configuration("Identity username and password must be set."));
			}

			Ok(idam::authenticate(&self.cfg, username, password).await?)
		})
	}

	fn user_id<'a>(&'a self, user_token: &'a str) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(idam::user_id(&self.cfg, user_token).await?) })
	}
}

impl ServiceTokenGenerator for HttpServiceTokens {
	fn generate(&self) -> BoxFuture<'_, Result<String>> {
		Box::pin(async move { Ok(s2s::lease(&self.cfg).await?) })
	}
}

impl CaseStore for HttpCaseStore {
	fn search<'a>(
		&'a self,
		auth: CallAuth<'a>,
		case_type: &'a str,
		query: &'a Value,
	) -> BoxFuture<'a, Result<SearchResult>> {
		Box::pin(async move { Ok(ccd::search(&self.cfg, auth, case_type, query).await?) })
	}

	fn start_update<'a>(
		&'a self,
		auth: CallAuth<'a>,
		target: EventTarget<'a>,
	) -> BoxFuture<'a, Result<StartedEvent>> {
		Box::pin(async move { Ok(ccd::start_event(&self.cfg, auth, target).await?) })
	}

	fn submit_update<'a>(
		&'a self,
		auth: CallAuth<'a>,
		target: EventTarget<'a>,
		details: EventDetails<'a>,
		event_token: &'a str,
		data: CaseData,
	) -> BoxFuture<'a, Result<CaseRecord>> {
		Box::pin(async move {
			Ok(ccd::submit_event(&self.cfg, auth, target, details, event_token, data).await?)
		})
	}

	fn get_case<'a>(
		&'a self,
		auth: CallAuth<'a>,
		case_id: CaseId,
	) -> BoxFuture<'a, Result<CaseRecord>> {
		Box::pin(async move { Ok(ccd::get_case(&self.cfg, auth, case_id).await?) })
	}
}
