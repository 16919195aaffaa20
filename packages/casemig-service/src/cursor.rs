//! Search-after pagination over the case index.
//!
//! Pages are ordered by the immutable case reference, so a cursor taken from the last record of
//! one page names an exact position: the next request starts strictly after it, and records
//! edited in the meantime are neither skipped nor revisited.

use std::sync::Arc;

use casemig_domain::{CaseId, CaseRecord, QueryClause, SearchContext, SortOrder};

use crate::{CallAuth, CaseStore, Error, Result, ServiceTokenGenerator};

pub const CURSOR_SORT_FIELD: &str = "reference.keyword";

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
	pub cases: Vec<CaseRecord>,
	pub total: u64,
	/// Hits the engine returned before records at or before the cursor were dropped.
	pub hits: usize,
	/// Sort key of the last record. `None` marks an exhausted cursor.
	pub cursor_key: Option<CaseId>,
}
impl SearchPage {
	pub fn is_exhausted(&self) -> bool {
		self.cursor_key.is_none()
	}

	/// True when no further page can exist: the cursor is exhausted or the engine returned fewer
	/// hits than requested.
	pub fn is_last(&self, page_size: u32) -> bool {
		self.is_exhausted() || self.hits < page_size as usize
	}
}

pub struct CursorFetcher {
	store: Arc<dyn CaseStore>,
	tokens: Arc<dyn ServiceTokenGenerator>,
	query: QueryClause,
}
impl CursorFetcher {
	pub fn new(
		store: Arc<dyn CaseStore>,
		tokens: Arc<dyn ServiceTokenGenerator>,
		query: QueryClause,
	) -> Self {
		Self { store, tokens, query }
	}

	/// Zero-size probe for the number of candidates.
	pub async fn search_results_size(&self, user_token: &str, case_type: &str) -> Result<u64> {
		let context = self.query.to_context(0, 0);

		Ok(self.search(user_token, case_type, &context).await?.total)
	}

	pub async fn fetch_first_page(
		&self,
		user_token: &str,
		case_type: &str,
		page_size: u32,
	) -> Result<SearchPage> {
		let context =
			self.query.to_context(page_size, 0).with_sort(CURSOR_SORT_FIELD, SortOrder::Asc);
		let result = self.search(user_token, case_type, &context).await?;

		Ok(page_from(result.cases, result.total, None))
	}

	pub async fn fetch_next_page(
		&self,
		user_token: &str,
		case_type: &str,
		cursor_key: CaseId,
		page_size: u32,
	) -> Result<SearchPage> {
		let context = self
			.query
			.to_context(page_size, 0)
			.with_sort(CURSOR_SORT_FIELD, SortOrder::Asc)
			.with_search_after(cursor_key.to_string());
		let result = self.search(user_token, case_type, &context).await?;

		Ok(page_from(result.cases, result.total, Some(cursor_key)))
	}

	async fn search(
		&self,
		user_token: &str,
		case_type: &str,
		context: &SearchContext,
	) -> Result<crate::SearchResult> {
		let service_token = self.tokens.generate().await.map_err(into_search_error)?;
		let auth = CallAuth { user_token, service_token: service_token.as_str() };
		let body = context.to_value();

		self.store.search(auth, case_type, &body).await.map_err(into_search_error)
	}
}

fn page_from(cases: Vec<CaseRecord>, total: u64, after: Option<CaseId>) -> SearchPage {
	let fetched = cases.len();
	let cases: Vec<CaseRecord> = match after {
		Some(after) => cases.into_iter().filter(|case| case.id > after).collect(),
		None => cases,
	};

	if cases.len() < fetched {
		tracing::warn!(
			dropped = fetched - cases.len(),
			cursor = ?after,
			"Search returned records at or before the cursor. Dropping them."
		);
	}

	let cursor_key = cases.last().map(|case| case.id);

	SearchPage { cases, total, hits: fetched, cursor_key }
}

fn into_search_error(err: Error) -> Error {
	match err {
		Error::Search { .. } | Error::Configuration { .. } => err,
		other => Error::Search { message: other.to_string() },
	}
}
