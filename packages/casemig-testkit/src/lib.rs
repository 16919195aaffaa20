//! In-memory collaborators for exercising migration runs without a case store.
//!
//! [`InMemoryCaseStore`] evaluates the subset of the search DSL the engine emits (`bool`,
//! `exists`, `term`, `terms`, `match`, `range`) against `data.*` fields, honours `size` and
//! `search_after`, and enforces the start/submit token handshake. Every call is counted so tests
//! can assert exact call shapes.

use std::{
	collections::{BTreeMap, HashMap, HashSet},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	cmp::Ordering as Compared,
	time::Duration,
};

use serde_json::Value;

use casemig_domain::{CaseData, CaseId, CaseRecord, CaseValue};
use casemig_service::{
	BoxFuture, CallAuth, CaseStore, Collaborators, Error, EventDetails, EventTarget,
	IdentityProvider, Result, SearchResult, ServiceTokenGenerator, StartedEvent,
};

pub const TEST_USER_ID: &str = "caseworker-1";
pub const TEST_USER_TOKEN: &str = "user-token";

#[derive(Default)]
struct Faults {
	start: HashSet<CaseId>,
	submit: HashSet<CaseId>,
	/// 1-based search call numbers that fail.
	search: HashSet<usize>,
}

#[derive(Default)]
pub struct InMemoryCaseStore {
	cases: Mutex<BTreeMap<CaseId, CaseRecord>>,
	tokens: Mutex<HashMap<CaseId, String>>,
	faults: Mutex<Faults>,
	search_bodies: Mutex<Vec<Value>>,
	/// Cases that appear once the given search call has been answered.
	late_cases: Mutex<Vec<(usize, CaseRecord)>>,
	repeat_cursor_hit: Mutex<bool>,
	submitted: Mutex<Vec<CaseId>>,
	searches: AtomicUsize,
	starts: AtomicUsize,
	submits: AtomicUsize,
	lookups: AtomicUsize,
	service_tokens: Mutex<Vec<String>>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
	searches_during_starts: AtomicUsize,
	start_delay: Mutex<Option<Duration>>,
}
impl InMemoryCaseStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_cases(cases: impl IntoIterator<Item = CaseRecord>) -> Self {
		let store = Self::new();

		for case in cases {
			store.insert(case);
		}

		store
	}

	pub fn insert(&self, case: CaseRecord) {
		lock(&self.cases).insert(case.id, case);
	}

	pub fn case(&self, case_id: CaseId) -> Option<CaseRecord> {
		lock(&self.cases).get(&case_id).cloned()
	}

	pub fn fail_start(&self, case_id: CaseId) {
		lock(&self.faults).start.insert(case_id);
	}

	pub fn fail_submit(&self, case_id: CaseId) {
		lock(&self.faults).submit.insert(case_id);
	}

	/// Fails the `call`-th search request, counting from one and including the sizing probe.
	pub fn fail_search_call(&self, call: usize) {
		lock(&self.faults).search.insert(call);
	}

	/// Adds `case` right after the `call`-th search request is answered.
	pub fn insert_after_search(&self, call: usize, case: CaseRecord) {
		lock(&self.late_cases).push((call, case));
	}

	/// Makes every search-after response lead with the cursor record itself, as an engine with
	/// inconsistent replicas may. The page stays at most `size` hits long.
	pub fn repeat_cursor_hit(&self) {
		*lock(&self.repeat_cursor_hit) = true;
	}

	/// Holds every start call open for `delay` so parallel runs overlap.
	pub fn delay_starts(&self, delay: Duration) {
		*lock(&self.start_delay) = Some(delay);
	}

	pub fn searches(&self) -> usize {
		self.searches.load(Ordering::SeqCst)
	}

	pub fn starts(&self) -> usize {
		self.starts.load(Ordering::SeqCst)
	}

	pub fn submits(&self) -> usize {
		self.submits.load(Ordering::SeqCst)
	}

	pub fn lookups(&self) -> usize {
		self.lookups.load(Ordering::SeqCst)
	}

	pub fn remote_calls(&self) -> usize {
		self.searches() + self.starts() + self.submits() + self.lookups()
	}

	/// Highest number of start calls observed in flight at once.
	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	/// Search requests that arrived while a start call was still open.
	pub fn searches_during_starts(&self) -> usize {
		self.searches_during_starts.load(Ordering::SeqCst)
	}

	pub fn search_bodies(&self) -> Vec<Value> {
		lock(&self.search_bodies).clone()
	}

	pub fn submitted(&self) -> Vec<CaseId> {
		lock(&self.submitted).clone()
	}

	/// Service tokens presented with store calls, in call order.
	pub fn service_tokens(&self) -> Vec<String> {
		lock(&self.service_tokens).clone()
	}

	fn note_auth(&self, auth: CallAuth<'_>) -> Result<()> {
		if auth.user_token != TEST_USER_TOKEN {
			return Err(Error::Transport { message: "401 Unauthorized.".to_string() });
		}

		lock(&self.service_tokens).push(auth.service_token.to_string());

		Ok(())
	}

	fn run_search(&self, case_type: &str, body: &Value) -> Result<SearchResult> {
		let call = self.searches.fetch_add(1, Ordering::SeqCst) + 1;

		if self.in_flight.load(Ordering::SeqCst) > 0 {
			self.searches_during_starts.fetch_add(1, Ordering::SeqCst);
		}

		lock(&self.search_bodies).push(body.clone());

		let result = self.answer_search(call, case_type, body);
		let mut due = Vec::new();

		lock(&self.late_cases).retain(|(after_call, case)| {
			if *after_call == call {
				due.push(case.clone());
			}

			*after_call != call
		});

		for case in due {
			self.insert(case);
		}

		result
	}

	fn answer_search(&self, call: usize, case_type: &str, body: &Value) -> Result<SearchResult> {
		if lock(&self.faults).search.contains(&call) {
			return Err(Error::Transport { message: format!("Search call {call} failed.") });
		}

		let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
		let after = body
			.get("search_after")
			.and_then(|keys| keys.get(0))
			.and_then(|key| match key {
				Value::String(text) => text.parse::<CaseId>().ok(),
				Value::Number(number) => number.as_i64(),
				_ => None,
			});
		let query = body.get("query").cloned().unwrap_or(Value::Null);
		let cases = lock(&self.cases);
		let matching = cases
			.values()
			.filter(|case| case.case_type == case_type && matches_query(&query, case))
			.collect::<Vec<_>>();
		let repeated = after
			.filter(|_| *lock(&self.repeat_cursor_hit))
			.and_then(|after| cases.get(&after));
		let hits = repeated
			.into_iter()
			.chain(matching.iter().copied().filter(|case| after.is_none_or(|key| case.id > key)))
			.take(size)
			.map(|case| CaseRecord::new(case.id, case.jurisdiction.clone(), case_type))
			.collect();

		Ok(SearchResult { total: matching.len() as u64, cases: hits })
	}

	async fn run_start(&self, target: EventTarget<'_>) -> Result<StartedEvent> {
		self.starts.fetch_add(1, Ordering::SeqCst);

		let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

		self.max_in_flight.fetch_max(current, Ordering::SeqCst);

		let delay = *lock(&self.start_delay);

		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		let started = self.start_now(target);

		self.in_flight.fetch_sub(1, Ordering::SeqCst);

		started
	}

	fn start_now(&self, target: EventTarget<'_>) -> Result<StartedEvent> {
		if lock(&self.faults).start.contains(&target.case_id) {
			return Err(Error::Transport {
				message: format!("Start event failed for case {}.", target.case_id),
			});
		}

		let case = self.existing(target.case_id, target.case_type)?;
		let token = format!("event-{}-{}", target.case_id, self.starts());

		lock(&self.tokens).insert(target.case_id, token.clone());

		Ok(StartedEvent { token, case })
	}

	fn run_submit(
		&self,
		target: EventTarget<'_>,
		event_token: &str,
		data: CaseData,
	) -> Result<CaseRecord> {
		self.submits.fetch_add(1, Ordering::SeqCst);

		if lock(&self.faults).submit.contains(&target.case_id) {
			return Err(Error::Transport {
				message: format!("Submit failed for case {}.", target.case_id),
			});
		}
		if lock(&self.tokens).get(&target.case_id).map(String::as_str) != Some(event_token) {
			return Err(Error::Transport {
				message: format!("Event token for case {} is stale.", target.case_id),
			});
		}

		let mut cases = lock(&self.cases);
		let case = cases.get_mut(&target.case_id).ok_or_else(|| Error::NotFound {
			message: format!("Case {} does not exist.", target.case_id),
		})?;

		case.data = data;

		lock(&self.submitted).push(target.case_id);

		Ok(case.clone())
	}

	fn existing(&self, case_id: CaseId, case_type: &str) -> Result<CaseRecord> {
		lock(&self.cases)
			.get(&case_id)
			.filter(|case| case_type.is_empty() || case.case_type == case_type)
			.cloned()
			.ok_or_else(|| Error::NotFound { message: format!("Case {case_id} does not exist.") })
	}
}
impl CaseStore for InMemoryCaseStore {
	fn search<'a>(
		&'a self,
		auth: CallAuth<'a>,
		case_type: &'a str,
		query: &'a Value,
	) -> BoxFuture<'a, Result<SearchResult>> {
		Box::pin(async move {
			self.note_auth(auth)?;
			self.run_search(case_type, query)
		})
	}

	fn start_update<'a>(
		&'a self,
		auth: CallAuth<'a>,
		target: EventTarget<'a>,
	) -> BoxFuture<'a, Result<StartedEvent>> {
		Box::pin(async move {
			self.note_auth(auth)?;
			self.run_start(target).await
		})
	}

	fn submit_update<'a>(
		&'a self,
		auth: CallAuth<'a>,
		target: EventTarget<'a>,
		_details: EventDetails<'a>,
		event_token: &'a str,
		data: CaseData,
	) -> BoxFuture<'a, Result<CaseRecord>> {
		Box::pin(async move {
			self.note_auth(auth)?;
			self.run_submit(target, event_token, data)
		})
	}

	fn get_case<'a>(
		&'a self,
		auth: CallAuth<'a>,
		case_id: CaseId,
	) -> BoxFuture<'a, Result<CaseRecord>> {
		Box::pin(async move {
			self.lookups.fetch_add(1, Ordering::SeqCst);
			self.note_auth(auth)?;
			self.existing(case_id, "")
		})
	}
}

/// Identity provider that accepts one credential pair and counts its calls.
pub struct SpyIdentity {
	username: String,
	password: String,
	authentications: AtomicUsize,
	lookups: AtomicUsize,
}
impl SpyIdentity {
	pub fn new(username: &str, password: &str) -> Self {
		Self {
			username: username.to_string(),
			password: password.to_string(),
			authentications: AtomicUsize::new(0),
			lookups: AtomicUsize::new(0),
		}
	}

	pub fn authentications(&self) -> usize {
		self.authentications.load(Ordering::SeqCst)
	}

	pub fn lookups(&self) -> usize {
		self.lookups.load(Ordering::SeqCst)
	}
}
impl IdentityProvider for SpyIdentity {
	fn authenticate<'a>(
		&'a self,
		username: &'a str,
		password: &'a str,
	) -> BoxFuture<'a, Result<String>> {
		self.authentications.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if username != self.username || password != self.password {
				return Err(Error::Transport { message: "Invalid credentials.".to_string() });
			}

			Ok(TEST_USER_TOKEN.to_string())
		})
	}

	fn user_id<'a>(&'a self, _user_token: &'a str) -> BoxFuture<'a, Result<String>> {
		self.lookups.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Ok(TEST_USER_ID.to_string()) })
	}
}

/// Issues a distinct service token per call.
#[derive(Default)]
pub struct CountingTokens {
	calls: AtomicUsize,
}
impl CountingTokens {
	pub fn count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl ServiceTokenGenerator for CountingTokens {
	fn generate(&self) -> BoxFuture<'_, Result<String>> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

		Box::pin(async move { Ok(format!("s2s-{call}")) })
	}
}

/// A store plus spies wired into [`Collaborators`].
pub struct Harness {
	pub store: Arc<InMemoryCaseStore>,
	pub identity: Arc<SpyIdentity>,
	pub tokens: Arc<CountingTokens>,
}
impl Harness {
	pub const USERNAME: &'static str = "migrator@example.com";
	pub const PASSWORD: &'static str = "secret";

	pub fn new(store: InMemoryCaseStore) -> Self {
		Self {
			store: Arc::new(store),
			identity: Arc::new(SpyIdentity::new(Self::USERNAME, Self::PASSWORD)),
			tokens: Arc::new(CountingTokens::default()),
		}
	}

	pub fn collaborators(&self) -> Collaborators {
		Collaborators {
			identity: self.identity.clone(),
			store: self.store.clone(),
			tokens: self.tokens.clone(),
		}
	}

	/// Calls made to any remote collaborator.
	pub fn remote_calls(&self) -> usize {
		self.store.remote_calls()
			+ self.identity.authentications()
			+ self.identity.lookups()
			+ self.tokens.count()
	}
}

/// `count` cases of `case_type` with ascending references starting at `first`.
pub fn seed_cases(
	first: CaseId,
	count: usize,
	case_type: &str,
	field: &str,
	value: &str,
) -> Vec<CaseRecord> {
	(0..count as i64)
		.map(|offset| {
			CaseRecord::new(first + offset, "PUBLICLAW", case_type).with_field(field, value)
		})
		.collect()
}

fn matches_query(query: &Value, case: &CaseRecord) -> bool {
	let Some((kind, body)) = query.as_object().and_then(|map| map.iter().next()) else {
		return true;
	};

	match kind.as_str() {
		"bool" => {
			let all = |key: &str, expected: bool| {
				body.get(key)
					.and_then(Value::as_array)
					.map(|clauses| {
						clauses.iter().all(|clause| matches_query(clause, case) == expected)
					})
					.unwrap_or(true)
			};

			all("must", true) && all("filter", true) && all("must_not", false)
		},
		"exists" => body
			.get("field")
			.and_then(Value::as_str)
			.and_then(|field| lookup(case, field))
			.is_some_and(|value| !value.is_null()),
		"term" | "match" => single_field(body).is_some_and(|(field, expected)| {
			let expected = expected.get("query").unwrap_or(expected);

			lookup(case, field).is_some_and(|value| value == *expected)
		}),
		"terms" => single_field(body).is_some_and(|(field, expected)| {
			let Some(value) = lookup(case, field) else {
				return false;
			};

			expected.as_array().is_some_and(|options| options.contains(&value))
		}),
		"range" => single_field(body).is_some_and(|(field, bounds)| {
			let (Some(value), Some(bounds)) = (lookup(case, field), bounds.as_object()) else {
				return false;
			};

			bounds.iter().all(|(operator, bound)| {
				let Some(order) = compare(&value, bound) else {
					return false;
				};

				match operator.as_str() {
					"gt" => order == Compared::Greater,
					"gte" => order != Compared::Less,
					"lt" => order == Compared::Less,
					"lte" => order != Compared::Greater,
					_ => false,
				}
			})
		}),
		_ => false,
	}
}

/// Numbers compare numerically and strings lexically, which orders `YYYY-MM-DD` dates too.
fn compare(value: &Value, bound: &Value) -> Option<Compared> {
	match (value, bound) {
		(Value::Number(value), Value::Number(bound)) =>
			value.as_f64()?.partial_cmp(&bound.as_f64()?),
		(Value::String(value), Value::String(bound)) => Some(value.as_str().cmp(bound.as_str())),
		_ => None,
	}
}

fn single_field(body: &Value) -> Option<(&str, &Value)> {
	body.as_object().and_then(|map| map.iter().next()).map(|(key, value)| (key.as_str(), value))
}

fn lookup(case: &CaseRecord, field: &str) -> Option<Value> {
	let field = field.strip_suffix(".keyword").unwrap_or(field);

	match field {
		"reference" => return Some(Value::from(case.id.to_string())),
		"jurisdiction" => return Some(Value::from(case.jurisdiction.clone())),
		_ => {},
	}

	let path = field.strip_prefix("data.")?;
	let mut segments = path.split('.');
	let mut current: &CaseValue = case.data.get(segments.next()?)?;

	for segment in segments {
		current = current.as_map()?.get(segment)?;
	}

	Some(Value::from(current.clone()))
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}
