//! Declarative search queries for the case index.
//!
//! Clause trees are plain values: build them with the constructors below, then serialize with
//! [`QueryClause::to_context`]. Every constructor validates its field eagerly so a malformed
//! query never reaches the wire.

use serde_json::{Map, Value};

/// Fields returned for every hit. The cursor only needs the reference and the jurisdiction.
pub const SOURCE_FIELDS: [&str; 2] = ["reference", "jurisdiction"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
	#[error("{clause} query requires a non-blank field.")]
	BlankField { clause: &'static str },
	#[error("terms query on {field} requires at least one value.")]
	EmptyTerms { field: String },
	#[error("range query on {field} requires at least one bound.")]
	EmptyRange { field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
	Gt(Value),
	Gte(Value),
	Lt(Value),
	Lte(Value),
}
impl RangeBound {
	fn operator(&self) -> &'static str {
		match self {
			Self::Gt(_) => "gt",
			Self::Gte(_) => "gte",
			Self::Lt(_) => "lt",
			Self::Lte(_) => "lte",
		}
	}

	fn value(&self) -> &Value {
		match self {
			Self::Gt(value) | Self::Gte(value) | Self::Lt(value) | Self::Lte(value) => value,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
	Asc,
	Desc,
}
impl SortOrder {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Asc => "asc",
			Self::Desc => "desc",
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryClause {
	Term { field: String, value: Value },
	Terms { field: String, values: Vec<Value> },
	Range { field: String, bounds: Vec<RangeBound> },
	Exists { field: String },
	Match { field: String, value: Value },
	Bool { must: Vec<QueryClause>, must_not: Vec<QueryClause>, filter: Vec<QueryClause> },
}
impl QueryClause {
	pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Result<Self, QueryError> {
		Ok(Self::Term { field: require_field(field.into(), "term")?, value: value.into() })
	}

	pub fn terms<I, V>(field: impl Into<String>, values: I) -> Result<Self, QueryError>
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		let field = require_field(field.into(), "terms")?;
		let values: Vec<Value> = values.into_iter().map(Into::into).collect();

		if values.is_empty() {
			return Err(QueryError::EmptyTerms { field });
		}

		Ok(Self::Terms { field, values })
	}

	pub fn range(
		field: impl Into<String>,
		bounds: impl IntoIterator<Item = RangeBound>,
	) -> Result<Self, QueryError> {
		let field = require_field(field.into(), "range")?;
		let bounds: Vec<RangeBound> = bounds.into_iter().collect();

		if bounds.is_empty() {
			return Err(QueryError::EmptyRange { field });
		}

		Ok(Self::Range { field, bounds })
	}

	pub fn exists(field: impl Into<String>) -> Result<Self, QueryError> {
		Ok(Self::Exists { field: require_field(field.into(), "exists")? })
	}

	pub fn matches(field: impl Into<String>, value: impl Into<Value>) -> Result<Self, QueryError> {
		Ok(Self::Match { field: require_field(field.into(), "match")?, value: value.into() })
	}

	pub fn must(clauses: impl IntoIterator<Item = QueryClause>) -> Self {
		Self::bool(clauses, [], [])
	}

	pub fn must_not(clauses: impl IntoIterator<Item = QueryClause>) -> Self {
		Self::bool([], clauses, [])
	}

	pub fn filter(clauses: impl IntoIterator<Item = QueryClause>) -> Self {
		Self::bool([], [], clauses)
	}

	pub fn bool(
		must: impl IntoIterator<Item = QueryClause>,
		must_not: impl IntoIterator<Item = QueryClause>,
		filter: impl IntoIterator<Item = QueryClause>,
	) -> Self {
		Self::Bool {
			must: must.into_iter().collect(),
			must_not: must_not.into_iter().collect(),
			filter: filter.into_iter().collect(),
		}
	}

	/// Matches every document. Used when a migration has no narrower candidate query.
	pub fn match_all() -> Self {
		Self::bool([], [], [])
	}

	pub fn to_value(&self) -> Value {
		match self {
			Self::Term { field, value } => keyed("term", field, value.clone()),
			Self::Terms { field, values } => keyed("terms", field, Value::Array(values.clone())),
			Self::Range { field, bounds } => {
				let mut ops = Map::new();

				for bound in bounds {
					ops.insert(bound.operator().to_string(), bound.value().clone());
				}

				keyed("range", field, Value::Object(ops))
			},
			Self::Exists { field } => serde_json::json!({ "exists": { "field": field } }),
			Self::Match { field, value } =>
				keyed("match", field, serde_json::json!({ "query": value })),
			Self::Bool { must, must_not, filter } => {
				let mut body = Map::new();

				for (key, clauses) in [("must", must), ("must_not", must_not), ("filter", filter)] {
					if !clauses.is_empty() {
						body.insert(
							key.to_string(),
							Value::Array(clauses.iter().map(Self::to_value).collect()),
						);
					}
				}

				serde_json::json!({ "bool": body })
			},
		}
	}

	pub fn to_context(&self, size: u32, from: u32) -> SearchContext {
		SearchContext { query: self.to_value(), size, from, sort: None, search_after: None }
	}
}

/// A full search request body.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchContext {
	query: Value,
	size: u32,
	from: u32,
	sort: Option<(String, SortOrder)>,
	search_after: Option<String>,
}
impl SearchContext {
	pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
		self.sort = Some((field.into(), order));

		self
	}

	pub fn with_search_after(mut self, key: impl Into<String>) -> Self {
		self.search_after = Some(key.into());

		self
	}

	pub fn to_value(&self) -> Value {
		let mut body = Map::new();

		body.insert("query".to_string(), self.query.clone());
		body.insert("size".to_string(), Value::from(self.size));
		body.insert("from".to_string(), Value::from(self.from));
		body.insert(
			"_source".to_string(),
			Value::Array(SOURCE_FIELDS.iter().map(|field| Value::from(*field)).collect()),
		);
		body.insert("track_total_hits".to_string(), Value::Bool(true));

		if let Some((field, order)) = &self.sort {
			let mut sort = Map::new();

			sort.insert(field.clone(), Value::from(order.as_str()));
			body.insert("sort".to_string(), Value::Array(vec![Value::Object(sort)]));
		}
		if let Some(key) = &self.search_after {
			body.insert("search_after".to_string(), serde_json::json!([key]));
		}

		Value::Object(body)
	}
}

fn require_field(field: String, clause: &'static str) -> Result<String, QueryError> {
	if field.trim().is_empty() {
		return Err(QueryError::BlankField { clause });
	}

	Ok(field)
}

fn keyed(kind: &str, field: &str, body: Value) -> Value {
	let mut inner = Map::new();

	inner.insert(field.to_string(), body);

	let mut outer = Map::new();

	outer.insert(kind.to_string(), Value::Object(inner));

	Value::Object(outer)
}
