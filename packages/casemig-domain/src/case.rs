use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Case reference. References are fixed width, so numeric order matches the search engine's
/// keyword order.
pub type CaseId = i64;

pub type CaseData = BTreeMap<String, CaseValue>;

/// A single field value inside case data.
///
/// Converting from JSON recognises `YYYY-MM-DD` strings as [`CaseValue::Date`] and renders them
/// back in the same shape, so data passes through a transform without drift.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum CaseValue {
	Null,
	Bool(bool),
	Number(Number),
	Text(String),
	Date(Date),
	Map(CaseData),
	List(Vec<CaseValue>),
}
impl CaseValue {
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Text(text) => Some(text.as_str()),
			_ => None,
		}
	}

	pub fn as_map(&self) -> Option<&CaseData> {
		match self {
			Self::Map(map) => Some(map),
			_ => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}
}
impl From<Value> for CaseValue {
	fn from(value: Value) -> Self {
		match value {
			Value::Null => Self::Null,
			Value::Bool(flag) => Self::Bool(flag),
			Value::Number(number) => Self::Number(number),
			Value::String(text) => match parse_date(&text) {
				Some(date) => Self::Date(date),
				None => Self::Text(text),
			},
			Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
			Value::Object(map) => Self::Map(data_from_json(map)),
		}
	}
}
impl From<CaseValue> for Value {
	fn from(value: CaseValue) -> Self {
		match value {
			CaseValue::Null => Value::Null,
			CaseValue::Bool(flag) => Value::Bool(flag),
			CaseValue::Number(number) => Value::Number(number),
			CaseValue::Text(text) => Value::String(text),
			CaseValue::Date(date) => Value::String(format_date(date)),
			CaseValue::Map(map) => Value::Object(data_to_json(map)),
			CaseValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
		}
	}
}
impl From<&str> for CaseValue {
	fn from(value: &str) -> Self {
		Self::Text(value.to_string())
	}
}
impl From<String> for CaseValue {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}
impl From<i64> for CaseValue {
	fn from(value: i64) -> Self {
		Self::Number(Number::from(value))
	}
}
impl From<bool> for CaseValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

/// Read-only snapshot of a case as returned by search, lookup, or an update start.
#[derive(Clone, Debug, PartialEq)]
pub struct CaseRecord {
	pub id: CaseId,
	pub jurisdiction: String,
	pub case_type: String,
	pub data: CaseData,
	/// Opaque optimistic-concurrency marker reported by the store, when it reports one.
	pub version: Option<String>,
}
impl CaseRecord {
	pub fn new(id: CaseId, jurisdiction: impl Into<String>, case_type: impl Into<String>) -> Self {
		Self {
			id,
			jurisdiction: jurisdiction.into(),
			case_type: case_type.into(),
			data: CaseData::new(),
			version: None,
		}
	}

	pub fn with_field(mut self, key: impl Into<String>, value: impl Into<CaseValue>) -> Self {
		self.data.insert(key.into(), value.into());

		self
	}

	pub fn field(&self, key: &str) -> Option<&CaseValue> {
		self.data.get(key)
	}
}

pub fn data_from_json(map: Map<String, Value>) -> CaseData {
	map.into_iter().map(|(key, value)| (key, CaseValue::from(value))).collect()
}

pub fn data_to_json(data: CaseData) -> Map<String, Value> {
	data.into_iter().map(|(key, value)| (key, Value::from(value))).collect()
}

fn parse_date(text: &str) -> Option<Date> {
	if text.len() != 10 {
		return None;
	}

	Date::parse(text, DATE_FORMAT).ok()
}

fn format_date(date: Date) -> String {
	match date.format(DATE_FORMAT) {
		Ok(text) => text,
		Err(_) => date.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dates_survive_json_round_trip() {
		let raw = serde_json::json!({
			"dateOfIssue": "2024-02-29",
			"submittedAt": "2024-02-29T10:15:00.000",
			"children": [{ "value": { "dateOfBirth": "2019-07-01", "age": 4 } }],
		});
		let data = data_from_json(raw.as_object().cloned().expect("object"));

		assert!(matches!(data.get("dateOfIssue"), Some(CaseValue::Date(_))));
		assert!(matches!(data.get("submittedAt"), Some(CaseValue::Text(_))));
		assert_eq!(Value::Object(data_to_json(data)), raw);
	}

	#[test]
	fn invalid_calendar_dates_stay_text() {
		let invalid = CaseValue::from(Value::from("2023-02-30"));

		assert_eq!(invalid, CaseValue::Text("2023-02-30".into()));
	}

	#[test]
	fn numbers_keep_integer_shape() {
		let value = CaseValue::from(serde_json::json!(1_583_841_721_773_828_i64));

		assert_eq!(Value::from(value), serde_json::json!(1_583_841_721_773_828_i64));
	}
}
