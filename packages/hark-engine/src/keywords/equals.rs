use ahash::AHashMap;
use serde_json::{Number, Value};

use hark_domain::{Clause, ConditionId};

use crate::keywords::{Keyword, KeywordResult, OperandStore, reject_unknown_args, require_value};

/// `{"equals": {"field": "city", "value": "NYC"}}`
pub struct Equals;
impl Keyword for Equals {
	fn name(&self) -> &str {
		"equals"
	}

	fn validate(&self, clause: &Clause) -> KeywordResult<()> {
		reject_unknown_args(clause, &["value"])?;

		value_key(require_value(clause)?)
			.map(|_| ())
			.ok_or_else(|| "equals compares scalar values only.".to_string())
	}

	fn new_store(&self, negated: bool) -> Box<dyn OperandStore> {
		Box::new(ValueStore::new(negated, |clause| {
			let value = require_value(clause)?;

			value_key(value)
				.map(|key| vec![key])
				.ok_or_else(|| "equals compares scalar values only.".to_string())
		}))
	}

	fn test(&self, clause: &Clause, value: Option<&Value>) -> KeywordResult<bool> {
		let expected = require_value(clause)?;

		Ok(value.and_then(value_key).is_some_and(|actual| value_key(expected) == Some(actual)))
	}
}

/// Lookup key of a scalar. Numbers compare by value, so `1`, `1.0` and `-0.0`/`0` share a key.
pub(crate) fn value_key(value: &Value) -> Option<String> {
	match value {
		Value::Null => Some("null".to_string()),
		Value::Bool(flag) => Some(flag.to_string()),
		Value::Number(number) => Some(number_key(number)),
		Value::String(_) => Some(value.to_string()),
		Value::Array(_) | Value::Object(_) => None,
	}
}

fn number_key(number: &Number) -> String {
	if let Some(int) = number.as_i64() {
		return format!("n:{int}");
	}
	if let Some(uint) = number.as_u64() {
		return format!("n:{uint}");
	}

	match number.as_f64() {
		// Integral floats inside the i64 range convert exactly.
		Some(float) if float.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&float) =>
			format!("n:{}", float as i64),
		Some(float) => format!("n:{float:?}"),
		None => format!("n:{number}"),
	}
}

const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

type AcceptedKeys = fn(&Clause) -> KeywordResult<Vec<String>>;

/// Conditions indexed by the scalar values they accept.
pub(crate) struct ValueStore {
	negated: bool,
	accepted: AcceptedKeys,
	by_key: AHashMap<String, Vec<ConditionId>>,
	keys: AHashMap<ConditionId, Vec<String>>,
}
impl ValueStore {
	pub(crate) fn new(negated: bool, accepted: AcceptedKeys) -> Self {
		Self { negated, accepted, by_key: AHashMap::new(), keys: AHashMap::new() }
	}
}
impl OperandStore for ValueStore {
	fn insert(&mut self, clause: &Clause) -> KeywordResult<()> {
		if self.keys.contains_key(&clause.id()) {
			return Ok(());
		}

		let mut keys = (self.accepted)(clause)?;

		keys.sort();
		keys.dedup();

		for key in &keys {
			self.by_key.entry(key.clone()).or_default().push(clause.id());
		}

		self.keys.insert(clause.id(), keys);

		Ok(())
	}

	fn remove(&mut self, id: ConditionId) -> bool {
		let Some(keys) = self.keys.remove(&id) else {
			return false;
		};

		for key in keys {
			if let Some(ids) = self.by_key.get_mut(&key) {
				ids.retain(|stored| *stored != id);

				if ids.is_empty() {
					self.by_key.remove(&key);
				}
			}
		}

		true
	}

	fn matches(&self, value: Option<&Value>, out: &mut Vec<ConditionId>) -> KeywordResult<()> {
		let hits = value
			.and_then(value_key)
			.and_then(|key| self.by_key.get(&key))
			.map(Vec::as_slice)
			.unwrap_or_default();

		if self.negated {
			out.extend(self.keys.keys().filter(|id| !hits.contains(id)));
		} else {
			out.extend_from_slice(hits);
		}

		Ok(())
	}

	fn contains(&self, id: ConditionId) -> bool {
		self.keys.contains_key(&id)
	}

	fn len(&self) -> usize {
		self.keys.len()
	}
}
