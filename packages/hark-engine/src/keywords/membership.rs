use serde_json::Value;

use hark_domain::Clause;

use crate::keywords::{
	Keyword, KeywordResult, OperandStore,
	equals::{ValueStore, value_key},
	reject_unknown_args, require_value,
};

/// `{"in": {"field": "city", "value": ["NYC", "LA"]}}`
pub struct Membership;
impl Keyword for Membership {
	fn name(&self) -> &str {
		"in"
	}

	fn validate(&self, clause: &Clause) -> KeywordResult<()> {
		reject_unknown_args(clause, &["value"])?;
		accepted_keys(clause).map(|_| ())
	}

	fn new_store(&self, negated: bool) -> Box<dyn OperandStore> {
		Box::new(ValueStore::new(negated, accepted_keys))
	}

	fn test(&self, clause: &Clause, value: Option<&Value>) -> KeywordResult<bool> {
		let accepted = accepted_keys(clause)?;

		Ok(value.and_then(value_key).is_some_and(|key| accepted.contains(&key)))
	}
}

fn accepted_keys(clause: &Clause) -> KeywordResult<Vec<String>> {
	let Value::Array(items) = require_value(clause)? else {
		return Err("in expects an array of values.".to_string());
	};

	if items.is_empty() {
		return Err("in expects at least one value.".to_string());
	}

	items
		.iter()
		.map(|item| value_key(item).ok_or_else(|| "in accepts scalar values only.".to_string()))
		.collect()
}
