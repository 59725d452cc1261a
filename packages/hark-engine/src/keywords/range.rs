use serde_json::Value;

use hark_domain::{Clause, ConditionId};

use crate::keywords::{Keyword, KeywordResult, OperandStore, reject_unknown_args, require_value};

const BOUNDS: [&str; 4] = ["gt", "gte", "lt", "lte"];

/// `{"range": {"field": "age", "value": {"gte": 18, "lt": 65}}}`
pub struct Range;
impl Keyword for Range {
	fn name(&self) -> &str {
		"range"
	}

	fn validate(&self, clause: &Clause) -> KeywordResult<()> {
		reject_unknown_args(clause, &["value"])?;
		Bounds::parse(clause).map(|_| ())
	}

	fn new_store(&self, negated: bool) -> Box<dyn OperandStore> {
		Box::new(RangeStore { negated, entries: Vec::new() })
	}

	fn test(&self, clause: &Clause, value: Option<&Value>) -> KeywordResult<bool> {
		Ok(Bounds::parse(clause)?.contains(value))
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Bound {
	limit: f64,
	inclusive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Bounds {
	lower: Option<Bound>,
	upper: Option<Bound>,
}
impl Bounds {
	fn parse(clause: &Clause) -> KeywordResult<Self> {
		let Value::Object(raw) = require_value(clause)? else {
			return Err("range expects an object of bounds.".to_string());
		};

		if let Some(key) = raw.keys().find(|key| !BOUNDS.contains(&key.as_str())) {
			return Err(format!("unknown range bound '{key}'."));
		}

		let bound = |name: &str, inclusive: bool| -> KeywordResult<Option<Bound>> {
			match raw.get(name) {
				None => Ok(None),
				Some(limit) => limit
					.as_f64()
					.map(|limit| Some(Bound { limit, inclusive }))
					.ok_or_else(|| format!("range bound '{name}' must be a number.")),
			}
		};
		let lower = exclusive_pair(bound("gt", false)?, bound("gte", true)?, "gt", "gte")?;
		let upper = exclusive_pair(bound("lt", false)?, bound("lte", true)?, "lt", "lte")?;

		match (lower, upper) {
			(None, None) => Err("range expects at least one bound.".to_string()),
			(Some(lower), Some(upper)) if lower.limit > upper.limit =>
				Err("range lower bound exceeds its upper bound.".to_string()),
			_ => Ok(Self { lower, upper }),
		}
	}

	fn contains(&self, value: Option<&Value>) -> bool {
		let Some(number) = value.and_then(Value::as_f64) else {
			return false;
		};
		let above = self.lower.is_none_or(|bound| {
			if bound.inclusive { number >= bound.limit } else { number > bound.limit }
		});
		let below = self.upper.is_none_or(|bound| {
			if bound.inclusive { number <= bound.limit } else { number < bound.limit }
		});

		above && below
	}
}

fn exclusive_pair(
	strict: Option<Bound>,
	inclusive: Option<Bound>,
	strict_name: &str,
	inclusive_name: &str,
) -> KeywordResult<Option<Bound>> {
	match (strict, inclusive) {
		(Some(_), Some(_)) =>
			Err(format!("range cannot combine '{strict_name}' and '{inclusive_name}'.")),
		(bound, None) | (None, bound) => Ok(bound),
	}
}

struct RangeStore {
	negated: bool,
	entries: Vec<(ConditionId, Bounds)>,
}
impl OperandStore for RangeStore {
	fn insert(&mut self, clause: &Clause) -> KeywordResult<()> {
		if self.contains(clause.id()) {
			return Ok(());
		}

		self.entries.push((clause.id(), Bounds::parse(clause)?));

		Ok(())
	}

	fn remove(&mut self, id: ConditionId) -> bool {
		let before = self.entries.len();

		self.entries.retain(|(stored, _)| *stored != id);

		self.entries.len() != before
	}

	fn matches(&self, value: Option<&Value>, out: &mut Vec<ConditionId>) -> KeywordResult<()> {
		out.extend(
			self.entries
				.iter()
				.filter(|(_, bounds)| bounds.contains(value) != self.negated)
				.map(|(id, _)| *id),
		);

		Ok(())
	}

	fn contains(&self, id: ConditionId) -> bool {
		self.entries.iter().any(|(stored, _)| *stored == id)
	}

	fn len(&self) -> usize {
		self.entries.len()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::Value;

	use hark_domain::Clause;

	use crate::keywords::{Keyword, OperandStore, Range};

	fn clause(bounds: Value, negated: bool) -> Clause {
		let Value::Object(args) = serde_json::json!({ "field": "age", "value": bounds }) else {
			unreachable!()
		};

		Clause::new("range", args, negated).expect("valid clause")
	}

	#[test]
	fn inclusive_and_exclusive_bounds() {
		let adult = clause(serde_json::json!({ "gte": 18, "lt": 65 }), false);

		assert_eq!(Range.test(&adult, Some(&Value::from(18))), Ok(true));
		assert_eq!(Range.test(&adult, Some(&Value::from(64.5))), Ok(true));
		assert_eq!(Range.test(&adult, Some(&Value::from(65))), Ok(false));
		assert_eq!(Range.test(&adult, Some(&Value::from("30"))), Ok(false));
	}

	#[test]
	fn invalid_bounds_are_rejected() {
		for bounds in [
			serde_json::json!({}),
			serde_json::json!({ "gt": 1, "gte": 2 }),
			serde_json::json!({ "gte": 10, "lte": 1 }),
			serde_json::json!({ "gte": "ten" }),
			serde_json::json!({ "between": [1, 2] }),
			serde_json::json!(5),
		] {
			assert!(Range.validate(&clause(bounds.clone(), false)).is_err(), "{bounds} must fail");
		}
	}

	#[test]
	fn negated_store_matches_non_numbers() {
		let adult = clause(serde_json::json!({ "gte": 18 }), true);
		let mut store = Range.new_store(true);
		let mut out = Vec::new();

		store.insert(&adult).expect("insert");
		store.matches(Some(&Value::from("old")), &mut out).expect("match");
		store.matches(Some(&Value::from(30)), &mut out).expect("match");

		assert_eq!(out, [adult.id()]);
	}
}
