use regex::{Regex, RegexBuilder};
use serde_json::Value;

use hark_domain::{Clause, ConditionId};

use crate::keywords::{Keyword, KeywordResult, OperandStore, reject_unknown_args, require_value};

/// `{"regexp": {"field": "name", "value": "^jo", "flags": "i"}}`
pub struct Regexp {
	size_limit: usize,
}
impl Regexp {
	pub fn new(size_limit: usize) -> Self {
		Self { size_limit }
	}

	fn compile(&self, clause: &Clause) -> KeywordResult<Regex> {
		let Value::String(pattern) = require_value(clause)? else {
			return Err("regexp expects a string pattern.".to_string());
		};
		let flags = match clause.args().get("flags") {
			None => "",
			Some(Value::String(flags)) => flags.as_str(),
			Some(_) => return Err("regexp flags must be a string.".to_string()),
		};
		let mut builder = RegexBuilder::new(pattern);

		builder.size_limit(self.size_limit);

		for flag in flags.chars() {
			match flag {
				'i' => builder.case_insensitive(true),
				'm' => builder.multi_line(true),
				's' => builder.dot_matches_new_line(true),
				other => return Err(format!("unsupported regexp flag '{other}'.")),
			};
		}

		builder.build().map_err(|err| format!("invalid pattern: {err}"))
	}
}
impl Keyword for Regexp {
	fn name(&self) -> &str {
		"regexp"
	}

	fn validate(&self, clause: &Clause) -> KeywordResult<()> {
		reject_unknown_args(clause, &["value", "flags"])?;
		self.compile(clause).map(|_| ())
	}

	fn new_store(&self, negated: bool) -> Box<dyn OperandStore> {
		Box::new(RegexpStore { size_limit: self.size_limit, negated, entries: Vec::new() })
	}

	fn test(&self, clause: &Clause, value: Option<&Value>) -> KeywordResult<bool> {
		let regex = self.compile(clause)?;

		Ok(value.and_then(Value::as_str).is_some_and(|text| regex.is_match(text)))
	}
}

struct RegexpStore {
	size_limit: usize,
	negated: bool,
	entries: Vec<(ConditionId, Regex)>,
}
impl OperandStore for RegexpStore {
	fn insert(&mut self, clause: &Clause) -> KeywordResult<()> {
		if self.contains(clause.id()) {
			return Ok(());
		}

		let regex = Regexp::new(self.size_limit).compile(clause)?;

		self.entries.push((clause.id(), regex));

		Ok(())
	}

	fn remove(&mut self, id: ConditionId) -> bool {
		let before = self.entries.len();

		self.entries.retain(|(stored, _)| *stored != id);

		self.entries.len() != before
	}

	fn matches(&self, value: Option<&Value>, out: &mut Vec<ConditionId>) -> KeywordResult<()> {
		let text = value.and_then(Value::as_str);

		for (id, regex) in &self.entries {
			if text.is_some_and(|text| regex.is_match(text)) != self.negated {
				out.push(*id);
			}
		}

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

	use crate::keywords::{Keyword, Regexp};

	fn clause(args: Value) -> Clause {
		let Value::Object(args) = args else { unreachable!() };

		Clause::new("regexp", args, false).expect("valid clause")
	}

	#[test]
	fn case_insensitive_flag() {
		let keyword = Regexp::new(1 << 20);
		let name = clause(serde_json::json!({ "field": "name", "value": "^jo", "flags": "i" }));

		assert_eq!(keyword.test(&name, Some(&Value::from("John"))), Ok(true));
		assert_eq!(keyword.test(&name, Some(&Value::from(42))), Ok(false));
	}

	#[test]
	fn size_limit_rejects_large_programs() {
		let keyword = Regexp::new(64);
		let heavy = clause(serde_json::json!({ "field": "name", "value": "\\w{100}" }));

		assert!(keyword.validate(&heavy).is_err());
	}

	#[test]
	fn bad_patterns_and_flags_are_rejected() {
		let keyword = Regexp::new(1 << 20);

		assert!(
			keyword.validate(&clause(serde_json::json!({ "field": "n", "value": "(" }))).is_err()
		);
		assert!(
			keyword
				.validate(&clause(serde_json::json!({ "field": "n", "value": "a", "flags": "x" })))
				.is_err()
		);
	}
}
