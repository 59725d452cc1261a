use serde_json::Value;

use hark_domain::{Clause, ConditionId};

use crate::keywords::{Keyword, KeywordResult, OperandStore, reject_unknown_args};

/// `{"exists": {"field": "address.city"}}`: the field is present and not null.
pub struct Exists;
impl Keyword for Exists {
	fn name(&self) -> &str {
		"exists"
	}

	fn validate(&self, clause: &Clause) -> KeywordResult<()> {
		reject_unknown_args(clause, &[])
	}

	fn new_store(&self, negated: bool) -> Box<dyn OperandStore> {
		Box::new(ExistsStore { negated, ids: Vec::new() })
	}

	fn test(&self, _: &Clause, value: Option<&Value>) -> KeywordResult<bool> {
		Ok(present(value))
	}
}

fn present(value: Option<&Value>) -> bool {
	value.is_some_and(|value| !value.is_null())
}

struct ExistsStore {
	negated: bool,
	ids: Vec<ConditionId>,
}
impl OperandStore for ExistsStore {
	fn insert(&mut self, clause: &Clause) -> KeywordResult<()> {
		if !self.ids.contains(&clause.id()) {
			self.ids.push(clause.id());
		}

		Ok(())
	}

	fn remove(&mut self, id: ConditionId) -> bool {
		let before = self.ids.len();

		self.ids.retain(|stored| *stored != id);

		self.ids.len() != before
	}

	fn matches(&self, value: Option<&Value>, out: &mut Vec<ConditionId>) -> KeywordResult<()> {
		if present(value) != self.negated {
			out.extend_from_slice(&self.ids);
		}

		Ok(())
	}

	fn contains(&self, id: ConditionId) -> bool {
		self.ids.contains(&id)
	}

	fn len(&self) -> usize {
		self.ids.len()
	}
}
