//! Keyword plugins: per-keyword validation, operand storage, and direct predicate tests.
//!
//! Every keyword has a positive and a negated form. Negated clauses are stored in their own
//! operand bucket and match exactly when the positive predicate does not, including when the field
//! is missing from the document.

mod equals;
mod exists;
mod membership;
mod range;
mod regexp;

pub use equals::Equals;
pub use exists::Exists;
pub use membership::Membership;
pub use range::Range;
pub use regexp::Regexp;

use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;

use hark_config::Keywords;
use hark_domain::{Clause, ConditionId};

use crate::{Error, Result};

/// Failures raised by keyword code carry a plain message; the engine attaches keyword and field.
pub type KeywordResult<T> = std::result::Result<T, String>;

pub trait Keyword: Send + Sync {
	fn name(&self) -> &str;

	/// Rejects clauses whose arguments this keyword cannot evaluate.
	fn validate(&self, clause: &Clause) -> KeywordResult<()>;

	/// Creates the operand store for one `(keyword, polarity, field)` bucket.
	fn new_store(&self, negated: bool) -> Box<dyn OperandStore>;

	/// Tests the positive form of `clause` against the field value, if any.
	fn test(&self, clause: &Clause, value: Option<&Value>) -> KeywordResult<bool>;
}

/// Operands of every condition sharing a keyword, polarity and field.
pub trait OperandStore: Send + Sync {
	fn insert(&mut self, clause: &Clause) -> KeywordResult<()>;

	/// Returns false when the condition was not stored here.
	fn remove(&mut self, id: ConditionId) -> bool;

	/// Appends the ids of every stored condition satisfied by `value`.
	fn matches(&self, value: Option<&Value>, out: &mut Vec<ConditionId>) -> KeywordResult<()>;

	fn contains(&self, id: ConditionId) -> bool;

	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[derive(Clone, Default)]
pub struct KeywordRegistry {
	keywords: BTreeMap<String, Arc<dyn Keyword>>,
}
impl KeywordRegistry {
	pub fn empty() -> Self {
		Self::default()
	}

	/// Builds the registry with the built-in keywords enabled by `config`.
	pub fn builtin(config: &Keywords) -> Result<Self> {
		let mut registry = Self::empty();

		for name in &config.enabled {
			let keyword: Arc<dyn Keyword> = match name.as_str() {
				"equals" => Arc::new(Equals),
				"in" => Arc::new(Membership),
				"exists" => Arc::new(Exists),
				"range" => Arc::new(Range),
				"regexp" => Arc::new(Regexp::new(config.regexp_size_limit)),
				other => return Err(Error::UnknownKeyword { name: other.to_string() }),
			};

			registry.register(keyword);
		}

		Ok(registry)
	}

	/// Adds or replaces a keyword by name.
	pub fn register(&mut self, keyword: Arc<dyn Keyword>) -> &mut Self {
		self.keywords.insert(keyword.name().to_string(), keyword);

		self
	}

	pub fn get(&self, name: &str) -> Option<&Arc<dyn Keyword>> {
		self.keywords.get(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.keywords.keys().map(String::as_str)
	}

	pub fn validate(&self, clause: &Clause) -> KeywordResult<()> {
		match self.get(clause.keyword()) {
			Some(keyword) => keyword.validate(clause),
			None => Err(format!("unknown keyword '{}'.", clause.keyword())),
		}
	}

	pub(crate) fn resolve(&self, clause: &Clause) -> Result<&Arc<dyn Keyword>> {
		self.get(clause.keyword())
			.ok_or_else(|| Error::UnknownKeyword { name: clause.keyword().to_string() })
	}
}

pub(crate) fn require_value(clause: &Clause) -> KeywordResult<&Value> {
	clause.value().ok_or_else(|| "clause requires a value.".to_string())
}

pub(crate) fn reject_unknown_args(clause: &Clause, allowed: &[&str]) -> KeywordResult<()> {
	let unknown = clause
		.args()
		.keys()
		.find(|key| key.as_str() != "field" && !allowed.contains(&key.as_str()));

	match unknown {
		Some(key) => Err(format!("unknown argument '{key}'.")),
		None => Ok(()),
	}
}
