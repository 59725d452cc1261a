//! Per-scope operand index: (keyword, polarity) → field → operand store.

use ahash::AHashMap;
use serde_json::Value;

use hark_domain::{Clause, ConditionId, document};

use crate::{
	Error, Result,
	keywords::{KeywordRegistry, OperandStore},
};

/// Field resolved from the document id when the body does not carry it.
pub const DOCUMENT_ID_FIELD: &str = "_id";

/// Resolves `field` in the document body, falling back to the document id for `_id`.
pub fn field_value<'a>(
	body: &'a Value,
	field: &str,
	id_value: Option<&'a Value>,
) -> Option<&'a Value> {
	document::lookup(body, field).or_else(|| id_value.filter(|_| field == DOCUMENT_ID_FIELD))
}

/// Polarity is part of the key, not of the name: `notequals` and negated `equals` are distinct
/// buckets.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BucketKey {
	keyword: String,
	negated: bool,
}
impl BucketKey {
	fn of(clause: &Clause) -> Self {
		Self { keyword: clause.keyword().to_string(), negated: clause.is_negated() }
	}

	fn label(&self) -> String {
		if self.negated { format!("not {}", self.keyword) } else { self.keyword.clone() }
	}
}

#[derive(Default)]
pub struct OperandIndex {
	buckets: AHashMap<BucketKey, AHashMap<String, Box<dyn OperandStore>>>,
}
impl OperandIndex {
	pub fn insert(&mut self, clause: &Clause, registry: &KeywordRegistry) -> Result<()> {
		let keyword = registry.resolve(clause)?;
		let key = BucketKey::of(clause);
		let label = key.label();
		let store = self
			.buckets
			.entry(key)
			.or_default()
			.entry(clause.field().to_string())
			.or_insert_with(|| keyword.new_store(clause.is_negated()));

		store.insert(clause).map_err(|message| Error::Predicate {
			keyword: label,
			field: clause.field().to_string(),
			message,
		})
	}

	/// Removes one condition, dropping its field bucket and keyword bucket once they are empty.
	pub fn remove(&mut self, clause: &Clause) -> Result<()> {
		let key = BucketKey::of(clause);
		let keyword = key.label();
		let Some(fields) = self.buckets.get_mut(&key) else {
			return Err(Error::invariant(format!("operand index has no '{keyword}' bucket.")));
		};
		let Some(store) = fields.get_mut(clause.field()) else {
			return Err(Error::invariant(format!(
				"operand index has no '{keyword}' bucket for field '{}'.",
				clause.field()
			)));
		};

		if !store.remove(clause.id()) {
			return Err(Error::invariant(format!(
				"condition {} is missing from its '{keyword}' operand bucket.",
				clause.id()
			)));
		}
		if store.is_empty() {
			fields.remove(clause.field());
		}
		if fields.is_empty() {
			self.buckets.remove(&key);
		}

		Ok(())
	}

	/// Collects every stored condition satisfied by the document.
	pub fn satisfied(&self, body: &Value, document_id: Option<&str>) -> Result<Vec<ConditionId>> {
		let id_value = document_id.map(Value::from);
		let mut out = Vec::new();

		for (key, fields) in &self.buckets {
			for (field, store) in fields {
				let value = field_value(body, field, id_value.as_ref());

				store.matches(value, &mut out).map_err(|message| Error::Predicate {
					keyword: key.label(),
					field: field.clone(),
					message,
				})?;
			}
		}

		Ok(out)
	}

	pub fn contains(&self, clause: &Clause) -> bool {
		self.buckets
			.get(&BucketKey::of(clause))
			.and_then(|fields| fields.get(clause.field()))
			.is_some_and(|store| store.contains(clause.id()))
	}

	pub fn has_field(&self, field: &str) -> bool {
		self.buckets.values().any(|fields| fields.contains_key(field))
	}

	pub fn bucket_count(&self) -> usize {
		self.buckets.values().map(|fields| fields.len()).sum()
	}

	pub(crate) fn stored_conditions(&self) -> usize {
		self.buckets.values().flat_map(|fields| fields.values()).map(|store| store.len()).sum()
	}

	pub(crate) fn has_empty_bucket(&self) -> bool {
		self.buckets
			.values()
			.any(|fields| fields.is_empty() || fields.values().any(|store| store.is_empty()))
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}
}
