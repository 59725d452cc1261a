//! The deduplicated filter graph of one scope.
//!
//! Filters point at subfilters, subfilters at conditions, and every edge has a back-pointer so
//! that shared nodes can be reference counted. The test table keeps, per subfilter, how many
//! conditions it requires and how many filters still use it.

use ahash::AHashMap;
use serde::Serialize;

use hark_domain::{Clause, ConditionId, FilterId, NormalizedFilter, Scope, SubfilterId};

use crate::{Error, Result, operand_index::OperandIndex};

#[derive(Clone, Debug)]
pub struct FilterRecord {
	pub(crate) normalized: NormalizedFilter,
	pub(crate) subfilters: Vec<SubfilterId>,
}
impl FilterRecord {
	pub fn normalized(&self) -> &NormalizedFilter {
		&self.normalized
	}

	pub fn subfilters(&self) -> &[SubfilterId] {
		&self.subfilters
	}
}

#[derive(Clone, Debug)]
pub struct SubfilterRecord {
	pub(crate) filters: Vec<FilterId>,
	pub(crate) conditions: Vec<ConditionId>,
}
impl SubfilterRecord {
	pub fn filters(&self) -> &[FilterId] {
		&self.filters
	}

	pub fn conditions(&self) -> &[ConditionId] {
		&self.conditions
	}
}

#[derive(Clone, Debug)]
pub struct ConditionRecord {
	pub(crate) clause: Clause,
	pub(crate) subfilters: Vec<SubfilterId>,
}
impl ConditionRecord {
	pub fn clause(&self) -> &Clause {
		&self.clause
	}

	pub fn subfilters(&self) -> &[SubfilterId] {
		&self.subfilters
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestRow {
	pub condition_count: usize,
	pub filter_count: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
	pub filters: usize,
	pub subfilters: usize,
	pub conditions: usize,
	pub test_rows: usize,
	pub operand_buckets: usize,
}

pub struct ScopeGraph {
	pub(crate) scope: Scope,
	pub(crate) filters: AHashMap<FilterId, FilterRecord>,
	pub(crate) subfilters: AHashMap<SubfilterId, SubfilterRecord>,
	pub(crate) conditions: AHashMap<ConditionId, ConditionRecord>,
	pub(crate) test_table: AHashMap<SubfilterId, TestRow>,
	pub(crate) operands: OperandIndex,
	tainted: bool,
	detached: bool,
}
impl ScopeGraph {
	pub fn new(scope: Scope) -> Self {
		Self {
			scope,
			filters: AHashMap::new(),
			subfilters: AHashMap::new(),
			conditions: AHashMap::new(),
			test_table: AHashMap::new(),
			operands: OperandIndex::default(),
			tainted: false,
			detached: false,
		}
	}

	pub fn scope(&self) -> &Scope {
		&self.scope
	}

	pub fn filter(&self, id: &FilterId) -> Option<&FilterRecord> {
		self.filters.get(id)
	}

	pub fn filter_ids(&self) -> Vec<FilterId> {
		let mut ids = self.filters.keys().copied().collect::<Vec<_>>();

		ids.sort();

		ids
	}

	pub fn subfilter(&self, id: &SubfilterId) -> Option<&SubfilterRecord> {
		self.subfilters.get(id)
	}

	pub fn condition(&self, id: &ConditionId) -> Option<&ConditionRecord> {
		self.conditions.get(id)
	}

	pub fn test_row(&self, id: &SubfilterId) -> Option<TestRow> {
		self.test_table.get(id).copied()
	}

	pub fn operands(&self) -> &OperandIndex {
		&self.operands
	}

	pub fn is_empty(&self) -> bool {
		self.filters.is_empty()
	}

	pub fn is_tainted(&self) -> bool {
		self.tainted
	}

	pub fn stats(&self) -> GraphStats {
		GraphStats {
			filters: self.filters.len(),
			subfilters: self.subfilters.len(),
			conditions: self.conditions.len(),
			test_rows: self.test_table.len(),
			operand_buckets: self.operands.bucket_count(),
		}
	}

	/// Walks every node and edge, reporting the first broken link or count.
	pub fn check_invariants(&self) -> Result<()> {
		for (filter_id, filter) in &self.filters {
			for subfilter_id in &filter.subfilters {
				let subfilter = self.subfilters.get(subfilter_id).ok_or_else(|| {
					Error::invariant(format!(
						"filter {filter_id} references unknown subfilter {subfilter_id}."
					))
				})?;

				if !subfilter.filters.contains(filter_id) {
					return Err(Error::invariant(format!(
						"subfilter {subfilter_id} does not point back to filter {filter_id}."
					)));
				}
			}
		}

		for (subfilter_id, subfilter) in &self.subfilters {
			let row = self.test_table.get(subfilter_id).ok_or_else(|| {
				Error::invariant(format!("subfilter {subfilter_id} has no test table row."))
			})?;

			if subfilter.filters.is_empty() {
				return Err(Error::invariant(format!("subfilter {subfilter_id} is unreferenced.")));
			}
			if row.filter_count != subfilter.filters.len()
				|| row.condition_count != subfilter.conditions.len()
			{
				return Err(Error::invariant(format!(
					"test table row of subfilter {subfilter_id} is out of sync."
				)));
			}

			for filter_id in &subfilter.filters {
				let linked = self
					.filters
					.get(filter_id)
					.is_some_and(|filter| filter.subfilters.contains(subfilter_id));

				if !linked {
					return Err(Error::invariant(format!(
						"subfilter {subfilter_id} points to unrelated filter {filter_id}."
					)));
				}
			}
			for condition_id in &subfilter.conditions {
				if !self
					.conditions
					.get(condition_id)
					.is_some_and(|condition| condition.subfilters.contains(subfilter_id))
				{
					return Err(Error::invariant(format!(
						"condition {condition_id} does not point back to subfilter {subfilter_id}."
					)));
				}
			}
		}

		if self.test_table.len() != self.subfilters.len() {
			return Err(Error::invariant("test table has rows for unknown subfilters."));
		}

		for (condition_id, condition) in &self.conditions {
			if condition.subfilters.is_empty() {
				return Err(Error::invariant(format!("condition {condition_id} is unreferenced.")));
			}
			if !self.operands.contains(&condition.clause) {
				return Err(Error::invariant(format!(
					"condition {condition_id} is missing from the operand index."
				)));
			}
		}

		if self.operands.stored_conditions() != self.conditions.len()
			|| self.operands.has_empty_bucket()
		{
			return Err(Error::invariant("operand index holds stale entries."));
		}

		Ok(())
	}

	pub(crate) fn ensure_usable(&self) -> Result<()> {
		if self.tainted {
			return Err(Error::ScopeTainted { scope: self.scope.to_string() });
		}

		Ok(())
	}

	/// Marks the scope unusable when `result` reports a broken graph.
	pub(crate) fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
		if let Err(Error::InvariantViolation { message }) = &result {
			tracing::error!(scope = %self.scope, %message, "Filter graph invariant violated.");

			self.tainted = true;
		}

		result
	}

	/// Drops every filter, returning their ids. A tainted graph becomes usable again.
	pub fn clear(&mut self) -> Vec<FilterId> {
		let ids = self.filter_ids();
		let detached = self.detached;

		*self = Self::new(self.scope.clone());
		self.detached = detached;

		ids
	}

	/// True once the engine has dropped this graph from its scope map. Writers holding a stale
	/// handle must look the scope up again.
	pub(crate) fn is_detached(&self) -> bool {
		self.detached
	}

	pub(crate) fn detach(&mut self) {
		self.detached = true;
	}
}
