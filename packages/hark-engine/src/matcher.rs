//! Document matching against a scope graph.
//!
//! Matching runs in three steps. The operand index yields every satisfied condition. Each
//! satisfied condition bumps a per-call hit counter on the subfilters using it, which also gives
//! the candidate filters. Each candidate is then evaluated as an OR over its subfilters and an AND
//! over their conditions, stopping at the first decisive result. A subfilter whose hit count is
//! below its test table condition count is rejected without walking its conditions, and subfilter
//! results are shared between candidates of the same call.

use ahash::{AHashMap, AHashSet};
use serde_json::Value;

use hark_domain::{
	ConditionId, FilterId, SubfilterId,
	eval::{all, any},
};

use crate::{Error, Result, graph::ScopeGraph};

impl ScopeGraph {
	/// Returns the ids of every filter matching the document, in ascending id order.
	pub fn matches(&self, body: &Value, document_id: Option<&str>) -> Result<Vec<FilterId>> {
		self.ensure_usable()?;

		let satisfied = self.operands.satisfied(body, document_id)?;
		let mut pass = MatchPass::new(self, satisfied.len());

		for condition_id in satisfied {
			pass.record_hit(condition_id)?;
		}

		let mut matched = Vec::new();

		for filter_id in pass.candidates() {
			if pass.filter_matches(&filter_id)? {
				matched.push(filter_id);
			}
		}

		matched.sort();

		Ok(matched)
	}

	/// Evaluates one filter with a caller-supplied condition test: OR over subfilters in stored
	/// order, AND over conditions in stored order, both short-circuiting.
	pub fn evaluate_filter<F>(&self, id: &FilterId, mut test: F) -> Result<bool>
	where
		F: FnMut(ConditionId) -> Result<bool>,
	{
		let filter = self.filters.get(id).ok_or_else(|| Error::NotFound {
			message: format!("Filter {id} not found in {}.", self.scope),
		})?;

		any(&filter.subfilters, |subfilter_id| self.evaluate_subfilter(subfilter_id, &mut test))
	}

	fn evaluate_subfilter<F>(&self, id: &SubfilterId, test: &mut F) -> Result<bool>
	where
		F: FnMut(ConditionId) -> Result<bool>,
	{
		let subfilter = self
			.subfilters
			.get(id)
			.ok_or_else(|| Error::invariant(format!("unknown subfilter {id} during evaluation.")))?;

		all(&subfilter.conditions, |condition_id| test(*condition_id))
	}
}

/// Scratch state of one matching call. Nothing here outlives the call, so concurrent readers of
/// the same graph never observe each other's counters.
struct MatchPass<'g> {
	graph: &'g ScopeGraph,
	satisfied: AHashSet<ConditionId>,
	hits: AHashMap<SubfilterId, usize>,
	decided: AHashMap<SubfilterId, bool>,
}
impl<'g> MatchPass<'g> {
	fn new(graph: &'g ScopeGraph, capacity: usize) -> Self {
		Self {
			graph,
			satisfied: AHashSet::with_capacity(capacity),
			hits: AHashMap::new(),
			decided: AHashMap::new(),
		}
	}

	fn record_hit(&mut self, condition_id: ConditionId) -> Result<()> {
		if !self.satisfied.insert(condition_id) {
			return Ok(());
		}

		let condition = self.graph.conditions.get(&condition_id).ok_or_else(|| {
			Error::invariant(format!("operand index returned unknown condition {condition_id}."))
		})?;

		for subfilter_id in &condition.subfilters {
			*self.hits.entry(*subfilter_id).or_default() += 1;
		}

		Ok(())
	}

	fn candidates(&self) -> Vec<FilterId> {
		let mut seen = AHashSet::new();

		for subfilter_id in self.hits.keys() {
			if let Some(subfilter) = self.graph.subfilters.get(subfilter_id) {
				seen.extend(subfilter.filters.iter().copied());
			}
		}

		seen.into_iter().collect()
	}

	fn filter_matches(&mut self, id: &FilterId) -> Result<bool> {
		let graph = self.graph;
		let filter = graph
			.filters
			.get(id)
			.ok_or_else(|| Error::invariant(format!("candidate filter {id} is not stored.")))?;

		any(&filter.subfilters, |subfilter_id| self.subfilter_matches(subfilter_id))
	}

	fn subfilter_matches(&mut self, id: &SubfilterId) -> Result<bool> {
		if let Some(decided) = self.decided.get(id) {
			return Ok(*decided);
		}

		let row = self
			.graph
			.test_row(id)
			.ok_or_else(|| Error::invariant(format!("subfilter {id} has no test table row.")))?;
		let hits = self.hits.get(id).copied().unwrap_or_default();
		let result = if hits < row.condition_count {
			false
		} else {
			let satisfied = &self.satisfied;
			let mut test = |condition_id: ConditionId| Ok(satisfied.contains(&condition_id));

			self.graph.evaluate_subfilter(id, &mut test)?
		};

		self.decided.insert(*id, result);

		Ok(result)
	}
}
