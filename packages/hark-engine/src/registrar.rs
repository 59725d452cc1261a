//! Insertion of normalized filters into a scope graph.

use std::collections::hash_map::Entry;

use hark_domain::{FilterId, NormalizedFilter, expr::FILTER_ROOT_PATH, normalize};

use crate::{
	Error, Result,
	graph::{ConditionRecord, FilterRecord, ScopeGraph, SubfilterRecord, TestRow},
	keywords::KeywordRegistry,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOutcome {
	pub id: FilterId,
	/// True when at least one new subfilter was created.
	pub diff: bool,
}

impl ScopeGraph {
	/// Stores `filter`, sharing any subfilter or condition the graph already holds. Storing an
	/// already known filter changes nothing.
	pub fn store(
		&mut self,
		filter: &NormalizedFilter,
		registry: &KeywordRegistry,
	) -> Result<StoreOutcome> {
		self.ensure_usable()?;

		let id = filter.filter_id(&self.scope);

		if self.filters.contains_key(&id) {
			return Ok(StoreOutcome { id, diff: false });
		}

		// Anything a keyword refuses would fail halfway through linking; check before mutating.
		for (position, conditions) in filter.subfilters().iter().enumerate() {
			for (offset, clause) in conditions.iter().enumerate() {
				let keyword = registry.resolve(clause)?;

				keyword.validate(clause).map_err(|message| Error::MalformedFilter {
					path: format!("{FILTER_ROOT_PATH}[{position}][{offset}].{}", clause.keyword()),
					message,
				})?;
			}
		}

		let result = self.link(id, filter, registry);

		self.guard(result)
	}

	/// Reports whether storing `filter` would create a new subfilter, without mutating anything.
	pub fn would_create(&self, filter: &NormalizedFilter) -> bool {
		if self.filters.contains_key(&filter.filter_id(&self.scope)) {
			return false;
		}

		filter
			.subfilters()
			.iter()
			.any(|conditions| !self.subfilters.contains_key(&normalize::subfilter_id(conditions)))
	}

	fn link(
		&mut self,
		id: FilterId,
		filter: &NormalizedFilter,
		registry: &KeywordRegistry,
	) -> Result<StoreOutcome> {
		let mut diff = false;
		let mut subfilter_ids = Vec::with_capacity(filter.subfilters().len());

		for conditions in filter.subfilters() {
			let subfilter_id = normalize::subfilter_id(conditions);

			subfilter_ids.push(subfilter_id);

			if let Some(subfilter) = self.subfilters.get_mut(&subfilter_id) {
				let row = self.test_table.get_mut(&subfilter_id).ok_or_else(|| {
					Error::invariant(format!("subfilter {subfilter_id} has no test table row."))
				})?;

				subfilter.filters.push(id);
				row.filter_count += 1;

				continue;
			}

			diff = true;

			let mut subfilter = SubfilterRecord {
				filters: vec![id],
				conditions: Vec::with_capacity(conditions.len()),
			};

			for clause in conditions {
				let condition_id = clause.id();

				subfilter.conditions.push(condition_id);

				match self.conditions.entry(condition_id) {
					Entry::Occupied(entry) => entry.into_mut().subfilters.push(subfilter_id),
					Entry::Vacant(entry) => {
						self.operands.insert(clause, registry).map_err(refused_condition)?;
						entry.insert(ConditionRecord {
							clause: clause.clone(),
							subfilters: vec![subfilter_id],
						});
					},
				}
			}

			let row = TestRow { condition_count: subfilter.conditions.len(), filter_count: 1 };

			self.test_table.insert(subfilter_id, row);
			self.subfilters.insert(subfilter_id, subfilter);
		}

		self.filters
			.insert(id, FilterRecord { normalized: filter.clone(), subfilters: subfilter_ids });

		Ok(StoreOutcome { id, diff })
	}
}

/// Keywords validate clauses at parse time, so a store refusing one means the graph is unsound.
fn refused_condition(err: Error) -> Error {
	match err {
		Error::Predicate { keyword, field, message } => Error::invariant(format!(
			"keyword {keyword} refused a validated condition on field {field}: {message}"
		)),
		other => other,
	}
}
