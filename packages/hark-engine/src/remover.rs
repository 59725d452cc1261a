//! Reference-counted removal of filters from a scope graph.

use hark_domain::{FilterId, SubfilterId};

use crate::{Error, Result, graph::ScopeGraph};

impl ScopeGraph {
	/// Removes a filter. Subfilters and conditions are dropped with their last reference, and
	/// operand buckets are dropped once empty.
	pub fn remove(&mut self, id: &FilterId) -> Result<()> {
		self.ensure_usable()?;

		let Some(filter) = self.filters.remove(id) else {
			return Err(Error::NotFound {
				message: format!("Unable to remove filter {id}: not found in {}.", self.scope),
			});
		};
		let mut result = Ok(());

		for subfilter_id in &filter.subfilters {
			result = self.release_subfilter(id, subfilter_id);

			if result.is_err() {
				break;
			}
		}

		self.guard(result)
	}

	fn release_subfilter(
		&mut self,
		filter_id: &FilterId,
		subfilter_id: &SubfilterId,
	) -> Result<()> {
		let Some(subfilter) = self.subfilters.get_mut(subfilter_id) else {
			return Err(Error::invariant(format!(
				"filter {filter_id} references unknown subfilter {subfilter_id}."
			)));
		};

		detach(&mut subfilter.filters, filter_id, || {
			format!("subfilter {subfilter_id} does not point back to filter {filter_id}.")
		})?;

		if !subfilter.filters.is_empty() {
			let row = self.test_table.get_mut(subfilter_id).ok_or_else(|| {
				Error::invariant(format!("subfilter {subfilter_id} has no test table row."))
			})?;

			row.filter_count = row.filter_count.checked_sub(1).ok_or_else(|| {
				Error::invariant(format!("test table row of subfilter {subfilter_id} underflowed."))
			})?;

			return Ok(());
		}

		let conditions = self
			.subfilters
			.remove(subfilter_id)
			.map(|subfilter| subfilter.conditions)
			.unwrap_or_default();

		if self.test_table.remove(subfilter_id).is_none() {
			return Err(Error::invariant(format!(
				"subfilter {subfilter_id} has no test table row."
			)));
		}

		for condition_id in conditions {
			let Some(condition) = self.conditions.get_mut(&condition_id) else {
				return Err(Error::invariant(format!(
					"subfilter {subfilter_id} references unknown condition {condition_id}."
				)));
			};

			detach(&mut condition.subfilters, subfilter_id, || {
				format!("condition {condition_id} does not point back to subfilter {subfilter_id}.")
			})?;

			if condition.subfilters.is_empty()
				&& let Some(condition) = self.conditions.remove(&condition_id)
			{
				self.operands.remove(&condition.clause)?;
			}
		}

		Ok(())
	}
}

fn detach<T, F>(items: &mut Vec<T>, item: &T, describe: F) -> Result<()>
where
	T: PartialEq,
	F: FnOnce() -> String,
{
	match items.iter().position(|stored| stored == item) {
		Some(position) => {
			items.swap_remove(position);

			Ok(())
		},
		None => Err(Error::invariant(describe())),
	}
}
