//! Compilation of clause trees into disjunctive normal form.
//!
//! Negations are pushed down to the leaves, the tree is expanded into an OR of AND-groups, and each
//! level is put in canonical order so that logically identical filters written differently share
//! one identity.

use std::collections::BTreeMap;

use serde_json::Value;

use hark_config::Limits;

use crate::{
	Clause, Error, FilterExpr, FilterId, Result, Scope, SubfilterId, expr::FILTER_ROOT_PATH,
};

/// A filter as stored in the graph: subfilters ordered by id, each holding conditions ordered by
/// id.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedFilter {
	subfilters: Vec<Vec<Clause>>,
}
impl NormalizedFilter {
	pub fn subfilters(&self) -> &[Vec<Clause>] {
		&self.subfilters
	}

	pub fn to_value(&self) -> Value {
		Value::Array(self.subfilters.iter().map(|conditions| subfilter_value(conditions)).collect())
	}

	pub fn filter_id(&self, scope: &Scope) -> FilterId {
		FilterId::of(&serde_json::json!({
			"index": scope.index,
			"collection": scope.collection,
			"filters": self.to_value(),
		}))
	}
}

pub fn subfilter_value(conditions: &[Clause]) -> Value {
	Value::Array(conditions.iter().map(Clause::to_value).collect())
}

pub fn subfilter_id(conditions: &[Clause]) -> SubfilterId {
	SubfilterId::of(&subfilter_value(conditions))
}

pub fn normalize(expr: &FilterExpr, limits: &Limits) -> Result<NormalizedFilter> {
	let subfilters = expand(expr, false, limits)?;

	if subfilters.is_empty() {
		return Err(Error::malformed(FILTER_ROOT_PATH, "filter can never match any document."));
	}

	for conditions in &subfilters {
		if conditions.len() > limits.max_conditions {
			return Err(Error::malformed(
				FILTER_ROOT_PATH,
				format!(
					"subfilter exceeds condition limit ({}/{})",
					conditions.len(),
					limits.max_conditions
				),
			));
		}
	}

	Ok(NormalizedFilter { subfilters })
}

fn expand(expr: &FilterExpr, negate: bool, limits: &Limits) -> Result<Vec<Vec<Clause>>> {
	match (expr, negate) {
		(FilterExpr::Leaf(clause), false) => Ok(vec![vec![clause.clone()]]),
		(FilterExpr::Leaf(clause), true) => Ok(vec![vec![clause.negate()]]),
		(FilterExpr::Not(inner), _) => expand(inner, !negate, limits),
		(FilterExpr::And(nodes), false) | (FilterExpr::Or(nodes), true) =>
			conjunction(nodes, negate, limits),
		(FilterExpr::Or(nodes), false) | (FilterExpr::And(nodes), true) =>
			disjunction(nodes, negate, limits),
	}
}

fn conjunction(nodes: &[FilterExpr], negate: bool, limits: &Limits) -> Result<Vec<Vec<Clause>>> {
	let mut acc: Vec<Vec<Clause>> = vec![Vec::new()];

	for node in nodes {
		let branches = expand(node, negate, limits)?;

		check_expansion(acc.len().saturating_mul(branches.len()), limits)?;

		let mut product = Vec::with_capacity(acc.len() * branches.len());

		for left in &acc {
			for right in &branches {
				let mut conditions = left.clone();

				conditions.extend(right.iter().cloned());
				product.push(conditions);
			}
		}

		acc = compact(product);

		if acc.is_empty() {
			break;
		}
	}

	Ok(acc)
}

fn disjunction(nodes: &[FilterExpr], negate: bool, limits: &Limits) -> Result<Vec<Vec<Clause>>> {
	let mut acc = Vec::new();

	for node in nodes {
		acc.extend(expand(node, negate, limits)?);
		acc = compact(acc);

		check_expansion(acc.len(), limits)?;
	}

	Ok(acc)
}

fn check_expansion(count: usize, limits: &Limits) -> Result<()> {
	if count > limits.max_subfilters {
		return Err(Error::malformed(
			FILTER_ROOT_PATH,
			format!("filter expands beyond subfilter limit ({count}/{})", limits.max_subfilters),
		));
	}

	Ok(())
}

/// Sorts and deduplicates conditions and subfilters, dropping AND-groups that contain a
/// condition together with its negation.
fn compact(subfilters: Vec<Vec<Clause>>) -> Vec<Vec<Clause>> {
	let mut unique = BTreeMap::new();

	for mut conditions in subfilters {
		conditions.sort_by_key(Clause::id);
		conditions.dedup_by_key(|clause| clause.id());

		let contradictory = conditions.iter().enumerate().any(|(position, clause)| {
			conditions[position + 1..].iter().any(|other| clause.contradicts(other))
		});

		if contradictory {
			continue;
		}

		unique.entry(subfilter_id(&conditions)).or_insert(conditions);
	}

	unique.into_values().collect()
}

#[cfg(test)]
mod tests {
	use serde_json::Value;

	use hark_config::Limits;

	use crate::{Error, FilterExpr, NormalizedFilter, Scope, normalize::normalize};

	fn normalized(raw: Value) -> Result<NormalizedFilter, Error> {
		let limits = Limits::default();
		let expr = FilterExpr::parse(&raw, &limits, |_| Ok(()))?;

		normalize(&expr, &limits)
	}

	fn eq(field: &str, value: i64) -> Value {
		serde_json::json!({ "equals": { "field": field, "value": value } })
	}

	#[test]
	fn and_over_or_distributes() {
		let filter = normalized(serde_json::json!({
			"and": [eq("a", 1), { "or": [eq("b", 1), eq("b", 2)] }],
		}))
		.expect("valid filter");

		assert_eq!(filter.subfilters().len(), 2);
		assert!(filter.subfilters().iter().all(|conditions| conditions.len() == 2));
	}

	#[test]
	fn de_morgan_pushes_negation_to_leaves() {
		let filter = normalized(serde_json::json!({ "not": { "and": [eq("a", 1), eq("b", 2)] } }))
			.expect("valid filter");

		assert_eq!(filter.subfilters().len(), 2);

		for conditions in filter.subfilters() {
			assert_eq!(conditions.len(), 1);
			assert!(conditions[0].is_negated());
			assert_eq!(conditions[0].keyword(), "equals");
		}
	}

	#[test]
	fn double_negation_cancels() {
		let plain = normalized(eq("a", 1)).expect("valid filter");
		let doubled =
			normalized(serde_json::json!({ "not": { "not": eq("a", 1) } })).expect("valid filter");

		assert_eq!(plain, doubled);
	}

	#[test]
	fn ordering_does_not_change_identity() {
		let scope = Scope::new("idx", "col");
		let forward = normalized(serde_json::json!([[eq("a", 1), eq("b", 2)], [eq("c", 3)]]))
			.expect("valid filter");
		let backward = normalized(serde_json::json!([[eq("c", 3)], [eq("b", 2), eq("a", 1)]]))
			.expect("valid filter");

		assert_eq!(forward.filter_id(&scope), backward.filter_id(&scope));
	}

	#[test]
	fn scope_is_part_of_filter_identity() {
		let filter = normalized(eq("a", 1)).expect("valid filter");

		assert_ne!(
			filter.filter_id(&Scope::new("idx", "col")),
			filter.filter_id(&Scope::new("idx", "other"))
		);
	}

	#[test]
	fn duplicates_collapse() {
		let filter = normalized(serde_json::json!({
			"or": [
				{ "and": [eq("a", 1), eq("a", 1)] },
				eq("a", 1),
			],
		}))
		.expect("valid filter");

		assert_eq!(filter.subfilters().len(), 1);
		assert_eq!(filter.subfilters()[0].len(), 1);
	}

	#[test]
	fn contradictions_are_dropped() {
		let filter = normalized(serde_json::json!({
			"or": [
				{ "and": [eq("a", 1), { "not": eq("a", 1) }] },
				eq("b", 2),
			],
		}))
		.expect("valid filter");

		assert_eq!(filter.subfilters().len(), 1);
		assert_eq!(filter.subfilters()[0][0].field(), "b");
	}

	#[test]
	fn unsatisfiable_filters_are_rejected() {
		let result = normalized(serde_json::json!({ "and": [eq("a", 1), { "not": eq("a", 1) }] }));

		assert!(matches!(result, Err(Error::Malformed { .. })));
	}

	#[test]
	fn expansion_limit_is_enforced() {
		let or_node = |field: &str| {
			serde_json::json!({ "or": [eq(field, 1), eq(field, 2), eq(field, 3), eq(field, 4)] })
		};
		let result = normalized(serde_json::json!({
			"and": [or_node("a"), or_node("b"), or_node("c"), or_node("d")],
		}));

		match result {
			Err(Error::Malformed { message, .. }) => assert!(message.contains("subfilter limit")),
			other => panic!("expected expansion failure, got {other:?}"),
		}
	}
}
