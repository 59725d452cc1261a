//! Recursive boolean evaluation with short-circuit semantics.
//!
//! AND stops at the first false operand, OR at the first true one, both scanning left to right.
//! The graph walk at match time reuses [`all`] and [`any`] over subfilters and conditions.

use crate::{Clause, FilterExpr};

/// Left-to-right conjunction; later items are never evaluated once one is false.
pub fn all<I, F, E>(items: I, mut test: F) -> Result<bool, E>
where
	I: IntoIterator,
	F: FnMut(I::Item) -> Result<bool, E>,
{
	for item in items {
		if !test(item)? {
			return Ok(false);
		}
	}

	Ok(true)
}

/// Left-to-right disjunction; later items are never evaluated once one is true.
pub fn any<I, F, E>(items: I, mut test: F) -> Result<bool, E>
where
	I: IntoIterator,
	F: FnMut(I::Item) -> Result<bool, E>,
{
	for item in items {
		if test(item)? {
			return Ok(true);
		}
	}

	Ok(false)
}

impl FilterExpr {
	/// Evaluates the tree, asking `test` for the positive truth value of each visited leaf.
	/// Leaf negation flags and `not` nodes are applied here.
	pub fn evaluate<F, E>(&self, test: &mut F) -> Result<bool, E>
	where
		F: FnMut(&Clause) -> Result<bool, E>,
	{
		match self {
			Self::And(nodes) => all(nodes, |node| node.evaluate(test)),
			Self::Or(nodes) => any(nodes, |node| node.evaluate(test)),
			Self::Not(node) => node.evaluate(test).map(|passed| !passed),
			Self::Leaf(clause) => test(clause).map(|passed| passed != clause.is_negated()),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{cell::RefCell, convert::Infallible};

	use hark_config::Limits;

	use crate::FilterExpr;

	fn leaf(field: &str) -> serde_json::Value {
		serde_json::json!({ "exists": { "field": field } })
	}

	fn tree(raw: serde_json::Value) -> FilterExpr {
		FilterExpr::parse(&raw, &Limits::default(), |_| Ok(())).expect("valid filter")
	}

	fn run(expr: &FilterExpr, outcomes: &[(&str, bool)]) -> (bool, Vec<String>) {
		let calls = RefCell::new(Vec::new());
		let mut test = |clause: &crate::Clause| -> Result<bool, Infallible> {
			calls.borrow_mut().push(clause.field().to_string());

			Ok(outcomes
				.iter()
				.find(|(field, _)| *field == clause.field())
				.map(|(_, outcome)| *outcome)
				.unwrap_or(false))
		};
		let Ok(result) = expr.evaluate(&mut test);

		(result, calls.into_inner())
	}

	#[test]
	fn and_runs_every_operand_when_all_pass() {
		let expr = tree(serde_json::json!({ "and": [leaf("a"), leaf("b"), leaf("c")] }));
		let (result, calls) = run(&expr, &[("a", true), ("b", true), ("c", true)]);

		assert!(result);
		assert_eq!(calls, vec!["a", "b", "c"]);
	}

	#[test]
	fn and_stops_at_first_false() {
		let expr = tree(serde_json::json!({ "and": [leaf("a"), leaf("b"), leaf("c")] }));
		let (result, calls) = run(&expr, &[("a", true), ("b", false), ("c", true)]);

		assert!(!result);
		assert_eq!(calls, vec!["a", "b"]);

		let (result, calls) = run(&expr, &[("a", false)]);

		assert!(!result);
		assert_eq!(calls, vec!["a"]);
	}

	#[test]
	fn or_stops_at_first_true() {
		let expr = tree(serde_json::json!({ "or": [leaf("a"), leaf("b"), leaf("c")] }));
		let (result, calls) = run(&expr, &[("a", true)]);

		assert!(result);
		assert_eq!(calls, vec!["a"]);

		let (result, calls) = run(&expr, &[]);

		assert!(!result);
		assert_eq!(calls, vec!["a", "b", "c"]);
	}

	#[test]
	fn negation_flags_invert_leaf_results() {
		let expr = tree(serde_json::json!({ "exists": { "field": "a" }, "not": true }));

		assert!(run(&expr, &[("a", false)]).0);
		assert!(!run(&expr, &[("a", true)]).0);
	}

	#[test]
	fn nested_trees_short_circuit_at_every_level() {
		let expr = tree(serde_json::json!({
			"or": [
				{ "and": [leaf("a"), leaf("b")] },
				{ "not": leaf("c") },
				leaf("d"),
			],
		}));
		let (result, calls) = run(&expr, &[("a", false), ("c", false)]);

		assert!(result);
		assert_eq!(calls, vec!["a", "c"]);
	}

	#[test]
	fn errors_propagate_without_a_result() {
		let expr = tree(serde_json::json!({ "and": [leaf("a"), leaf("b")] }));
		let mut test = |clause: &crate::Clause| {
			if clause.field() == "a" { Err("boom".to_string()) } else { Ok(true) }
		};

		assert_eq!(expr.evaluate(&mut test), Err("boom".to_string()));
	}
}
