//! Filter clause trees and their JSON parser.
//!
//! A filter is either a boolean tree (`and`, `or`, `not`, `bool`) over leaf clauses, or an already
//! normalized list of subfilters (an array of arrays of leaf clauses). Leaf clauses look like
//! `{"equals": {"field": "city", "value": "NYC"}, "not": true}`.

use serde_json::{Map, Value};

use hark_config::Limits;

use crate::{ConditionId, Error, Result};

pub const FILTER_ROOT_PATH: &str = "$.filter";

const BOOL_SECTIONS: [&str; 4] = ["must", "must_not", "should", "filter"];

/// A single keyword + field predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct Clause {
	keyword: String,
	field: String,
	args: Map<String, Value>,
	negated: bool,
	id: ConditionId,
}
impl Clause {
	pub fn new(
		keyword: impl Into<String>,
		args: Map<String, Value>,
		negated: bool,
	) -> Result<Self> {
		let keyword = keyword.into();
		let field = args
			.get("field")
			.and_then(Value::as_str)
			.filter(|field| !field.trim().is_empty())
			.ok_or_else(|| {
				Error::malformed(
					format!("{FILTER_ROOT_PATH}.{keyword}.field"),
					"clause requires a non-empty string field.",
				)
			})?
			.to_string();
		let id = ConditionId::of(&raw_clause(&keyword, &args, negated));

		Ok(Self { keyword, field, args, negated, id })
	}

	pub fn keyword(&self) -> &str {
		&self.keyword
	}

	pub fn field(&self) -> &str {
		&self.field
	}

	pub fn value(&self) -> Option<&Value> {
		self.args.get("value")
	}

	pub fn args(&self) -> &Map<String, Value> {
		&self.args
	}

	pub fn is_negated(&self) -> bool {
		self.negated
	}

	pub fn id(&self) -> ConditionId {
		self.id
	}

	pub fn negate(&self) -> Self {
		let negated = !self.negated;

		Self {
			keyword: self.keyword.clone(),
			field: self.field.clone(),
			args: self.args.clone(),
			negated,
			id: ConditionId::of(&raw_clause(&self.keyword, &self.args, negated)),
		}
	}

	/// True when `other` is the same predicate with the opposite polarity.
	pub fn contradicts(&self, other: &Self) -> bool {
		self.negated != other.negated && self.keyword == other.keyword && self.args == other.args
	}

	pub fn to_value(&self) -> Value {
		raw_clause(&self.keyword, &self.args, self.negated)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpr {
	And(Vec<FilterExpr>),
	Or(Vec<FilterExpr>),
	Not(Box<FilterExpr>),
	Leaf(Clause),
}
impl FilterExpr {
	/// Parses a raw filter, calling `validate` on every leaf so keyword-specific checks can reject
	/// the clause with its JSON path.
	pub fn parse<F>(raw: &Value, limits: &Limits, validate: F) -> Result<Self>
	where
		F: Fn(&Clause) -> Result<(), String>,
	{
		let mut parser = Parser { limits, validate: &validate, nodes: 0 };

		match raw {
			Value::Array(subfilters) => parser.parse_subfilter_list(subfilters, FILTER_ROOT_PATH),
			_ => parser.parse_node(raw, FILTER_ROOT_PATH, 1),
		}
	}

	pub fn to_value(&self) -> Value {
		match self {
			Self::And(nodes) =>
				serde_json::json!({ "and": nodes.iter().map(Self::to_value).collect::<Vec<_>>() }),
			Self::Or(nodes) =>
				serde_json::json!({ "or": nodes.iter().map(Self::to_value).collect::<Vec<_>>() }),
			Self::Not(node) => serde_json::json!({ "not": node.to_value() }),
			Self::Leaf(clause) => clause.to_value(),
		}
	}
}

struct Parser<'a> {
	limits: &'a Limits,
	validate: &'a dyn Fn(&Clause) -> Result<(), String>,
	nodes: usize,
}
impl Parser<'_> {
	fn track(&mut self, path: &str, depth: usize) -> Result<()> {
		self.nodes = self.nodes.saturating_add(1);

		if self.nodes > self.limits.max_nodes {
			return Err(Error::malformed(
				path,
				format!("filter exceeds node limit ({}/{})", self.nodes, self.limits.max_nodes),
			));
		}
		if depth > self.limits.max_depth {
			return Err(Error::malformed(
				path,
				format!("filter exceeds depth limit ({}/{})", depth, self.limits.max_depth),
			));
		}

		Ok(())
	}

	fn parse_subfilter_list(&mut self, subfilters: &[Value], path: &str) -> Result<FilterExpr> {
		self.track(path, 1)?;

		if subfilters.is_empty() {
			return Err(Error::malformed(path, "filter must contain at least one subfilter."));
		}

		let mut branches = Vec::with_capacity(subfilters.len());

		for (position, subfilter) in subfilters.iter().enumerate() {
			let subfilter_path = format!("{path}[{position}]");

			self.track(&subfilter_path, 2)?;

			let conditions = subfilter.as_array().ok_or_else(|| {
				Error::malformed(&subfilter_path, "subfilter must be an array of conditions.")
			})?;

			if conditions.is_empty() {
				return Err(Error::malformed(
					&subfilter_path,
					"subfilter must contain at least one condition.",
				));
			}

			let conditions = conditions
				.iter()
				.enumerate()
				.map(|(index, condition)| {
					self.parse_node(condition, &format!("{subfilter_path}[{index}]"), 3)
				})
				.collect::<Result<Vec<_>>>()?;

			branches.push(FilterExpr::And(conditions));
		}

		Ok(FilterExpr::Or(branches))
	}

	fn parse_node(&mut self, value: &Value, path: &str, depth: usize) -> Result<FilterExpr> {
		self.track(path, depth)?;

		let Some(map) = value.as_object() else {
			return Err(Error::malformed(path, "filter node must be an object."));
		};

		if map.is_empty() {
			return Err(Error::malformed(path, "filter node must not be empty."));
		}
		if map.len() == 1 {
			if let Some(args) = map.get("and") {
				return self.parse_args(args, &format!("{path}.and"), depth).map(FilterExpr::And);
			}
			if let Some(args) = map.get("or") {
				return self.parse_args(args, &format!("{path}.or"), depth).map(FilterExpr::Or);
			}
			if let Some(inner) = map.get("not") {
				if !inner.is_object() {
					return Err(Error::malformed(
						format!("{path}.not"),
						"not node requires an object operand.",
					));
				}

				return self
					.parse_node(inner, &format!("{path}.not"), depth.saturating_add(1))
					.map(|node| FilterExpr::Not(Box::new(node)));
			}
			if let Some(sections) = map.get("bool") {
				return self.parse_bool(sections, &format!("{path}.bool"), depth);
			}
		}

		self.parse_leaf(map, path).map(FilterExpr::Leaf)
	}

	fn parse_args(&mut self, value: &Value, path: &str, depth: usize) -> Result<Vec<FilterExpr>> {
		let nodes = value
			.as_array()
			.ok_or_else(|| Error::malformed(path, "operator args must be an array."))?;

		if nodes.is_empty() {
			return Err(Error::malformed(path, "operator args must contain at least one node."));
		}

		nodes
			.iter()
			.enumerate()
			.map(|(index, node)| {
				self.parse_node(node, &format!("{path}[{index}]"), depth.saturating_add(1))
			})
			.collect()
	}

	fn parse_bool(&mut self, value: &Value, path: &str, depth: usize) -> Result<FilterExpr> {
		let sections = value
			.as_object()
			.ok_or_else(|| Error::malformed(path, "bool node requires an object."))?;

		if let Some(unknown) = sections.keys().find(|key| !BOOL_SECTIONS.contains(&key.as_str())) {
			return Err(Error::malformed(
				format!("{path}.{unknown}"),
				format!("unsupported bool section '{unknown}'."),
			));
		}

		let mut conjuncts = Vec::new();

		for section in ["must", "filter"] {
			if let Some(args) = sections.get(section) {
				conjuncts.extend(self.parse_args(args, &format!("{path}.{section}"), depth)?);
			}
		}

		if let Some(args) = sections.get("must_not") {
			conjuncts.extend(
				self.parse_args(args, &format!("{path}.must_not"), depth)?
					.into_iter()
					.map(|node| FilterExpr::Not(Box::new(node))),
			);
		}
		if let Some(args) = sections.get("should") {
			let branches = self.parse_args(args, &format!("{path}.should"), depth)?;

			conjuncts.push(FilterExpr::Or(branches));
		}
		if conjuncts.is_empty() {
			return Err(Error::malformed(path, "bool node requires at least one section."));
		}

		Ok(FilterExpr::And(conjuncts))
	}

	fn parse_leaf(&mut self, map: &Map<String, Value>, path: &str) -> Result<Clause> {
		let negated = match map.get("not") {
			None => false,
			Some(Value::Bool(flag)) => *flag,
			Some(_) => {
				return Err(Error::malformed(
					format!("{path}.not"),
					"negation flag must be a boolean.",
				));
			},
		};
		let mut keywords = map.iter().filter(|(key, _)| key.as_str() != "not");
		let (keyword, args) = match (keywords.next(), keywords.next()) {
			(Some(entry), None) => entry,
			(None, _) =>
				return Err(Error::malformed(path, "condition is missing a keyword.")),
			(Some(_), Some(_)) =>
				return Err(Error::malformed(path, "condition must contain exactly one keyword.")),
		};
		let keyword_path = format!("{path}.{keyword}");
		let args = args.as_object().ok_or_else(|| {
			Error::malformed(&keyword_path, "keyword arguments must be an object.")
		})?;

		match args.get("field") {
			Some(Value::String(field)) if !field.trim().is_empty() => {},
			_ => {
				return Err(Error::malformed(
					format!("{keyword_path}.field"),
					"condition requires a non-empty string field.",
				));
			},
		}

		self.check_strings(&Value::Object(args.clone()), &keyword_path)?;

		let clause = Clause::new(keyword.as_str(), args.clone(), negated)
			.map_err(|_| Error::malformed(format!("{keyword_path}.field"), "invalid field."))?;

		(self.validate)(&clause).map_err(|message| Error::malformed(&keyword_path, message))?;

		Ok(clause)
	}

	fn check_strings(&self, value: &Value, path: &str) -> Result<()> {
		match value {
			Value::String(text) if text.len() > self.limits.max_string_bytes =>
				Err(Error::malformed(
					path,
					format!("string value exceeds {} bytes.", self.limits.max_string_bytes),
				)),
			Value::Array(items) => items
				.iter()
				.enumerate()
				.try_for_each(|(index, item)| {
					self.check_strings(item, &format!("{path}[{index}]"))
				}),
			Value::Object(map) => map
				.iter()
				.try_for_each(|(key, item)| self.check_strings(item, &format!("{path}.{key}"))),
			_ => Ok(()),
		}
	}
}

fn raw_clause(keyword: &str, args: &Map<String, Value>, negated: bool) -> Value {
	let mut raw = Map::new();

	raw.insert(keyword.to_string(), Value::Object(args.clone()));

	if negated {
		raw.insert("not".to_string(), Value::Bool(true));
	}

	Value::Object(raw)
}

#[cfg(test)]
mod tests {
	use serde_json::Value;

	use hark_config::Limits;

	use crate::{Error, FilterExpr};

	fn parse(raw: Value) -> Result<FilterExpr, Error> {
		FilterExpr::parse(&raw, &Limits::default(), |_| Ok(()))
	}

	fn leaf_count(expr: &FilterExpr) -> usize {
		match expr {
			FilterExpr::And(nodes) | FilterExpr::Or(nodes) => nodes.iter().map(leaf_count).sum(),
			FilterExpr::Not(node) => leaf_count(node),
			FilterExpr::Leaf(_) => 1,
		}
	}

	fn expect_path(raw: Value, fragment: &str) {
		match parse(raw) {
			Err(Error::Malformed { path, .. }) =>
				assert!(path.contains(fragment), "unexpected path {path}, wanted {fragment}"),
			other => panic!("expected malformed filter, got {other:?}"),
		}
	}

	#[test]
	fn parses_leaf_with_negation_flag() {
		let expr = parse(serde_json::json!({
			"equals": { "field": "city", "value": "NYC" },
			"not": true,
		}))
		.expect("valid leaf");
		let FilterExpr::Leaf(clause) = expr else {
			panic!("expected a leaf");
		};

		assert_eq!(clause.keyword(), "equals");
		assert_eq!(clause.field(), "city");
		assert_eq!(clause.value(), Some(&Value::from("NYC")));
		assert!(clause.is_negated());
	}

	#[test]
	fn negated_and_positive_clauses_have_distinct_ids() {
		let positive = parse(serde_json::json!({ "equals": { "field": "a", "value": 1 } }))
			.expect("valid leaf");
		let negative =
			parse(serde_json::json!({ "equals": { "field": "a", "value": 1 }, "not": true }))
				.expect("valid leaf");
		let (FilterExpr::Leaf(positive), FilterExpr::Leaf(negative)) = (positive, negative) else {
			panic!("expected leaves");
		};

		assert_ne!(positive.id(), negative.id());
		assert!(positive.contradicts(&negative));
		assert_eq!(positive.negate().id(), negative.id());
	}

	#[test]
	fn parses_subfilter_list_as_or_of_and() {
		let expr = parse(serde_json::json!([
			[{ "equals": { "field": "a", "value": 1 } }, { "exists": { "field": "b" } }],
			[{ "equals": { "field": "c", "value": 2 } }],
		]))
		.expect("valid subfilter list");
		let FilterExpr::Or(branches) = &expr else {
			panic!("expected or");
		};

		assert_eq!(branches.len(), 2);
		assert!(matches!(&branches[0], FilterExpr::And(conditions) if conditions.len() == 2));
		assert_eq!(leaf_count(&expr), 3);
	}

	#[test]
	fn bool_sections_expand_to_boolean_nodes() {
		let expr = parse(serde_json::json!({
			"bool": {
				"must": [{ "equals": { "field": "a", "value": 1 } }],
				"must_not": [{ "exists": { "field": "b" } }],
				"should": [
					{ "equals": { "field": "c", "value": 1 } },
					{ "equals": { "field": "c", "value": 2 } },
				],
			},
		}))
		.expect("valid bool");
		let FilterExpr::And(conjuncts) = expr else {
			panic!("expected and");
		};

		assert_eq!(conjuncts.len(), 3);
		assert!(matches!(conjuncts[1], FilterExpr::Not(_)));
		assert!(matches!(&conjuncts[2], FilterExpr::Or(nodes) if nodes.len() == 2));
	}

	#[test]
	fn rejects_unknown_bool_section() {
		expect_path(
			serde_json::json!({ "bool": { "must_maybe": [] } }),
			"$.filter.bool.must_maybe",
		);
	}

	#[test]
	fn rejects_missing_field_with_path() {
		expect_path(
			serde_json::json!({ "and": [{ "equals": { "value": 1 } }] }),
			"$.filter.and[0].equals.field",
		);
	}

	#[test]
	fn rejects_two_keywords_in_one_condition() {
		expect_path(
			serde_json::json!({
				"or": [
					{ "exists": { "field": "a" } },
					{ "exists": { "field": "a" }, "equals": { "field": "a", "value": 1 } },
				],
			}),
			"$.filter.or[1]",
		);
	}

	#[test]
	fn rejects_empty_subfilters() {
		expect_path(serde_json::json!([]), "$.filter");
		expect_path(serde_json::json!([[]]), "$.filter[0]");
	}

	#[test]
	fn rejects_non_boolean_negation_flag() {
		expect_path(
			serde_json::json!({ "exists": { "field": "a" }, "not": "yes" }),
			"$.filter.not",
		);
	}

	#[test]
	fn enforces_depth_limit() {
		let mut expr = serde_json::json!({ "exists": { "field": "a" } });

		for _ in 0..Limits::default().max_depth {
			expr = serde_json::json!({ "not": expr });
		}

		assert!(parse(expr).is_err());
	}

	#[test]
	fn enforces_node_limit() {
		let leaf = serde_json::json!({ "exists": { "field": "a" } });
		let limits = Limits::default();
		let args = vec![leaf; limits.max_nodes];
		let result = parse(serde_json::json!({ "and": args }));

		assert!(result.is_err(), "expected parse failure when node count exceeds limit");
	}

	#[test]
	fn enforces_string_limit() {
		let value = "x".repeat(Limits::default().max_string_bytes + 1);

		expect_path(
			serde_json::json!({ "equals": { "field": "a", "value": value } }),
			"$.filter.equals.value",
		);
	}

	#[test]
	fn keyword_validator_failures_carry_the_clause_path() {
		let raw = serde_json::json!({
			"or": [{ "exists": { "field": "a" } }, { "geo": { "field": "b" } }],
		});
		let result = FilterExpr::parse(&raw, &Limits::default(), |clause| {
			if clause.keyword() == "geo" {
				Err("unknown keyword 'geo'.".to_string())
			} else {
				Ok(())
			}
		});

		match result {
			Err(Error::Malformed { path, message }) => {
				assert_eq!(path, "$.filter.or[1].geo");
				assert!(message.contains("unknown keyword"));
			},
			other => panic!("expected malformed filter, got {other:?}"),
		}
	}
}
