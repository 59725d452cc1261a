use serde_json::Value;

/// Resolves a dotted field path inside a document. Numeric segments index into arrays.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
	path.split('.').try_fold(document, |current, segment| match current {
		Value::Object(map) => map.get(segment),
		Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
		_ => None,
	})
}

#[cfg(test)]
mod tests {
	use crate::document::lookup;

	#[test]
	fn resolves_nested_paths() {
		let document = serde_json::json!({ "a": { "b": [{ "c": 1 }, { "c": 2 }] } });

		assert_eq!(lookup(&document, "a.b.1.c"), Some(&serde_json::json!(2)));
		assert_eq!(lookup(&document, "a.b.x"), None);
		assert_eq!(lookup(&document, "a.missing"), None);
		assert_eq!(lookup(&document, "a.b.0.c.d"), None);
	}
}
