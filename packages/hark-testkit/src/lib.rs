mod error;

pub use error::{Error, Result};

use std::{
	env, fs,
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex,
		atomic::{AtomicU64, AtomicUsize, Ordering},
	},
};

use serde_json::Value;

use hark_config::Config;
use hark_domain::{Clause, ConditionId, fingerprint::canonical_json};
use hark_engine::{Engine, Keyword, KeywordRegistry, KeywordResult, OperandStore};

/// Equality keyword that records every predicate call.
///
/// Clones share their counters, so a test can keep one clone while the engine owns another. A
/// document value equal to the configured poison value makes the predicate fail.
#[derive(Clone)]
pub struct SpyKeyword {
	name: String,
	calls: Arc<AtomicUsize>,
	visited: Arc<Mutex<Vec<String>>>,
	poison: Option<Value>,
	forgetful: bool,
}
impl SpyKeyword {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			calls: Arc::new(AtomicUsize::new(0)),
			visited: Arc::new(Mutex::new(Vec::new())),
			poison: None,
			forgetful: false,
		}
	}

	pub fn failing_on(mut self, value: impl Into<Value>) -> Self {
		self.poison = Some(value.into());

		self
	}

	/// Operand stores that deny ever holding a condition on removal, breaking the graph.
	pub fn forgetful(mut self) -> Self {
		self.forgetful = true;

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Fields tested through [`Keyword::test`], in call order.
	pub fn visited(&self) -> Vec<String> {
		self.visited.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn reset(&self) {
		self.calls.store(0, Ordering::SeqCst);
		self.visited.lock().unwrap_or_else(|err| err.into_inner()).clear();
	}

	fn record(&self, value: Option<&Value>) -> KeywordResult<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		match (&self.poison, value) {
			(Some(poison), Some(value)) if poison == value =>
				Err(format!("poisoned value {value}.")),
			_ => Ok(()),
		}
	}
}
impl Keyword for SpyKeyword {
	fn name(&self) -> &str {
		&self.name
	}

	fn validate(&self, clause: &Clause) -> KeywordResult<()> {
		clause.value().map(|_| ()).ok_or_else(|| format!("{} requires a value.", self.name))
	}

	fn new_store(&self, negated: bool) -> Box<dyn OperandStore> {
		Box::new(SpyStore { spy: self.clone(), negated, entries: Vec::new() })
	}

	fn test(&self, clause: &Clause, value: Option<&Value>) -> KeywordResult<bool> {
		self.visited.lock().unwrap_or_else(|err| err.into_inner()).push(clause.field().to_string());
		self.record(value)?;

		Ok(same(clause.value(), value))
	}
}

struct SpyStore {
	spy: SpyKeyword,
	negated: bool,
	entries: Vec<(ConditionId, Option<Value>)>,
}
impl OperandStore for SpyStore {
	fn insert(&mut self, clause: &Clause) -> KeywordResult<()> {
		if !self.contains(clause.id()) {
			self.entries.push((clause.id(), clause.value().cloned()));
		}

		Ok(())
	}

	fn remove(&mut self, id: ConditionId) -> bool {
		if self.spy.forgetful {
			return false;
		}

		let before = self.entries.len();

		self.entries.retain(|(stored, _)| *stored != id);

		self.entries.len() != before
	}

	fn matches(&self, value: Option<&Value>, out: &mut Vec<ConditionId>) -> KeywordResult<()> {
		self.spy.record(value)?;

		for (id, expected) in &self.entries {
			if same(expected.as_ref(), value) != self.negated {
				out.push(*id);
			}
		}

		Ok(())
	}

	fn contains(&self, id: ConditionId) -> bool {
		self.entries.iter().any(|(stored, _)| *stored == id)
	}

	fn len(&self) -> usize {
		self.entries.len()
	}
}

fn same(expected: Option<&Value>, actual: Option<&Value>) -> bool {
	match (expected, actual) {
		(Some(expected), Some(actual)) => canonical_json(expected) == canonical_json(actual),
		_ => false,
	}
}

/// Engine over the built-in keywords with default limits.
pub fn engine() -> Result<Engine> {
	Ok(Engine::new(&Config::default())?)
}

/// Engine over the built-in keywords plus `spy`.
pub fn engine_with_spy(config: &Config, spy: &SpyKeyword) -> Result<Engine> {
	let mut registry = KeywordRegistry::builtin(&config.keywords)?;

	registry.register(Arc::new(spy.clone()));

	Ok(Engine::with_registry(config, registry))
}

pub fn leaf(keyword: &str, field: &str, value: impl Into<Value>) -> Value {
	serde_json::json!({ keyword: { "field": field, "value": value.into() } })
}

pub fn equals(field: &str, value: impl Into<Value>) -> Value {
	leaf("equals", field, value)
}

pub fn exists(field: &str) -> Value {
	serde_json::json!({ "exists": { "field": field } })
}

pub fn and(nodes: impl IntoIterator<Item = Value>) -> Value {
	serde_json::json!({ "and": nodes.into_iter().collect::<Vec<_>>() })
}

pub fn or(nodes: impl IntoIterator<Item = Value>) -> Value {
	serde_json::json!({ "or": nodes.into_iter().collect::<Vec<_>>() })
}

pub fn not(node: Value) -> Value {
	serde_json::json!({ "not": node })
}

/// File in the system temp directory, deleted on drop.
pub struct ScratchFile {
	path: PathBuf,
}
impl ScratchFile {
	pub fn new(prefix: &str, extension: &str, contents: &str) -> Result<Self> {
		static COUNTER: AtomicU64 = AtomicU64::new(0);

		let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
		let pid = std::process::id();
		let mut path = env::temp_dir();

		if prefix.contains(['/', '\\']) {
			return Err(Error::Message(format!(
				"Scratch file prefix {prefix:?} must not contain separators."
			)));
		}

		path.push(format!("{prefix}_{pid}_{ordinal}.{extension}"));
		fs::write(&path, contents)?;

		Ok(Self { path })
	}

	/// Writes one JSON document per line.
	pub fn json_lines<'a, I>(prefix: &str, lines: I) -> Result<Self>
	where
		I: IntoIterator<Item = &'a Value>,
	{
		let contents = lines.into_iter().map(|line| format!("{line}\n")).collect::<String>();

		Self::new(prefix, "jsonl", &contents)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}
impl Drop for ScratchFile {
	fn drop(&mut self) {
		let _ = fs::remove_file(&self.path);
	}
}
