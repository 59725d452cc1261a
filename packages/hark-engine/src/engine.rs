use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hark_config::{Config, Limits};
use hark_domain::{Clause, FilterExpr, FilterId, NormalizedFilter, Scope, normalize};

use crate::{
	Error, Result,
	graph::{GraphStats, ScopeGraph},
	keywords::KeywordRegistry,
	operand_index,
};

type GraphHandle = Arc<RwLock<ScopeGraph>>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Registration {
	pub id: FilterId,
	pub scope: Scope,
	/// True when the graph gained at least one subfilter.
	pub diff: bool,
	/// The normalized filter body.
	pub filter: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterInfo {
	pub id: FilterId,
	pub scope: Scope,
	pub filter: Value,
}

/// A document to match, addressed to one scope.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Document {
	#[serde(flatten)]
	pub scope: Scope,
	#[serde(default)]
	pub id: Option<String>,
	pub body: Value,
}

/// Thread-safe entry point owning one filter graph per scope.
///
/// Each scope graph sits behind its own lock, so matching in one scope never waits on writers in
/// another. Lock order is scope map, then scope graph, then filter directory. Empty scope graphs
/// are dropped from the scope map; a writer that finds its graph detached retries.
pub struct Engine {
	limits: Limits,
	parallel_batch: bool,
	registry: KeywordRegistry,
	scopes: RwLock<AHashMap<Scope, GraphHandle>>,
	directory: RwLock<AHashMap<FilterId, Scope>>,
}
impl Engine {
	pub fn new(config: &Config) -> Result<Self> {
		let registry = KeywordRegistry::builtin(&config.keywords)?;

		Ok(Self::with_registry(config, registry))
	}

	pub fn with_registry(config: &Config, registry: KeywordRegistry) -> Self {
		Self {
			limits: config.limits.clone(),
			parallel_batch: config.matching.parallel_batch,
			registry,
			scopes: RwLock::new(AHashMap::new()),
			directory: RwLock::new(AHashMap::new()),
		}
	}

	pub fn registry(&self) -> &KeywordRegistry {
		&self.registry
	}

	/// Parses, validates and normalizes a raw filter without touching any graph.
	pub fn compile(&self, raw: &Value) -> Result<NormalizedFilter> {
		let expr = FilterExpr::parse(raw, &self.limits, |clause| self.registry.validate(clause))?;

		Ok(normalize::normalize(&expr, &self.limits)?)
	}

	pub fn register(&self, scope: &Scope, raw: &Value) -> Result<Registration> {
		let normalized = self.compile(raw)?;
		let outcome = loop {
			let handle = self.graph_or_create(scope);
			let mut graph = write(&handle);

			if graph.is_detached() {
				continue;
			}

			let outcome = graph
				.store(&normalized, &self.registry)
				.inspect_err(|err| warn_tainted(scope, err))?;

			write(&self.directory).insert(outcome.id, scope.clone());

			break outcome;
		};

		tracing::debug!(%scope, filter_id = %outcome.id, diff = outcome.diff, "Filter registered.");

		Ok(Registration {
			id: outcome.id,
			scope: scope.clone(),
			diff: outcome.diff,
			filter: normalized.to_value(),
		})
	}

	/// Dry run of [`Engine::register`]: reports the id and whether the graph would grow.
	pub fn validate(&self, scope: &Scope, raw: &Value) -> Result<Registration> {
		let normalized = self.compile(raw)?;
		let id = normalized.filter_id(scope);
		let diff = match self.graph(scope) {
			Some(handle) => read(&handle).would_create(&normalized),
			None => true,
		};

		Ok(Registration { id, scope: scope.clone(), diff, filter: normalized.to_value() })
	}

	pub fn remove(&self, id: &FilterId) -> Result<()> {
		let not_found = || Error::NotFound {
			message: format!("Unable to remove filter {id}: filter not found."),
		};
		let scope = read(&self.directory).get(id).cloned().ok_or_else(not_found)?;
		let emptied = loop {
			let handle = self.graph(&scope).ok_or_else(not_found)?;
			let mut graph = write(&handle);

			if graph.is_detached() {
				continue;
			}

			graph.remove(id).inspect_err(|err| warn_tainted(&scope, err))?;
			write(&self.directory).remove(id);

			break graph.is_empty();
		};

		tracing::debug!(%scope, filter_id = %id, "Filter removed.");

		if emptied {
			self.prune(&scope);
		}

		Ok(())
	}

	/// Returns the ids of every filter of `scope` matching the document, in ascending id order.
	pub fn test(
		&self,
		scope: &Scope,
		body: &Value,
		document_id: Option<&str>,
	) -> Result<Vec<FilterId>> {
		if !body.is_object() {
			return Err(Error::InvalidDocument {
				message: "document body must be a JSON object.".to_string(),
			});
		}

		let Some(handle) = self.graph(scope) else {
			return Ok(Vec::new());
		};
		let graph = read(&handle);

		graph.matches(body, document_id).inspect_err(|err| warn_tainted(scope, err))
	}

	/// Matches several documents, one result per document in input order.
	pub fn test_batch(&self, documents: &[Document]) -> Vec<Result<Vec<FilterId>>> {
		let test = |document: &Document| {
			self.test(&document.scope, &document.body, document.id.as_deref())
		};

		if self.parallel_batch {
			documents.par_iter().map(test).collect()
		} else {
			documents.iter().map(test).collect()
		}
	}

	/// Evaluates a filter expression directly against a document, without registering it.
	pub fn test_expression(
		&self,
		raw: &Value,
		body: &Value,
		document_id: Option<&str>,
	) -> Result<bool> {
		let expr = FilterExpr::parse(raw, &self.limits, |clause| self.registry.validate(clause))?;
		let id_value = document_id.map(Value::from);

		expr.evaluate(&mut |clause: &Clause| {
			let keyword = self.registry.resolve(clause)?;
			let value = operand_index::field_value(body, clause.field(), id_value.as_ref());

			keyword.test(clause, value).map_err(|message| Error::Predicate {
				keyword: clause.keyword().to_string(),
				field: clause.field().to_string(),
				message,
			})
		})
	}

	pub fn exists(&self, id: &FilterId) -> bool {
		read(&self.directory).contains_key(id)
	}

	pub fn filter(&self, id: &FilterId) -> Result<FilterInfo> {
		let not_found = || Error::NotFound { message: format!("Filter {id} not found.") };
		let scope = read(&self.directory).get(id).cloned().ok_or_else(not_found)?;
		let handle = self.graph(&scope).ok_or_else(not_found)?;
		let graph = read(&handle);
		let record = graph.filter(id).ok_or_else(not_found)?;

		Ok(FilterInfo { id: *id, scope, filter: record.normalized().to_value() })
	}

	pub fn filters(&self, scope: &Scope) -> Vec<FilterId> {
		self.graph(scope).map(|handle| read(&handle).filter_ids()).unwrap_or_default()
	}

	/// Scopes currently holding at least one filter.
	pub fn scopes(&self) -> Vec<Scope> {
		let handles = read(&self.scopes).values().cloned().collect::<Vec<_>>();
		let mut scopes = handles
			.iter()
			.filter_map(|handle| {
				let graph = read(handle);

				(!graph.is_empty()).then(|| graph.scope().clone())
			})
			.collect::<Vec<_>>();

		scopes.sort();

		scopes
	}

	/// Drops every filter of `scope` together with its graph. This also recovers a tainted scope.
	pub fn remove_scope(&self, scope: &Scope) -> Vec<FilterId> {
		let mut scopes = write(&self.scopes);
		let Some(handle) = scopes.remove(scope) else {
			return Vec::new();
		};
		let mut graph = write(&handle);
		let ids = graph.clear();

		graph.detach();
		// A failed removal can leave directory entries the graph no longer knows about.
		write(&self.directory).retain(|_, owner| owner != scope);

		tracing::debug!(%scope, removed = ids.len(), "Scope removed.");

		ids
	}

	pub fn clear(&self) {
		let scopes = read(&self.scopes).keys().cloned().collect::<Vec<_>>();

		for scope in scopes {
			self.remove_scope(&scope);
		}
	}

	pub fn stats(&self, scope: &Scope) -> Option<GraphStats> {
		self.graph(scope).map(|handle| read(&handle).stats())
	}

	/// Runs `inspect` against the graph of `scope` under its read lock.
	pub fn inspect<T, F>(&self, scope: &Scope, inspect: F) -> Option<T>
	where
		F: FnOnce(&ScopeGraph) -> T,
	{
		self.graph(scope).map(|handle| inspect(&*read(&handle)))
	}

	fn graph(&self, scope: &Scope) -> Option<GraphHandle> {
		read(&self.scopes).get(scope).cloned()
	}

	/// Drops the graph of `scope` if it holds no filter. Tainted graphs stay until `remove_scope`.
	fn prune(&self, scope: &Scope) {
		let mut scopes = write(&self.scopes);
		let Some(handle) = scopes.get(scope).cloned() else {
			return;
		};
		let mut graph = write(&handle);

		if graph.is_empty() && !graph.is_tainted() {
			graph.detach();
			scopes.remove(scope);

			tracing::debug!(%scope, "Empty scope dropped.");
		}
	}

	fn graph_or_create(&self, scope: &Scope) -> GraphHandle {
		if let Some(handle) = self.graph(scope) {
			return handle;
		}

		write(&self.scopes)
			.entry(scope.clone())
			.or_insert_with(|| Arc::new(RwLock::new(ScopeGraph::new(scope.clone()))))
			.clone()
	}
}

fn warn_tainted(scope: &Scope, err: &Error) {
	if let Error::ScopeTainted { .. } = err {
		tracing::warn!(%scope, "Rejected operation on tainted scope.");
	}
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
	lock.read().unwrap_or_else(|err| err.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
	lock.write().unwrap_or_else(|err| err.into_inner())
}
