use serde::Deserialize;

pub const BUILTIN_KEYWORDS: [&str; 5] = ["equals", "in", "exists", "range", "regexp"];

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub service: Service,
	#[serde(default)]
	pub limits: Limits,
	#[serde(default)]
	pub matching: Matching,
	#[serde(default)]
	pub keywords: Keywords,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	#[serde(default = "default_log_level")]
	pub log_level: String,
}
impl Default for Service {
	fn default() -> Self {
		Self { log_level: default_log_level() }
	}
}

/// Bounds applied to a filter expression before it reaches the graph.
#[derive(Clone, Debug, Deserialize)]
pub struct Limits {
	#[serde(default = "default_max_depth")]
	pub max_depth: usize,
	/// Clause tree node limit, counting boolean and leaf nodes.
	#[serde(default = "default_max_nodes")]
	pub max_nodes: usize,
	/// Upper bound on the number of subfilters produced by normalization.
	#[serde(default = "default_max_subfilters")]
	pub max_subfilters: usize,
	#[serde(default = "default_max_conditions")]
	pub max_conditions: usize,
	#[serde(default = "default_max_string_bytes")]
	pub max_string_bytes: usize,
}
impl Default for Limits {
	fn default() -> Self {
		Self {
			max_depth: default_max_depth(),
			max_nodes: default_max_nodes(),
			max_subfilters: default_max_subfilters(),
			max_conditions: default_max_conditions(),
			max_string_bytes: default_max_string_bytes(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Matching {
	/// Spread batch matching over the rayon pool.
	#[serde(default = "default_true")]
	pub parallel_batch: bool,
}
impl Default for Matching {
	fn default() -> Self {
		Self { parallel_batch: true }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Keywords {
	#[serde(default = "default_enabled_keywords")]
	pub enabled: Vec<String>,
	/// Compiled size limit handed to the regex builder, in bytes.
	#[serde(default = "default_regexp_size_limit")]
	pub regexp_size_limit: usize,
}
impl Default for Keywords {
	fn default() -> Self {
		Self {
			enabled: default_enabled_keywords(),
			regexp_size_limit: default_regexp_size_limit(),
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_max_depth() -> usize {
	8
}

fn default_max_nodes() -> usize {
	128
}

fn default_max_subfilters() -> usize {
	64
}

fn default_max_conditions() -> usize {
	32
}

fn default_max_string_bytes() -> usize {
	512
}

fn default_true() -> bool {
	true
}

fn default_enabled_keywords() -> Vec<String> {
	BUILTIN_KEYWORDS.iter().map(|name| name.to_string()).collect()
}

fn default_regexp_size_limit() -> usize {
	1 << 20
}
