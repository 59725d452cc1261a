mod error;
mod types;

pub use error::{Error, Result};
pub use types::{BUILTIN_KEYWORDS, Config, Keywords, Limits, Matching, Service};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}

	for (label, value) in [
		("limits.max_depth", cfg.limits.max_depth),
		("limits.max_nodes", cfg.limits.max_nodes),
		("limits.max_subfilters", cfg.limits.max_subfilters),
		("limits.max_conditions", cfg.limits.max_conditions),
		("limits.max_string_bytes", cfg.limits.max_string_bytes),
		("keywords.regexp_size_limit", cfg.keywords.regexp_size_limit),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if cfg.limits.max_depth > cfg.limits.max_nodes {
		return Err(Error::Validation {
			message: "limits.max_depth must not exceed limits.max_nodes.".to_string(),
		});
	}
	if cfg.keywords.enabled.is_empty() {
		return Err(Error::Validation {
			message: "keywords.enabled must be non-empty.".to_string(),
		});
	}

	for name in &cfg.keywords.enabled {
		if !BUILTIN_KEYWORDS.contains(&name.as_str()) {
			return Err(Error::UnknownKeyword { name: name.clone() });
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	for name in &mut cfg.keywords.enabled {
		*name = name.trim().to_ascii_lowercase();
	}

	cfg.keywords.enabled.sort();
	cfg.keywords.enabled.dedup();
}
