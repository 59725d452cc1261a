use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use hark_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let table = root
		.as_table_mut()
		.expect("Template config must be a table.")
		.get_mut(section)
		.and_then(Value::as_table_mut)
		.expect("Template config must include the requested section.");

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("hark_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads() {
	let path = write_temp_config(SAMPLE_CONFIG_TEMPLATE_TOML.to_string());
	let result = hark_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Sample config must be valid.");

	assert_eq!(cfg.service.log_level, "info");
	assert_eq!(cfg.limits.max_subfilters, 64);
	assert!(cfg.matching.parallel_batch);
	assert_eq!(cfg.keywords.enabled.len(), 5);
}

#[test]
fn empty_file_falls_back_to_defaults() {
	let path = write_temp_config(String::new());
	let result = hark_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Empty config must use defaults.");

	assert_eq!(cfg.limits.max_depth, 8);
	assert_eq!(cfg.limits.max_nodes, 128);
	assert_eq!(cfg.keywords.regexp_size_limit, 1 << 20);
}

#[test]
fn missing_file_reports_read_error() {
	let mut path = env::temp_dir();

	path.push("hark_config_test_does_not_exist.toml");

	let err = hark_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }), "Unexpected error: {err}");
}

#[test]
fn invalid_toml_reports_parse_error() {
	let path = write_temp_config("[limits\nmax_depth = ".to_string());
	let result = hark_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	assert!(matches!(result, Err(Error::ParseConfig { .. })));
}

#[test]
fn limits_must_be_positive() {
	let payload = sample_toml_with("limits", "max_subfilters", Value::Integer(0));
	let path = write_temp_config(payload);
	let result = hark_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected max_subfilters validation error.");

	assert!(
		err.to_string().contains("limits.max_subfilters must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn depth_cannot_exceed_node_limit() {
	let mut cfg = base_config();

	cfg.limits.max_depth = 20;
	cfg.limits.max_nodes = 10;

	let err = hark_config::validate(&cfg).expect_err("Expected depth bound validation error.");

	assert!(
		err.to_string().contains("limits.max_depth must not exceed limits.max_nodes."),
		"Unexpected error: {err}"
	);
}

#[test]
fn unknown_keywords_are_rejected() {
	let payload = sample_toml_with(
		"keywords",
		"enabled",
		Value::Array(vec![Value::String("equals".to_string()), Value::String("geo".to_string())]),
	);
	let path = write_temp_config(payload);
	let result = hark_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	match result {
		Err(Error::UnknownKeyword { name }) => assert_eq!(name, "geo"),
		other => panic!("Expected unknown keyword error, got {other:?}."),
	}
}

#[test]
fn keyword_names_are_normalized() {
	let payload = sample_toml_with(
		"keywords",
		"enabled",
		Value::Array(vec![
			Value::String(" Equals ".to_string()),
			Value::String("equals".to_string()),
			Value::String("RANGE".to_string()),
		]),
	);
	let path = write_temp_config(payload);
	let result = hark_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Normalized keywords must validate.");

	assert_eq!(cfg.keywords.enabled, vec!["equals".to_string(), "range".to_string()]);
}

#[test]
fn empty_keyword_list_is_rejected() {
	let mut cfg = base_config();

	cfg.keywords.enabled.clear();

	let err = hark_config::validate(&cfg).expect_err("Expected keywords validation error.");

	assert!(err.to_string().contains("keywords.enabled must be non-empty."));
}
