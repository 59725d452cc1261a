use serde_json::Value;

use hark_engine::Engine;
use hark_testkit::{ScratchFile, engine, equals, exists, or};

fn filter_line(collection: &str, filter: Value) -> Value {
	serde_json::json!({ "index": "shop", "collection": collection, "filter": filter })
}

fn document_line(collection: &str, id: &str, body: Value) -> Value {
	serde_json::json!({ "index": "shop", "collection": collection, "id": id, "body": body })
}

fn output_lines(out: Vec<u8>) -> Vec<Value> {
	String::from_utf8(out)
		.expect("Output must be UTF-8.")
		.lines()
		.map(|line| serde_json::from_str(line).expect("Output lines must be JSON."))
		.collect()
}

fn run(
	engine: &Engine,
	filters: &ScratchFile,
	documents: &ScratchFile,
) -> (hark_replay::ReplayReport, Vec<Value>) {
	let mut out = Vec::new();
	let report = hark_replay::replay(engine, filters.path(), documents.path(), &mut out)
		.expect("Replay must succeed.");

	(report, output_lines(out))
}

#[test]
fn replays_filters_and_reports_matches() {
	let engine = engine().expect("Failed to build engine.");
	let filters = ScratchFile::json_lines(
		"hark_replay_filters",
		&[
			filter_line("orders", equals("state", "paid")),
			filter_line("orders", or([equals("state", "paid"), exists("refund")])),
			filter_line("users", equals("state", "paid")),
		],
	)
	.expect("Failed to write filters.");
	let documents = ScratchFile::json_lines(
		"hark_replay_documents",
		&[
			document_line("orders", "o1", serde_json::json!({ "state": "paid" })),
			document_line("orders", "o2", serde_json::json!({ "state": "open", "refund": 3 })),
			document_line("orders", "o3", serde_json::json!({ "state": "open" })),
		],
	)
	.expect("Failed to write documents.");
	let (report, lines) = run(&engine, &filters, &documents);

	assert_eq!(report.registered, 3);
	assert_eq!(report.skipped, 0);
	assert_eq!(report.documents, 3);
	assert_eq!(lines.len(), 3);
	assert_eq!(lines[0]["id"], "o1");
	assert_eq!(lines[0]["matches"].as_array().map(Vec::len), Some(2));
	assert_eq!(lines[1]["matches"].as_array().map(Vec::len), Some(1));
	assert_eq!(lines[2]["matches"], serde_json::json!([]));
}

#[test]
fn malformed_filter_lines_are_skipped() {
	let engine = engine().expect("Failed to build engine.");
	let filters = ScratchFile::new(
		"hark_replay_bad_filters",
		"jsonl",
		&format!(
			"{}\nnot json\n\n{}\n",
			filter_line("orders", equals("state", "paid")),
			filter_line("orders", serde_json::json!({ "equals": { "value": 1 } })),
		),
	)
	.expect("Failed to write filters.");
	let documents = ScratchFile::json_lines(
		"hark_replay_documents",
		&[document_line("orders", "o1", serde_json::json!({ "state": "paid" }))],
	)
	.expect("Failed to write documents.");
	let (report, lines) = run(&engine, &filters, &documents);

	assert_eq!(report.registered, 1);
	assert_eq!(report.skipped, 2);
	assert_eq!(lines[0]["matches"].as_array().map(Vec::len), Some(1));
}

#[test]
fn match_errors_abort_with_line_number() {
	let engine = engine().expect("Failed to build engine.");
	let paid = filter_line("orders", equals("state", "paid"));
	let filters = ScratchFile::json_lines("hark_replay_filters", &[paid])
		.expect("Failed to write filters.");
	let documents = ScratchFile::json_lines(
		"hark_replay_documents",
		&[
			document_line("orders", "o1", serde_json::json!({ "state": "paid" })),
			document_line("orders", "o2", serde_json::json!("not an object")),
		],
	)
	.expect("Failed to write documents.");
	let mut out = Vec::new();
	let err = hark_replay::replay(&engine, filters.path(), documents.path(), &mut out)
		.expect_err("Replay must fail on a non-object document.");

	assert!(err.to_string().contains(":2:"), "{err}");
}
