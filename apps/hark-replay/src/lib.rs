//! Replays persisted filters into a fresh engine and matches a stream of documents against them.
//!
//! Both inputs are JSON lines. Filters look like `{"index", "collection", "filter"}` and
//! documents like `{"index", "collection", "id"?, "body"}`. One `{"id", "matches"}` line is
//! written per document.

use std::{
	fs::File,
	io::{self, BufRead, BufReader, Write},
	path::{Path, PathBuf},
};

use clap::Parser;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use hark_domain::{FilterId, Scope};
use hark_engine::{Document, Engine};

const BATCH_SIZE: usize = 256;

#[derive(Debug, Parser)]
#[command(
	version = hark_cli::VERSION,
	rename_all = "kebab",
	styles = hark_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// JSON lines of `{"index", "collection", "filter"}`.
	#[arg(long, short = 'f', value_name = "FILE")]
	pub filters: PathBuf,
	/// JSON lines of `{"index", "collection", "id"?, "body"}`.
	#[arg(long, short = 'd', value_name = "FILE")]
	pub documents: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
	pub registered: usize,
	pub skipped: usize,
	pub documents: usize,
}

#[derive(Debug, Deserialize)]
struct FilterLine {
	#[serde(flatten)]
	scope: Scope,
	filter: Value,
}

#[derive(Debug, Serialize)]
struct MatchLine<'a> {
	id: Option<&'a str>,
	matches: &'a [FilterId],
}

pub fn run(args: Args) -> color_eyre::Result<()> {
	let config = hark_config::load(&args.config)?;
	init_tracing(&config)?;
	let engine = Engine::new(&config)?;
	let stdout = io::stdout();
	let report = replay(&engine, &args.filters, &args.documents, &mut stdout.lock())?;

	tracing::info!(
		registered = report.registered,
		skipped = report.skipped,
		documents = report.documents,
		"Replay finished."
	);

	Ok(())
}

pub fn replay<W>(
	engine: &Engine,
	filters: &Path,
	documents: &Path,
	out: &mut W,
) -> color_eyre::Result<ReplayReport>
where
	W: Write,
{
	let mut report = load_filters(engine, filters)?;
	let mut batch = Vec::with_capacity(BATCH_SIZE);

	for (line_no, line) in json_lines(documents)? {
		let document: Document = serde_json::from_str(&line).map_err(|err| {
			eyre::eyre!("{}:{line_no}: invalid document line: {err}.", documents.display())
		})?;

		batch.push((line_no, document));

		if batch.len() == BATCH_SIZE {
			report.documents += flush(engine, &mut batch, documents, out)?;
		}
	}

	report.documents += flush(engine, &mut batch, documents, out)?;
	out.flush()?;

	Ok(report)
}

/// Registers every filter line. Lines that cannot be parsed or registered are logged and skipped.
pub fn load_filters(engine: &Engine, path: &Path) -> color_eyre::Result<ReplayReport> {
	let mut report = ReplayReport::default();

	for (line_no, line) in json_lines(path)? {
		let registered = serde_json::from_str::<FilterLine>(&line)
			.map_err(|err| err.to_string())
			.and_then(|entry| {
				engine.register(&entry.scope, &entry.filter).map_err(|err| err.to_string())
			});

		match registered {
			Ok(registration) => {
				tracing::debug!(line_no, filter_id = %registration.id, "Filter replayed.");

				report.registered += 1;
			},
			Err(message) => {
				tracing::warn!(path = %path.display(), line_no, %message, "Skipping filter line.");

				report.skipped += 1;
			},
		}
	}

	Ok(report)
}

fn flush<W>(
	engine: &Engine,
	batch: &mut Vec<(usize, Document)>,
	path: &Path,
	out: &mut W,
) -> color_eyre::Result<usize>
where
	W: Write,
{
	let documents = batch.drain(..).collect::<Vec<_>>();
	let (line_numbers, documents): (Vec<_>, Vec<_>) = documents.into_iter().unzip();
	let results = engine.test_batch(&documents);

	for ((line_no, document), result) in line_numbers.iter().zip(&documents).zip(results) {
		let matches = result
			.map_err(|err| eyre::eyre!("{}:{line_no}: matching failed: {err}", path.display()))?;
		let line =
			serde_json::to_string(&MatchLine { id: document.id.as_deref(), matches: &matches })?;

		writeln!(out, "{line}")?;
	}

	Ok(documents.len())
}

/// Non-blank lines of a file, numbered from 1.
fn json_lines(path: &Path) -> color_eyre::Result<Vec<(usize, String)>> {
	let file = File::open(path)
		.map_err(|err| eyre::eyre!("Failed to open {}: {err}.", path.display()))?;
	let mut lines = Vec::new();

	for (index, line) in BufReader::new(file).lines().enumerate() {
		let line = line?;

		if !line.trim().is_empty() {
			lines.push((index + 1, line));
		}
	}

	Ok(lines)
}

fn init_tracing(config: &hark_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_writer(io::stderr).with_env_filter(filter).init();
	Ok(())
}
