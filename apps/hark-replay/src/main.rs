use clap::Parser;

fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = hark_replay::Args::parse();
	hark_replay::run(args)
}
