use clap::Parser;

use casemig_runner::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	casemig_runner::run(Args::parse()).await
}
