use anyhow::Result;
use clap::Parser;
use simplebank::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    simplebank::logging::init_logging(cli.verbose);
    cli.run().await
}
