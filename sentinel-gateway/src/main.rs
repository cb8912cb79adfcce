use clap::Parser;
use sentinel_gateway::Cli;
use sentinel_gateway::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_main(cli).await
}
