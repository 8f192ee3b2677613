use anyhow::Result;
use rustlite_ping::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    rustlite_ping::init_tracing();
    let cli = Cli::parse();
    rustlite_ping::run(cli).await
}
