use clap::Parser;

use conceptgraph::cli::{self, Cli};
use conceptgraph::observability::init_logging;

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = cli::run(cli).await {
        tracing::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
