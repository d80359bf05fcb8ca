use clap::Parser;
use tracing_subscriber::EnvFilter;

use email_triage::cli::{self, TriageArgs};

#[tokio::main]
async fn main() {
    // Summaries go to stdout; diagnostics stay on stderr.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "email_triage=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = TriageArgs::parse();
    let code = cli::run(args).await;
    std::process::exit(code);
}
