use clap::Parser;
use std::process::ExitCode;
use tldr::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tldr::cli::run(cli).await
}

/// Log to the file named by `TLDR_LOG` if set, otherwise to stderr filtered
/// by `RUST_LOG`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    if let Ok(path) = std::env::var("TLDR_LOG") {
        match std::fs::File::create(&path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let filter = EnvFilter::new("tldr=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
                return;
            }
            Err(err) => {
                eprintln!("Failed to create log file {path}: {err}");
            }
        }
    }

    let default = if verbose { "tldr=debug" } else { "tldr=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
