//! campus-swap: command-line client for the campus marketplace.
//! Logging goes to stderr; set `RUST_LOG` to raise it above `warn`.

use std::io;
use std::process;

use campus_swap_app::cli::{self, Cli};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    let result = rt.block_on(async {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        cli::run(args, &mut out).await
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
