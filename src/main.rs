//! copyexport binary
//!
//! Runs configured CSV exports from the command line.
//!
//! # Usage
//!
//! ```bash
//! copyexport -c exports.toml list
//! copyexport -c exports.toml run library_books -p status=LOANED -o ./out
//! ```

use copyexport::cli::CliInterface;
use copyexport::error::Result;
use tracing_subscriber::EnvFilter;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments
/// 2. Load configuration
/// 3. Initialize logging
/// 4. Execute the subcommand
///
/// # Returns
/// * `Result<()>` - Success or error
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.execute().await
}

/// Initialize logging on stderr so CSV on stdout stays clean
///
/// # Arguments
/// * `cli` - CLI interface with the effective log level; `RUST_LOG`
///   applies when no verbosity flag is given
fn initialize_logging(cli: &CliInterface) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(cli.log_filter(rust_log.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
