//! Command-line interface for urifetch
//!
//! # Usage Examples
//!
//! ```bash
//! # Print a local file
//! urifetch testdata/file.yaml
//!
//! # Download over HTTPS, trusting an extra CA, into a file
//! urifetch https://example.com/manifest.yaml \
//!   --root-ca corp-ca.pem \
//!   --output manifest.yaml
//!
//! # Pick up HTTPS_PROXY changes on every request, with a deadline
//! HTTPS_PROXY=http://proxy.internal:3128 urifetch https://example.com/a.yaml \
//!   --non-cached-proxy --timeout 30s
//! ```
//!
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=urifetch_file=debug`).

use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use urifetch::file::Reader;
use urifetch::ReaderOpts;

#[derive(Parser)]
#[command(name = "urifetch")]
#[command(about = "Read a file from a local path, an embed:// bundle, or an HTTP/HTTPS URL")]
#[command(long_about = None)]
struct Cli {
    /// Local path, http(s):// URL, or embed:// URI to read
    uri: String,

    /// Write the contents here instead of stdout
    #[arg(long, short, value_name = "PATH")]
    output: Option<PathBuf>,

    #[command(flatten)]
    reader_opts: ReaderOpts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = cli.reader_opts.reader_config()?;
    tracing::debug!("Reader configuration: {:?}", config);
    let reader = Reader::new(config).context("Failed to build reader")?;

    let read = reader.read_file(&cli.uri);
    let contents = match cli.reader_opts.timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .with_context(|| format!("Timed out after {limit:?} reading {}", cli.uri))??,
        None => read.await?,
    };

    match &cli.output {
        Some(path) => {
            tokio::fs::write(path, &contents)
                .await
                .with_context(|| format!("Failed to write output file: {}", path.display()))?;
            tracing::info!("Wrote {} bytes to {}", contents.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&contents)
                .and_then(|()| stdout.flush())
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}
