//! urifetch
//!
//! Read a file from a local path, an embedded bundle, or an HTTP/HTTPS URL
//! through one interface.
//!
//! The retrieval layer lives in the `urifetch-file` crate, re-exported here
//! as [`file`]. This crate adds the command-line options that build a
//! [`file::Reader`].
//!
//! # CLI Usage
//!
//! ```bash
//! # Local file
//! urifetch ./cluster.yaml
//!
//! # HTTPS with an extra trusted CA, re-reading HTTPS_PROXY on every request
//! urifetch https://example.com/manifest.yaml \
//!   --root-ca corp-ca.pem --non-cached-proxy --timeout 30s
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub mod config;

pub use urifetch_file as file;

use file::{ReaderConfig, TrustedRoots};

/// Options that configure how files are read
#[derive(Parser, Clone, Debug, Default)]
pub struct ReaderOpts {
    /// Extra trusted root CA certificate (PEM or DER); may be repeated
    #[arg(
        long = "root-ca",
        value_name = "PATH",
        env = "URIFETCH_ROOT_CA",
        value_delimiter = ','
    )]
    pub root_ca: Vec<PathBuf>,

    /// Re-read proxy environment variables on every request
    #[arg(long, env = "URIFETCH_NON_CACHED_PROXY")]
    pub non_cached_proxy: bool,

    /// Give up after this long (e.g. "500ms", "30s", "5m"); no limit by default
    #[arg(
        long,
        env = "URIFETCH_TIMEOUT",
        value_parser = config::duration::parse_duration
    )]
    pub timeout: Option<Duration>,
}

impl ReaderOpts {
    /// Build the reader configuration, loading every root certificate file
    pub fn reader_config(&self) -> anyhow::Result<ReaderConfig> {
        let mut config = ReaderConfig::default();

        for path in &self.root_ca {
            let roots = TrustedRoots::from_file(path)
                .with_context(|| format!("Failed to load root CA from {}", path.display()))?;
            tracing::debug!("Loaded {} root certificate(s) from {}", roots.len(), path.display());
            config = config.with_trusted_roots(roots);
        }

        if self.non_cached_proxy {
            config = config.with_non_cached_proxy();
        }

        Ok(config)
    }
}
