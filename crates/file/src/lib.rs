//! Uniform file retrieval from the local filesystem, an embedded bundle, or HTTP/HTTPS
//!
//! A [`Reader`] turns a URI into the bytes it addresses, whatever the
//! transport. It is configured once and never changes afterwards.
//!
//! # Source Types
//!
//! - **Local**: any string without a recognised scheme, read as a path
//! - **Embedded**: `embed://path/in/bundle`, read from a [`BundledFs`]
//! - **HTTP/HTTPS**: `http://` and `https://` URLs, fetched with one GET
//!
//! # HTTPS and proxies
//!
//! Extra trusted roots are added on top of the platform store, never in
//! place of it. Proxies come from `HTTPS_PROXY`/`HTTP_PROXY`/`NO_PROXY`,
//! read once when the reader is built or, with
//! [`ReaderOption::NonCachedProxy`], on every request. HTTPS requests through
//! a proxy are tunnelled with `CONNECT`.
//!
//! # Example
//!
//! ```ignore
//! use urifetch_file::{MemoryFs, Reader, ReaderConfig, TrustedRoots};
//!
//! let roots = TrustedRoots::from_pem(&std::fs::read("corp-ca.pem")?)?;
//! let reader = Reader::new(
//!     ReaderConfig::default()
//!         .with_trusted_roots(roots)
//!         .with_embedded_fs(MemoryFs::from_iter([("config/default.yaml", DEFAULTS)]))
//!         .with_non_cached_proxy(),
//! )?;
//!
//! let manifest = reader.read_file("https://example.com/manifest.yaml").await?;
//! let defaults = reader.read_file("embed:///config/default.yaml").await?;
//! let local = reader.read_file("./cluster.yaml").await?;
//! ```

mod embedded;
mod error;
mod http;
mod local;
mod proxy;
mod reader;
mod tls;

use std::path::PathBuf;
use url::Url;

pub use embedded::{BundledFs, EmbeddedAssets, MemoryFs};
pub use error::{Error, ErrorKind, Result};
pub use local::LocalFileReader;
pub use proxy::{InvalidProxy, ProxyEnv, ProxyPolicy};
pub use reader::{Reader, ReaderConfig, ReaderOption};
pub use tls::TrustedRoots;

/// Scheme of URIs resolved against the embedded filesystem
pub const EMBED_SCHEME: &str = "embed";

/// Where a URI points, decided from its scheme alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Local filesystem path (the whole input string)
    Local(PathBuf),
    /// Path inside the embedded filesystem, without leading separators
    Embedded(String),
    /// HTTP/HTTPS URL
    Http(Url),
}

impl Source {
    /// Parse a string into a Source
    ///
    /// - `http://` or `https://` -> Http
    /// - `embed://` -> Embedded
    /// - Everything else -> Local
    ///
    /// Scheme names are case-insensitive. An empty scheme (`:foo`) or a
    /// control character anywhere in the input is a malformed URI.
    pub fn parse(uri: &str) -> Result<Self> {
        let Some((scheme, rest)) = split_scheme(uri)? else {
            return Ok(Source::Local(PathBuf::from(uri)));
        };

        if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
            let url = Url::parse(uri).map_err(|e| Error::malformed(uri, e.to_string()))?;
            Ok(Source::Http(url))
        } else if scheme.eq_ignore_ascii_case(EMBED_SCHEME) {
            Ok(Source::Embedded(embedded::bundle_path(rest).to_string()))
        } else {
            Ok(Source::Local(PathBuf::from(uri)))
        }
    }

    /// Get a display name for logging
    pub fn display_name(&self) -> String {
        match self {
            Source::Local(path) => path.display().to_string(),
            Source::Embedded(path) => format!("{EMBED_SCHEME}:///{path}"),
            Source::Http(url) => url.to_string(),
        }
    }
}

/// Split `scheme:rest`, following RFC 3986 scheme syntax
///
/// Returns `None` when the input has no scheme, which includes a colon that
/// appears only after a character a scheme cannot contain (`./a:b`).
fn split_scheme(uri: &str) -> Result<Option<(&str, &str)>> {
    if uri.chars().any(|c| c.is_ascii_control()) {
        return Err(Error::malformed(uri, "invalid control character in URL"));
    }

    for (i, c) in uri.char_indices() {
        match c {
            'a'..='z' | 'A'..='Z' => {}
            '0'..='9' | '+' | '-' | '.' if i > 0 => {}
            ':' if i == 0 => return Err(Error::malformed(uri, "missing protocol scheme")),
            ':' => return Ok(Some((&uri[..i], &uri[i + 1..]))),
            _ => return Ok(None),
        }
    }

    Ok(None)
}
