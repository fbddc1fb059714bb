//! The [`Reader`] and the configuration it is built from

use crate::embedded::{self, BundledFs};
use crate::error::Result;
use crate::http::HttpFileReader;
use crate::local::LocalFileReader;
use crate::proxy::ProxyPolicy;
use crate::tls::TrustedRoots;
use crate::Source;
use std::fmt;
use std::sync::Arc;

/// One configuration step applied to a [`ReaderConfig`]
#[derive(Clone)]
pub enum ReaderOption {
    /// Resolve `embed://` URIs against this bundle
    EmbeddedFs(Arc<dyn BundledFs>),
    /// Trust these CAs in addition to the platform roots
    TrustedRoots(TrustedRoots),
    /// Re-read proxy environment variables on every request
    NonCachedProxy,
}

impl ReaderOption {
    pub fn embedded_fs(fs: impl BundledFs) -> Self {
        ReaderOption::EmbeddedFs(Arc::new(fs))
    }
}

impl fmt::Debug for ReaderOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderOption::EmbeddedFs(_) => f.write_str("EmbeddedFs(..)"),
            ReaderOption::TrustedRoots(roots) => {
                write!(f, "TrustedRoots({} certificates)", roots.len())
            }
            ReaderOption::NonCachedProxy => f.write_str("NonCachedProxy"),
        }
    }
}

/// Everything a [`Reader`] is built from
///
/// Options are applied in order; trusted roots accumulate, a later embedded
/// filesystem replaces an earlier one.
#[derive(Clone, Default)]
pub struct ReaderConfig {
    embedded_fs: Option<Arc<dyn BundledFs>>,
    trusted_roots: TrustedRoots,
    proxy_policy: ProxyPolicy,
}

impl ReaderConfig {
    pub fn from_options(options: impl IntoIterator<Item = ReaderOption>) -> Self {
        options.into_iter().fold(Self::default(), Self::apply)
    }

    pub fn apply(mut self, option: ReaderOption) -> Self {
        match option {
            ReaderOption::EmbeddedFs(fs) => self.embedded_fs = Some(fs),
            ReaderOption::TrustedRoots(roots) => self.trusted_roots.extend(roots),
            ReaderOption::NonCachedProxy => self.proxy_policy = ProxyPolicy::PerRequest,
        }
        self
    }

    pub fn with_embedded_fs(self, fs: impl BundledFs) -> Self {
        self.apply(ReaderOption::embedded_fs(fs))
    }

    pub fn with_trusted_roots(self, roots: TrustedRoots) -> Self {
        self.apply(ReaderOption::TrustedRoots(roots))
    }

    pub fn with_non_cached_proxy(self) -> Self {
        self.apply(ReaderOption::NonCachedProxy)
    }

    pub fn has_embedded_fs(&self) -> bool {
        self.embedded_fs.is_some()
    }

    pub fn trusted_roots(&self) -> &TrustedRoots {
        &self.trusted_roots
    }

    pub fn proxy_policy(&self) -> ProxyPolicy {
        self.proxy_policy
    }
}

impl fmt::Debug for ReaderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderConfig")
            .field("embedded_fs", &self.embedded_fs.is_some())
            .field("trusted_roots", &self.trusted_roots.len())
            .field("proxy_policy", &self.proxy_policy)
            .finish()
    }
}

/// Reads files from local paths, `embed://` bundles, and HTTP/HTTPS URLs
///
/// A `Reader` never changes after it is built. Clones share the same
/// configuration and it can be used from many tasks at once.
#[derive(Clone)]
pub struct Reader {
    embedded_fs: Option<Arc<dyn BundledFs>>,
    http: HttpFileReader,
}

impl Reader {
    /// Build a reader from `config`
    ///
    /// Fails with a configuration error if the HTTP client cannot be set up.
    /// Proxy variables are captured here in cached mode but not parsed until
    /// a request needs one.
    pub fn new(config: ReaderConfig) -> Result<Self> {
        let http = HttpFileReader::new(config.trusted_roots, config.proxy_policy)?;
        Ok(Self {
            embedded_fs: config.embedded_fs,
            http,
        })
    }

    /// Shorthand for `Reader::new(ReaderConfig::from_options(options))`
    pub fn with_options(options: impl IntoIterator<Item = ReaderOption>) -> Result<Self> {
        Self::new(ReaderConfig::from_options(options))
    }

    /// Return the full contents addressed by `uri`
    ///
    /// - `http://…` / `https://…` are fetched with a single GET
    /// - `embed://path` is read from the embedded filesystem
    /// - anything else is a local filesystem path
    pub async fn read_file(&self, uri: &str) -> Result<Vec<u8>> {
        let source = Source::parse(uri)?;
        tracing::debug!("Reading {}", source.display_name());

        match source {
            Source::Local(path) => LocalFileReader::read(&path).await,
            Source::Embedded(path) => embedded::read(self.embedded_fs.as_deref(), uri, &path),
            Source::Http(url) => self.http.read(url, uri).await,
        }
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("embedded_fs", &self.embedded_fs.is_some())
            .field("http", &self.http)
            .finish()
    }
}
