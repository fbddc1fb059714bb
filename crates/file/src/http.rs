//! HTTP/HTTPS file reader implementation

use crate::error::{Error, Result};
use crate::proxy::{ProxyEnv, ProxyPolicy};
use crate::tls::TrustedRoots;
use url::Url;

/// Fetches whole files over HTTP/HTTPS
///
/// With [`ProxyPolicy::Cached`] one client is built up front, with the proxy
/// environment as it was at that moment. With [`ProxyPolicy::PerRequest`] a
/// client is built for every call from the environment as it is then.
#[derive(Debug, Clone)]
pub(crate) struct HttpFileReader {
    roots: TrustedRoots,
    cached: Option<CachedClient>,
}

#[derive(Debug, Clone)]
struct CachedClient {
    proxy: ProxyEnv,
    client: reqwest::Client,
}

impl HttpFileReader {
    pub(crate) fn new(roots: TrustedRoots, policy: ProxyPolicy) -> Result<Self> {
        let cached = match policy {
            ProxyPolicy::Cached => {
                let proxy = ProxyEnv::from_env();
                let client = build_client(&roots, proxy.clone())?;
                Some(CachedClient { proxy, client })
            }
            ProxyPolicy::PerRequest => {
                // Surface TLS setup problems now rather than on the first request
                build_client(&roots, ProxyEnv::default())?;
                None
            }
        };

        Ok(Self { roots, cached })
    }

    /// GET `url` and return the full response body
    ///
    /// `uri` is the caller's original string, kept for error context.
    pub(crate) async fn read(&self, url: Url, uri: &str) -> Result<Vec<u8>> {
        // Only the variable for this URL's scheme is parsed
        let check_proxy = |proxy: &ProxyEnv| {
            proxy.proxy_for(&url).map_err(|source| Error::Proxy {
                uri: uri.to_string(),
                source,
            })
        };
        let client = match &self.cached {
            Some(cached) => {
                check_proxy(&cached.proxy)?;
                cached.client.clone()
            }
            None => {
                let proxy = ProxyEnv::from_env();
                check_proxy(&proxy)?;
                build_client(&self.roots, proxy)?
            }
        };

        let transport = |source| Error::Transport {
            uri: uri.to_string(),
            source,
        };

        let response = client.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteFetchFailed {
                uri: uri.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;

        tracing::debug!("Fetched {} bytes from: {}", bytes.len(), uri);

        Ok(bytes.to_vec())
    }
}

/// Idle connections are never kept, so every call dials (and, behind a
/// proxy, tunnels) on its own.
fn build_client(roots: &TrustedRoots, proxy: ProxyEnv) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .no_proxy()
        .proxy(proxy.into_reqwest())
        .pool_max_idle_per_host(0);

    for cert in roots.to_reqwest()? {
        builder = builder.add_root_certificate(cert);
    }

    builder
        .build()
        .map_err(|e| Error::configuration("Failed to build HTTP client", e))
}
