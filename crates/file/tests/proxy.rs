//! Proxy routing tests
//!
//! These tests change process-wide proxy variables, so they live in their
//! own test binary and take `ENV_LOCK` for their whole duration.

mod common;

use common::{file_router, fixture_contents, init_tracing, HttpsServer, FILE_PATH};
use std::collections::HashMap;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use urifetch_file::{ErrorKind, Reader, ReaderConfig, ReaderOption};
use urifetch_tunnel_proxy::TunnelProxy;

static ENV_LOCK: Mutex<()> = Mutex::const_new(());

const PROXY_VARS: [&str; 6] = [
    "HTTPS_PROXY",
    "https_proxy",
    "HTTP_PROXY",
    "http_proxy",
    "NO_PROXY",
    "no_proxy",
];

/// The TLS fixture certificate is issued for example.com, so requests name
/// that host and the proxy maps it to the loopback server. Loopback URLs
/// would never be proxied.
const FAKE_SERVER_HOST: &str = "example.com:443";

/// Clears proxy variables on creation and restores them on drop
struct ProxyEnvGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl ProxyEnvGuard {
    fn clean() -> Self {
        let saved = PROXY_VARS
            .iter()
            .map(|name| (*name, std::env::var(name).ok()))
            .collect();
        for name in PROXY_VARS {
            std::env::remove_var(name);
        }
        Self { saved }
    }

    fn set_https_proxy(&self, value: &str) {
        std::env::set_var("HTTPS_PROXY", value);
    }
}

impl Drop for ProxyEnvGuard {
    fn drop(&mut self) {
        for (name, value) in &self.saved {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

fn file_url() -> String {
    format!("https://{FAKE_SERVER_HOST}/{FILE_PATH}")
}

async fn start_proxy(server: &HttpsServer) -> TunnelProxy {
    let mappings = HashMap::from([(FAKE_SERVER_HOST.to_string(), server.host())]);
    TunnelProxy::start(mappings).await.unwrap()
}

/// A `host:port` with nothing listening on it
async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

#[tokio::test]
async fn test_non_cached_proxy_set_after_construction() {
    let _lock = ENV_LOCK.lock().await;
    let env = ProxyEnvGuard::clean();
    init_tracing();

    let server = HttpsServer::start(file_router(&[FILE_PATH])).await.unwrap();
    let proxy = start_proxy(&server).await;

    let reader = Reader::with_options([
        ReaderOption::TrustedRoots(server.roots()),
        ReaderOption::NonCachedProxy,
    ])
    .unwrap();

    env.set_https_proxy(&proxy.url());

    let got = reader.read_file(&file_url()).await.unwrap();
    assert_eq!(got, fixture_contents(FILE_PATH));
    assert_eq!(
        proxy.count_for_host(&server.host()),
        1,
        "Host {} should have been proxied exactly once",
        server.host()
    );

    for _ in 0..4 {
        let got = reader.read_file(&file_url()).await.unwrap();
        assert_eq!(got, fixture_contents(FILE_PATH));
    }
    assert_eq!(proxy.count_for_host(&server.host()), 5);
}

#[tokio::test]
async fn test_non_cached_proxy_follows_environment_changes() {
    let _lock = ENV_LOCK.lock().await;
    let env = ProxyEnvGuard::clean();

    let server = HttpsServer::start(file_router(&[FILE_PATH])).await.unwrap();
    let proxy = start_proxy(&server).await;

    let reader = Reader::new(
        ReaderConfig::default()
            .with_trusted_roots(server.roots())
            .with_non_cached_proxy(),
    )
    .unwrap();

    env.set_https_proxy(&format!("http://{}", closed_addr().await));
    let err = reader.read_file(&file_url()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);

    env.set_https_proxy(&proxy.url());
    reader.read_file(&file_url()).await.unwrap();
    assert_eq!(proxy.count_for_host(&server.host()), 1);
}

#[tokio::test]
async fn test_cached_proxy_ignores_later_changes() {
    let _lock = ENV_LOCK.lock().await;
    let env = ProxyEnvGuard::clean();

    let server = HttpsServer::start(file_router(&[FILE_PATH])).await.unwrap();
    let proxy = start_proxy(&server).await;

    env.set_https_proxy(&proxy.url());
    let reader = Reader::with_options([ReaderOption::TrustedRoots(server.roots())]).unwrap();

    env.set_https_proxy(&format!("http://{}", closed_addr().await));

    for _ in 0..2 {
        let got = reader.read_file(&file_url()).await.unwrap();
        assert_eq!(got, fixture_contents(FILE_PATH));
    }
    assert_eq!(proxy.count_for_host(&server.host()), 2);
}

#[tokio::test]
async fn test_failed_connect_is_transport_error() {
    let _lock = ENV_LOCK.lock().await;
    let env = ProxyEnvGuard::clean();

    let mappings = HashMap::from([(FAKE_SERVER_HOST.to_string(), closed_addr().await)]);
    let proxy = TunnelProxy::start(mappings).await.unwrap();

    let reader = Reader::with_options([ReaderOption::NonCachedProxy]).unwrap();
    env.set_https_proxy(&proxy.url());

    let err = reader.read_file(&file_url()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_invalid_proxy_value_fails_the_request() {
    let _lock = ENV_LOCK.lock().await;
    let env = ProxyEnvGuard::clean();

    let per_request = Reader::with_options([ReaderOption::NonCachedProxy]).unwrap();
    env.set_https_proxy("http://[::1");

    let err = per_request.read_file(&file_url()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(format!("{:?}", err).contains("HTTPS_PROXY"));

    let cached = Reader::new(ReaderConfig::default()).unwrap();
    let err = cached.read_file(&file_url()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);

    let got = cached
        .read_file(common::fixture_path(FILE_PATH).to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(got, fixture_contents(FILE_PATH));
}

#[tokio::test]
async fn test_unrelated_proxy_variable_is_ignored() {
    let _lock = ENV_LOCK.lock().await;
    let _env = ProxyEnvGuard::clean();

    let server = HttpsServer::start(file_router(&[FILE_PATH])).await.unwrap();
    std::env::set_var("HTTP_PROXY", "socks5://proxy.internal:1080");

    let cached = Reader::with_options([ReaderOption::TrustedRoots(server.roots())]).unwrap();
    let per_request = Reader::with_options([
        ReaderOption::TrustedRoots(server.roots()),
        ReaderOption::NonCachedProxy,
    ])
    .unwrap();

    std::env::set_var("HTTP_PROXY", "http://[::1");
    let url = format!("{}/{FILE_PATH}", server.url());
    for reader in [&cached, &per_request] {
        let got = reader.read_file(&url).await.unwrap();
        assert_eq!(got, fixture_contents(FILE_PATH));
    }
}
