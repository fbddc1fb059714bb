//! Minimal HTTP CONNECT proxy for tests
//!
//! [`TunnelProxy`] accepts `CONNECT host:port` requests, optionally maps the
//! requested destination to another address, and relays bytes in both
//! directions once the connection is upgraded. Remapping lets a test request
//! a real-looking name such as `example.com:443` (which proxy resolution will
//! not skip the way it skips loopback) and still land on a local server whose
//! certificate is issued for that name.
//!
//! Every successfully tunnelled connection is counted against the
//! destination it was relayed to, after mapping.

use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How long to wait when dialing a tunnel destination
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// A running CONNECT proxy on a loopback port; stops when dropped
pub struct TunnelProxy {
    addr: SocketAddr,
    state: Arc<ProxyState>,
    accept_loop: JoinHandle<()>,
}

impl TunnelProxy {
    /// Start a proxy on `127.0.0.1` with an OS-assigned port
    ///
    /// `host_mappings` maps a requested `host:port` to the `host:port`
    /// actually dialed.
    pub async fn start(host_mappings: HashMap<String, String>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind proxy listener")?;
        let addr = listener.local_addr()?;

        let state = Arc::new(ProxyState {
            proxied: Mutex::new(HashMap::new()),
            host_mappings,
        });
        let accept_loop = tokio::spawn(accept_loop(listener, state.clone()));

        tracing::debug!("Tunnel proxy listening on {}", addr);

        Ok(Self {
            addr,
            state,
            accept_loop,
        })
    }

    /// Proxy URL suitable for `HTTPS_PROXY`
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of connections tunnelled to `host` (a `host:port` after mapping)
    pub fn count_for_host(&self, host: &str) -> usize {
        self.state.count_for_host(host)
    }
}

impl Drop for TunnelProxy {
    fn drop(&mut self) {
        self.accept_loop.abort();
    }
}

struct ProxyState {
    /// Completed tunnels per destination host
    proxied: Mutex<HashMap<String, usize>>,
    host_mappings: HashMap<String, String>,
}

impl ProxyState {
    fn resolve(&self, requested: &str) -> String {
        self.host_mappings
            .get(requested)
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }

    fn count_request(&self, host: &str) {
        let mut proxied = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        *proxied.entry(host.to_string()).or_insert(0) += 1;
    }

    fn count_for_host(&self, host: &str) -> usize {
        let proxied = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        proxied.get(host).copied().unwrap_or(0)
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<ProxyState>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("Tunnel proxy accept failed: {e}");
                continue;
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(state.clone(), req));
            if let Err(e) = http1::Builder::new()
                .preserve_header_case(true)
                .title_case_headers(true)
                .serve_connection(TokioIo::new(stream), service)
                .with_upgrades()
                .await
            {
                tracing::debug!("Proxy connection from {peer} ended: {e}");
            }
        });
    }
}

async fn handle(
    state: Arc<ProxyState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::CONNECT {
        return Ok(text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Only supports CONNECT",
        ));
    }

    let Some(requested) = req.uri().authority().map(|a| a.to_string()) else {
        return Ok(text_response(
            StatusCode::BAD_REQUEST,
            "CONNECT target must be host:port",
        ));
    };
    let host = state.resolve(&requested);

    let destination = match tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&host)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
        Err(_) => {
            return Ok(text_response(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Timed out dialing {host}"),
            ))
        }
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                state.count_request(&host);
                tracing::debug!("Tunnelling {} to {}", requested, host);
                if let Err(e) = tunnel(TokioIo::new(upgraded), destination).await {
                    tracing::debug!("Tunnel to {host} failed: {e}");
                }
            }
            Err(e) => tracing::warn!("Upgrade for {host} failed: {e}"),
        }
    });

    Ok(Response::new(Full::new(Bytes::new())))
}

/// Relay both directions concurrently and return once both are finished
///
/// Each direction shuts down its write side on EOF so the peer sees the
/// close and the opposite direction can drain too.
async fn tunnel<C>(client: C, destination: TcpStream) -> std::io::Result<(u64, u64)>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut dest_read, mut dest_write) = destination.into_split();

    let (upstream, downstream) = tokio::join!(
        pipe(&mut client_read, &mut dest_write),
        pipe(&mut dest_read, &mut client_write),
    );

    Ok((upstream?, downstream?))
}

async fn pipe<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::io::copy(reader, writer).await;
    let _ = writer.shutdown().await;
    copied
}

fn text_response(status: StatusCode, body: impl Into<String>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.into())));
    *response.status_mut() = status;
    response
}
