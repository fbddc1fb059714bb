//! Proxy selection from `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY`
//!
//! The HTTP client is never allowed to discover proxies on its own. Instead
//! the environment is captured into a [`ProxyEnv`] snapshot, and
//! [`ProxyPolicy`] decides whether that snapshot lives as long as the
//! [`crate::Reader`] or is retaken for every request.

use std::net::IpAddr;
use url::{Host, Url};

/// When proxy environment variables are read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProxyPolicy {
    /// Read once when the reader is built and reused for every request
    #[default]
    Cached,
    /// Read again for every request, so changes made after the reader was
    /// built take effect immediately
    PerRequest,
}

/// A proxy variable whose value cannot be used as a proxy URL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid proxy URL in {variable} '{value}': {reason}")]
pub struct InvalidProxy {
    pub variable: &'static str,
    pub value: String,
    pub reason: String,
}

/// A snapshot of the proxy-related environment
///
/// Proxy values are stored as found and only parsed when a request actually
/// needs them, so a bad `HTTP_PROXY` never affects `https://` requests.
#[derive(Debug, Clone, Default)]
pub struct ProxyEnv {
    http: Option<ProxyVar>,
    https: Option<ProxyVar>,
    no_proxy: NoProxy,
}

#[derive(Debug, Clone)]
struct ProxyVar {
    name: &'static str,
    value: String,
}

impl ProxyEnv {
    /// Capture the current process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a snapshot from an arbitrary variable lookup
    ///
    /// Upper-case names win over lower-case ones; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |upper: &'static str, lower: &'static str| {
            [upper, lower].into_iter().find_map(|name| {
                lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .map(|value| ProxyVar { name, value })
            })
        };

        Self {
            http: var("HTTP_PROXY", "http_proxy"),
            https: var("HTTPS_PROXY", "https_proxy"),
            no_proxy: var("NO_PROXY", "no_proxy")
                .map(|v| NoProxy::parse(&v.value))
                .unwrap_or_default(),
        }
    }

    /// Proxy to use for a request to `url`, or `None` to connect directly
    ///
    /// Only the variable for `url`'s scheme is parsed, and only when the host
    /// is not excluded.
    pub fn proxy_for(&self, url: &Url) -> Result<Option<Url>, InvalidProxy> {
        let var = match url.scheme() {
            "https" => self.https.as_ref(),
            "http" => self.http.as_ref(),
            _ => None,
        };
        let (Some(var), Some(host)) = (var, url.host()) else {
            return Ok(None);
        };

        if is_loopback(&host) {
            return Ok(None);
        }

        let port = url.port_or_known_default();
        if self.no_proxy.matches(&host, port) {
            return Ok(None);
        }

        parse_proxy_url(var.name, &var.value).map(Some)
    }

    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }

    /// Turn this snapshot into the proxy hook installed on the HTTP client
    ///
    /// The hook cannot fail a request, so callers check the request URL with
    /// [`ProxyEnv::proxy_for`] first. A redirect to a scheme whose variable
    /// is unusable connects directly.
    pub(crate) fn into_reqwest(self) -> reqwest::Proxy {
        reqwest::Proxy::custom(move |url| match self.proxy_for(url) {
            Ok(Some(proxy)) => {
                tracing::debug!(
                    "Routing {} through proxy {}",
                    url.host_str().unwrap_or_default(),
                    proxy.host_str().unwrap_or_default()
                );
                Some(proxy)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    "Connecting to {} directly: {e}",
                    url.host_str().unwrap_or_default()
                );
                None
            }
        })
    }
}

/// Values without a scheme are taken as `http://<value>`, so
/// `proxy.internal:3128` and `10.0.0.1:3128` both work.
fn parse_proxy_url(variable: &'static str, value: &str) -> Result<Url, InvalidProxy> {
    let value = value.trim();
    let invalid = |reason: String| InvalidProxy {
        variable,
        value: value.to_string(),
        reason,
    };

    let candidate = if value.contains("://") {
        value.to_string()
    } else {
        format!("http://{value}")
    };
    let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
        return Err(invalid(format!("unsupported proxy scheme '{}'", url.scheme())));
    }
    if !url.has_host() {
        return Err(invalid("missing proxy host".to_string()));
    }

    Ok(url)
}

/// `localhost`, `*.localhost` and loopback addresses
fn is_loopback(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(ip) => ip.is_loopback(),
        Host::Ipv6(ip) => ip.is_loopback(),
    }
}

/// Parsed `NO_PROXY` exclusion list
#[derive(Debug, Clone, Default)]
struct NoProxy {
    all: bool,
    entries: Vec<NoProxyEntry>,
}

#[derive(Debug, Clone, PartialEq)]
enum NoProxyEntry {
    Ip {
        ip: IpAddr,
        port: Option<u16>,
    },
    Cidr {
        network: IpAddr,
        prefix: u8,
    },
    /// `suffix` always starts with a dot; `match_host` is set when the entry
    /// was written without one and so also matches the bare domain.
    Domain {
        suffix: String,
        match_host: bool,
        port: Option<u16>,
    },
}

impl NoProxy {
    fn parse(value: &str) -> Self {
        let mut no_proxy = NoProxy::default();

        for entry in value.split(',') {
            let entry = entry.trim().to_ascii_lowercase();
            if entry.is_empty() {
                continue;
            }
            if entry == "*" {
                return NoProxy {
                    all: true,
                    entries: Vec::new(),
                };
            }
            if let Some(parsed) = NoProxyEntry::parse(&entry) {
                no_proxy.entries.push(parsed);
            }
        }

        no_proxy
    }

    fn matches(&self, host: &Host<&str>, port: Option<u16>) -> bool {
        self.all || self.entries.iter().any(|entry| entry.matches(host, port))
    }
}

impl NoProxyEntry {
    fn parse(entry: &str) -> Option<Self> {
        if let Some(cidr) = parse_cidr(entry) {
            return Some(cidr);
        }

        let (host, port) = match split_host_port(entry) {
            (host, Some(port)) => (host, Some(port.parse::<u16>().ok()?)),
            (host, None) => (host, None),
        };
        if host.is_empty() {
            return None;
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(NoProxyEntry::Ip { ip, port });
        }

        let host = host
            .strip_prefix('*')
            .filter(|rest| rest.starts_with('.'))
            .unwrap_or(host);
        let (bare, match_host) = match host.strip_prefix('.') {
            Some(bare) => (bare, false),
            None => (host, true),
        };
        if bare.is_empty() {
            return None;
        }
        let bare = match Host::parse(bare) {
            Ok(Host::Domain(ascii)) => ascii,
            _ => bare.to_string(),
        };

        Some(NoProxyEntry::Domain {
            suffix: format!(".{bare}"),
            match_host,
            port,
        })
    }

    fn matches(&self, host: &Host<&str>, port: Option<u16>) -> bool {
        let port_ok = |want: &Option<u16>| want.is_none() || *want == port;

        match self {
            NoProxyEntry::Ip { ip, port: want } => host_ip(host) == Some(*ip) && port_ok(want),
            NoProxyEntry::Cidr { network, prefix } => {
                host_ip(host).is_some_and(|ip| cidr_contains(*network, *prefix, ip))
            }
            NoProxyEntry::Domain {
                suffix,
                match_host,
                port: want,
            } => {
                let Host::Domain(domain) = host else {
                    return false;
                };
                let domain = domain.to_ascii_lowercase();
                (domain.ends_with(suffix.as_str()) || (*match_host && domain == suffix[1..]))
                    && port_ok(want)
            }
        }
    }
}

fn host_ip(host: &Host<&str>) -> Option<IpAddr> {
    match host {
        Host::Ipv4(ip) => Some(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => Some(IpAddr::V6(*ip)),
        Host::Domain(_) => None,
    }
}

/// Split `host:port`, `[v6]:port` or `[v6]`; bare IPv6 addresses have no port.
fn split_host_port(entry: &str) -> (&str, Option<&str>) {
    if let Some((host, tail)) = entry
        .strip_prefix('[')
        .and_then(|rest| rest.split_once(']'))
    {
        return (host, tail.strip_prefix(':'));
    }

    match entry.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, Some(port)),
        _ => (entry, None),
    }
}

fn parse_cidr(entry: &str) -> Option<NoProxyEntry> {
    let (addr, prefix) = entry.split_once('/')?;
    let network: IpAddr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    let max = if network.is_ipv4() { 32 } else { 128 };
    (prefix <= max).then_some(NoProxyEntry::Cidr { network, prefix })
}

fn cidr_contains(network: IpAddr, prefix: u8, ip: IpAddr) -> bool {
    match (network, ip) {
        (IpAddr::V4(net), IpAddr::V4(ip)) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            u32::from(net) & mask == u32::from(ip) & mask
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            u128::from(net) & mask == u128::from(ip) & mask
        }
        _ => false,
    }
}
