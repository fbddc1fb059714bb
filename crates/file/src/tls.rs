//! Trusted root certificates added on top of the platform trust store

use crate::error::{Error, Result};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use std::path::Path;

/// A validated set of root CA certificates
///
/// Every certificate is checked when it is added, so a `TrustedRoots` value
/// only ever holds material that can become a trust anchor.
#[derive(Debug, Clone, Default)]
pub struct TrustedRoots {
    certs: Vec<CertificateDer<'static>>,
}

impl TrustedRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every `CERTIFICATE` block of a PEM bundle
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let mut roots = Self::new();
        for cert in CertificateDer::pem_slice_iter(pem) {
            let cert =
                cert.map_err(|e| Error::configuration("Failed to decode PEM certificate", e))?;
            roots.push(cert)?;
        }

        if roots.is_empty() {
            return Err(Error::Configuration {
                message: "PEM input contains no certificates".to_string(),
                source: None,
            });
        }

        Ok(roots)
    }

    /// Use a single DER encoded certificate
    pub fn from_der(der: impl Into<Vec<u8>>) -> Result<Self> {
        let mut roots = Self::new();
        roots.push(CertificateDer::from(der.into()))?;
        Ok(roots)
    }

    /// Load a certificate file, accepting either PEM or DER encoding
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::configuration(
                format!("Failed to read certificate file: {}", path.display()),
                e,
            )
        })?;

        if looks_like_pem(&bytes) {
            Self::from_pem(&bytes)
        } else {
            Self::from_der(bytes)
        }
    }

    /// Add one certificate, rejecting it if it is not a usable trust anchor
    pub fn push(&mut self, cert: CertificateDer<'static>) -> Result<()> {
        let mut probe = rustls::RootCertStore::empty();
        probe
            .add(cert.clone())
            .map_err(|e| Error::configuration("Invalid root certificate", e))?;
        self.certs.push(cert);
        Ok(())
    }

    pub fn extend(&mut self, other: TrustedRoots) {
        self.certs.extend(other.certs);
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertificateDer<'static>> {
        self.certs.iter()
    }

    /// Convert into the certificate type the HTTP client takes
    pub(crate) fn to_reqwest(&self) -> Result<Vec<reqwest::Certificate>> {
        self.certs
            .iter()
            .map(|cert| {
                reqwest::Certificate::from_der(cert.as_ref())
                    .map_err(|e| Error::configuration("Invalid root certificate", e))
            })
            .collect()
    }
}

fn looks_like_pem(bytes: &[u8]) -> bool {
    bytes
        .windows(b"-----BEGIN".len())
        .any(|w| w == b"-----BEGIN")
}
