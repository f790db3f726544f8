//! TLS material → rustls server configuration.
//!
//! Fixed policy, not configurable:
//!
//! - TLS 1.2 minimum
//! - TLS 1.2 suites: ECDHE-ECDSA-AES128-GCM-SHA256, ECDHE-RSA-AES128-GCM-SHA256,
//!   ECDHE-RSA-AES256-GCM-SHA384 (TLS 1.3 keeps its standard suites)
//! - key exchange: P-384, P-256, X25519
//! - ALPN: `h2`, `http/1.1`
//!
//! Client certificates are requested and verified only when CA material is
//! present and `require_client_cert` is set.

use std::fmt;
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::crypto::CryptoProvider;
use rustls::crypto::ring::{cipher_suite, default_provider, kx_group};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::version::{TLS12, TLS13};

use crate::error::Error;

/// PEM-encoded certificate material for the listener.
#[derive(Clone, Default)]
pub struct TlsConfig {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    /// CA bundle used to verify client certificates. Optional.
    pub ca_cert: Vec<u8>,
    pub require_client_cert: bool,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert", &format_args!("{} bytes", self.cert.len()))
            .field("key", &"<redacted>")
            .field("ca_cert", &format_args!("{} bytes", self.ca_cert.len()))
            .field("require_client_cert", &self.require_client_cert)
            .finish()
    }
}

impl TlsConfig {
    pub fn new(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self { cert: cert.into(), key: key.into(), ..Self::default() }
    }

    /// Verifies client certificates against `ca_cert`; when `require` is set,
    /// clients without one are refused.
    pub fn client_ca(mut self, ca_cert: impl Into<Vec<u8>>, require: bool) -> Self {
        self.ca_cert = ca_cert.into();
        self.require_client_cert = require;
        self
    }

    /// Builds the rustls configuration, parsing and validating all material.
    pub fn build(&self) -> Result<Arc<rustls::ServerConfig>, Error> {
        let certs = parse_certs(&self.cert, "certificate")?;
        let key = parse_key(&self.key)?;
        let provider = Arc::new(provider());

        let builder = rustls::ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_protocol_versions(&[&TLS13, &TLS12])?;

        let builder = if self.require_client_cert {
            if self.ca_cert.is_empty() {
                return Err(Error::Tls(
                    "client certificate verification requires a CA certificate".to_owned(),
                ));
            }
            let mut roots = RootCertStore::empty();
            for ca in parse_certs(&self.ca_cert, "CA certificate")? {
                roots.add(ca)?;
            }
            let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider)
                .build()
                .map_err(|e| Error::Tls(format!("client verifier: {e}")))?;
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };

        let mut config = builder.with_single_cert(certs, key)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

fn provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        ],
        kx_groups: vec![kx_group::SECP384R1, kx_group::SECP256R1, kx_group::X25519],
        ..default_provider()
    }
}

fn parse_certs(pem: &[u8], what: &str) -> Result<Vec<CertificateDer<'static>>, Error> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("{what}: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Tls(format!("{what}: no PEM certificate found")));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, Error> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| Error::Tls(format!("private key: {e}")))?
        .ok_or_else(|| Error::Tls("private key: no PEM key found".to_owned()))
}
