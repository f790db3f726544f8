//! Server configuration.
//!
//! ```toml
//! listen = "0.0.0.0:8443"
//! shutdown_timeout_secs = 30
//! max_body_bytes = 1048576
//!
//! [tls]
//! cert_path = "/etc/api/tls.crt"
//! key_path = "/etc/api/tls.key"
//! ca_cert_path = "/etc/api/ca.crt"
//! require_client_cert = true
//!
//! [logging]
//! debug = false
//! json = true
//! outputs = ["stderr", "/var/log/api/access.log"]
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::logging::LoggingConfig;
use crate::router::DEFAULT_BODY_LIMIT;
use crate::tls::TlsConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to bind.
    pub listen: String,
    pub tls: Option<TlsFiles>,
    /// How long a caller should wait for in-flight requests on shutdown.
    pub shutdown_timeout_secs: u64,
    /// Request bodies above this size are answered with `413`.
    pub max_body_bytes: usize,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_owned(),
            tls: None,
            shutdown_timeout_secs: 30,
            max_body_bytes: DEFAULT_BODY_LIMIT,
            logging: LoggingConfig::default(),
        }
    }
}

/// Paths to PEM files on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsFiles {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,
    #[serde(default)]
    pub require_client_cert: bool,
}

impl TlsFiles {
    /// Reads every referenced file into memory.
    pub fn load(&self) -> Result<TlsConfig, Error> {
        let mut config = TlsConfig::new(read(&self.cert_path)?, read(&self.key_path)?);
        if let Some(ca) = &self.ca_cert_path {
            config = config.client_ca(read(ca)?, self.require_client_cert);
        }
        Ok(config)
    }
}

impl ServerConfig {
    pub fn from_toml(s: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, Error> {
        parse_listen(&self.listen)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    fn validate(&self) -> Result<(), Error> {
        self.listen_addr()?;
        if let Some(tls) = &self.tls {
            if tls.require_client_cert && tls.ca_cert_path.is_none() {
                return Err(Error::Config(
                    "tls.require_client_cert needs tls.ca_cert_path".to_owned(),
                ));
            }
        }
        Ok(())
    }
}

pub(crate) fn parse_listen(addr: &str) -> Result<SocketAddr, Error> {
    addr.parse()
        .map_err(|e| Error::Config(format!("listen `{addr}`: {e}")))
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    fs::read(path).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = ServerConfig::from_toml("").unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:8080");
        assert!(cfg.tls.is_none());
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.max_body_bytes, 1 << 20);
        assert!(cfg.logging.json);
        assert_eq!(cfg.logging.outputs, ["stderr"]);
    }

    #[test]
    fn full_document() {
        let cfg = ServerConfig::from_toml(
            r#"
            listen = "127.0.0.1:8443"
            shutdown_timeout_secs = 5
            max_body_bytes = 4096

            [tls]
            cert_path = "/tmp/c.pem"
            key_path = "/tmp/k.pem"
            ca_cert_path = "/tmp/ca.pem"
            require_client_cert = true

            [logging]
            debug = true
            outputs = ["stdout", "/tmp/api.log"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.listen_addr().unwrap().port(), 8443);
        let tls = cfg.tls.unwrap();
        assert!(tls.require_client_cert);
        assert_eq!(cfg.max_body_bytes, 4096);
        assert!(cfg.logging.debug);
        assert!(cfg.logging.json);
        assert_eq!(cfg.logging.outputs, ["stdout", "/tmp/api.log"]);
    }

    #[test]
    fn bad_listen_address() {
        let err = ServerConfig::from_toml(r#"listen = "nowhere""#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), parse_listen("nowhere").unwrap_err().to_string());
    }

    #[test]
    fn client_cert_without_ca() {
        let err = ServerConfig::from_toml(
            r#"
            [tls]
            cert_path = "c"
            key_path = "k"
            require_client_cert = true
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ca_cert_path"));
    }

    #[test]
    fn load_reads_file_and_tls_material() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("c.pem");
        let key = dir.path().join("k.pem");
        fs::write(&cert, b"CERT").unwrap();
        fs::write(&key, b"KEY").unwrap();

        let path = dir.path().join("server.toml");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "listen = \"127.0.0.1:0\"").unwrap();
        writeln!(f, "[tls]").unwrap();
        writeln!(f, "cert_path = {:?}", cert.display().to_string()).unwrap();
        writeln!(f, "key_path = {:?}", key.display().to_string()).unwrap();

        let cfg = ServerConfig::load(&path).unwrap();
        let material = cfg.tls.unwrap().load().unwrap();
        assert_eq!(material.cert, b"CERT");
        assert_eq!(material.key, b"KEY");
        assert!(material.ca_cert.is_empty());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(ServerConfig::load("/definitely/not/here.toml"), Err(Error::Config(_))));
    }
}
