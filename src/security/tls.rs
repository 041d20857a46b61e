//! STARTTLS certificate handling
//!
//! Loads a server certificate and private key into a rustls config and
//! hands out `tokio_rustls` acceptors for the in-session upgrade. A
//! self-signed helper covers development and test setups.

use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys};
use tracing::{debug, info};

use crate::error::{Result, SmtpError};

/// Server certificate and key, ready to accept TLS handshakes.
#[derive(Clone)]
pub struct TlsConfig {
    server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    /// Load from PEM files on disk.
    pub fn from_pem_files<P: AsRef<Path>>(cert_path: P, key_path: P) -> Result<Self> {
        info!("Loading TLS certificate from {:?}", cert_path.as_ref());

        let cert_pem = std::fs::read(cert_path.as_ref())
            .map_err(|e| SmtpError::Tls(format!("failed to read certificate file: {e}")))?;
        let key_pem = std::fs::read(key_path.as_ref())
            .map_err(|e| SmtpError::Tls(format!("failed to read key file: {e}")))?;

        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Load from in-memory PEM blocks.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let mut cert_reader = BufReader::new(Cursor::new(cert_pem));
        let certs = certs(&mut cert_reader)
            .map_err(|e| SmtpError::Tls(format!("failed to parse certificates: {e}")))?;
        if certs.is_empty() {
            return Err(SmtpError::Tls("no certificates in PEM input".to_string()));
        }
        debug!("Loaded {} certificate(s)", certs.len());

        let mut key_reader = BufReader::new(Cursor::new(key_pem));
        let mut keys = pkcs8_private_keys(&mut key_reader)
            .map_err(|e| SmtpError::Tls(format!("failed to parse private key: {e}")))?;
        let private_key = keys
            .pop()
            .ok_or_else(|| SmtpError::Tls("no private key in PEM input".to_string()))?;

        let config = ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(
                certs.into_iter().map(rustls::Certificate).collect(),
                rustls::PrivateKey(private_key),
            )
            .map_err(|e| SmtpError::Tls(format!("failed to build TLS config: {e}")))?;

        Ok(Self {
            server_config: Arc::new(config),
        })
    }

    /// Acceptor for upgrading a connection after `220 Ready to start TLS`.
    pub fn acceptor(&self) -> tokio_rustls::TlsAcceptor {
        tokio_rustls::TlsAcceptor::from(self.server_config.clone())
    }
}

/// Generate a self-signed certificate and key for `domain`, returned as
/// `(certificate_pem, key_pem)`. Development and test use only.
pub fn self_signed_pem(domain: &str) -> Result<(String, String)> {
    use rcgen::{CertificateParams, DistinguishedName};

    info!("Generating self-signed certificate for {}", domain);

    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params.subject_alt_names = vec![
        rcgen::SanType::DnsName(domain.to_string()),
        rcgen::SanType::DnsName(format!("*.{domain}")),
    ];

    let cert = rcgen::Certificate::from_params(params)
        .map_err(|e| SmtpError::Tls(format!("failed to generate certificate: {e}")))?;

    let cert_pem = cert
        .serialize_pem()
        .map_err(|e| SmtpError::Tls(format!("failed to serialize certificate: {e}")))?;
    let key_pem = cert.serialize_private_key_pem();

    Ok((cert_pem, key_pem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_self_signed_pem_shape() {
        let (cert_pem, key_pem) = self_signed_pem("test.local").unwrap();
        assert!(cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(key_pem.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn test_load_from_memory() {
        let (cert_pem, key_pem) = self_signed_pem("test.local").unwrap();
        let tls = TlsConfig::from_pem(cert_pem.as_bytes(), key_pem.as_bytes()).unwrap();
        assert!(Arc::strong_count(&tls.server_config) >= 1);
    }

    #[test]
    fn test_load_from_files() {
        let (cert_pem, key_pem) = self_signed_pem("test.local").unwrap();

        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(cert_pem.as_bytes()).unwrap();
        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(key_pem.as_bytes()).unwrap();

        let tls = TlsConfig::from_pem_files(cert_file.path(), key_file.path());
        assert!(tls.is_ok());
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(TlsConfig::from_pem(b"", b"").is_err());
    }
}
