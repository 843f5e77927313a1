//! TLS material loading for mutual authentication.
//!
//! The rig's PKI is file-based: the control box presents `server.crt` /
//! `server.key`, each client box presents its own certificate
//! (`instbox.crt/key`, `visbox.crt/key`), and both sides verify the peer
//! against the shared `ca-chain.crt` bundle.  TLS is optional — when
//! disabled in config, connections run over plain TCP with the identical
//! framing.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

/// Errors raised while assembling TLS configurations.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    EmptyCertFile(PathBuf),
    #[error("no private key found in {0}")]
    MissingKey(PathBuf),
    #[error("invalid CA bundle: {0}")]
    BadCaBundle(String),
    #[error("invalid server name {0:?}")]
    BadServerName(String),
    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::EmptyCertFile(path.to_path_buf()));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::MissingKey(path.to_path_buf()))
}

fn read_ca_bundle(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    for cert in read_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| TlsError::BadCaBundle(e.to_string()))?;
    }
    Ok(roots)
}

/// Builds the relay-side acceptor: presents the server certificate and
/// *requires* a client certificate chaining to the CA bundle.
///
/// # Errors
///
/// Returns [`TlsError`] for unreadable PEM files or material rustls
/// rejects.
pub fn server_acceptor(
    cert_path: &Path,
    key_path: &Path,
    ca_path: &Path,
) -> Result<TlsAcceptor, TlsError> {
    let roots = read_ca_bundle(ca_path)?;
    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| TlsError::BadCaBundle(e.to_string()))?;
    let config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(read_certs(cert_path)?, read_key(key_path)?)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Builds a client-side connector that presents the box's certificate and
/// verifies the relay against the CA bundle.
///
/// # Errors
///
/// Returns [`TlsError`] for unreadable PEM files or material rustls
/// rejects.
pub fn client_connector(
    cert_path: &Path,
    key_path: &Path,
    ca_path: &Path,
) -> Result<TlsConnector, TlsError> {
    let roots = read_ca_bundle(ca_path)?;
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(read_certs(cert_path)?, read_key(key_path)?)?;
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Converts a configured host string into the SNI name presented during the
/// client handshake.
///
/// # Errors
///
/// Returns [`TlsError::BadServerName`] when `host` is neither a DNS name
/// nor an IP address.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsError> {
    ServerName::try_from(host.to_owned()).map_err(|_| TlsError::BadServerName(host.to_owned()))
}
