use crate::{errors::TlsConfigError, limits::ConnLimits};
use rustls::{
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer},
    ServerConfig,
};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{net::TcpStream, time::timeout};
use tokio_rustls::{server::TlsStream, TlsAcceptor};

/// Certificate chain and private key locations, both PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TlsPaths {
    pub(crate) cert: PathBuf,
    pub(crate) key: PathBuf,
}

impl TlsPaths {
    /// Both paths or neither; one without the other is a configuration error.
    pub(crate) fn pair(
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
    ) -> Result<Option<Self>, TlsConfigError> {
        match (cert, key) {
            (Some(cert), Some(key)) => Ok(Some(Self { cert, key })),
            (Some(_), None) => Err(TlsConfigError::MissingKey),
            (None, Some(_)) => Err(TlsConfigError::MissingCertificate),
            (None, None) => Ok(None),
        }
    }

    pub(crate) fn acceptor(&self) -> Result<TlsAcceptor, TlsConfigError> {
        Ok(TlsAcceptor::from(build_server_config(&self.cert, &self.key)?))
    }
}

/// Builds a rustls `ServerConfig` from PEM-encoded certificate and private key files.
///
/// The certificate file may contain a chain (multiple PEM blocks). The key file
/// must hold one PKCS#8, PKCS#1 or SEC1 private key.
pub(crate) fn build_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<ServerConfig>, TlsConfigError> {
    let pem_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| TlsConfigError::Pem { path, source }
    };

    let certs = CertificateDer::pem_file_iter(cert_path)
        .map_err(pem_err(cert_path))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_err(cert_path))?;

    if certs.is_empty() {
        return Err(TlsConfigError::EmptyCertificateChain(cert_path.to_path_buf()));
    }

    let key = PrivateKeyDer::from_pem_file(key_path).map_err(pem_err(key_path))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

/// Runs the server side of the handshake, bounded by `handshake_timeout`.
#[inline]
pub(crate) async fn handshake(
    acceptor: &TlsAcceptor,
    stream: TcpStream,
    limits: &ConnLimits,
) -> Result<TlsStream<TcpStream>, io::Error> {
    match timeout(limits.handshake_timeout, acceptor.accept(stream)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timeout")),
    }
}
