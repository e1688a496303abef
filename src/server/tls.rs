//! TLS credentials for the listener
//!
//! Credentials are built once at startup from [`TlsConfig`] and turned into
//! an acceptor that the accept loop runs before a connection exists.

use std::path::Path;
use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::version::{TLS12, TLS13};
use rustls::{RootCertStore, ServerConfig as RustlsServerConfig};
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::TlsConfig;
use crate::error::{ConfigError, Result, TidewayError};

/// Loaded key material, ready to build acceptors from
pub struct TlsCredentials {
    roots: Arc<RootCertStore>,
    certs: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
    require_client_auth: bool,
}

impl std::fmt::Debug for TlsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsCredentials")
            .field("trust_anchors", &self.roots.len())
            .field("has_key_cert", &self.certs.is_some())
            .field("require_client_auth", &self.require_client_auth)
            .finish()
    }
}

/// Build credentials from `config`.
///
/// Returns `None` when TLS is disabled. Otherwise starts from the bundled
/// web PKI roots, then loads the key/cert pair and the truststore when they
/// are configured, stopping at the first failure.
pub async fn build_credentials(config: &TlsConfig) -> Result<Option<TlsCredentials>> {
    if !config.enabled {
        return Ok(None);
    }
    config.validate()?;

    let mut roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let certs = match &config.key_cert {
        Some(key_cert) => {
            let chain = load_certs(&key_cert.cert_file).await?;
            let key = load_private_key(&key_cert.key_file).await?;
            info!(
                cert_file = %key_cert.cert_file.display(),
                cert_count = chain.len(),
                "Loaded TLS certificate chain"
            );
            Some((chain, key))
        }
        None => None,
    };

    if let Some(truststore) = &config.truststore_file {
        let cas = load_certs(truststore).await?;
        let (added, ignored) = roots.add_parsable_certificates(cas);
        if added == 0 {
            return Err(TidewayError::tls(format!(
                "no usable CA certificates in {}",
                truststore.display()
            )));
        }
        info!(
            truststore = %truststore.display(),
            added,
            ignored,
            "Loaded TLS truststore"
        );
    }

    Ok(Some(TlsCredentials {
        roots: Arc::new(roots),
        certs,
        require_client_auth: config.require_client_auth,
    }))
}

impl TlsCredentials {
    pub fn require_client_auth(&self) -> bool {
        self.require_client_auth
    }

    /// Acceptor presenting the configured certificate
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        let (chain, key) = self.certs.as_ref().ok_or_else(|| {
            TidewayError::tls("accepting TLS connections requires tls.key_cert")
        })?;
        let provider = Arc::new(provider());

        let builder = RustlsServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&TLS12, &TLS13])
            .map_err(|e| TidewayError::tls(format!("unsupported protocol versions: {}", e)))?;

        let builder = if self.require_client_auth {
            let verifier =
                WebPkiClientVerifier::builder_with_provider(self.roots.clone(), provider)
                    .build()
                    .map_err(|e| {
                        TidewayError::tls(format!("failed to build client verifier: {}", e))
                    })?;
            builder.with_client_cert_verifier(verifier)
        } else {
            builder.with_no_client_auth()
        };

        let server_config = builder
            .with_single_cert(chain.clone(), key.clone_key())
            .map_err(|e| TidewayError::tls(format!("invalid certificate or key: {}", e)))?;
        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }
}

fn provider() -> CryptoProvider {
    ring::default_provider()
}

async fn read_pem(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ConfigError::read(path.display().to_string(), e.to_string()).into())
}

/// Load certificates from a PEM file
async fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = read_pem(path).await?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| TidewayError::tls(format!("failed to parse {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(TidewayError::tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1 or SEC1) from a PEM file
async fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = read_pem(path).await?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| TidewayError::tls(format!("failed to parse {}: {}", path.display(), e)))?
        .ok_or_else(|| TidewayError::tls(format!("no private key found in {}", path.display())))
}
