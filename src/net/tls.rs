//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Parse PEM certificate chains, private keys and CA bundles
//! - Build the rustls `ServerConfig` (optional client certificate auth)
//! - Extract the fields the rest of the host needs from X.509 certificates

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{RootCertStore, ServerConfig};

/// Errors raised while loading TLS material.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Unable to read {kind} file '{path}': {source}")]
    Read {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No certificates found in '{0}'")]
    NoCertificates(String),

    #[error("No private key found in '{0}'")]
    NoPrivateKey(String),

    #[error("Unusable private key in '{path}': {source}")]
    Key {
        path: String,
        #[source]
        source: rustls::Error,
    },

    #[error("Client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("Server config: {0}")]
    Config(#[from] rustls::Error),

    #[error("Certificate parse failed: {0}")]
    Parse(String),

    #[error("Client certificate auth requires a trusted CA file")]
    MissingClientCa,

    #[error("Keypair reload interval must be non-zero")]
    ZeroInterval,
}

/// Crypto provider shared by every TLS object the host builds.
pub fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

fn open(kind: &'static str, path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            kind,
            path: path.display().to_string(),
            source,
        })
}

/// Load every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open("certificate", path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            kind: "certificate",
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open("key", path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            kind: "key",
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

/// Load a certificate chain and its key as a signing-ready pair.
///
/// Fails when the key does not belong to the leaf certificate.
pub fn load_certified_key(cert_path: &Path, key_path: &Path) -> Result<CertifiedKey, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let signing_key = provider()
        .key_provider
        .load_private_key(key)
        .map_err(|source| TlsError::Key {
            path: key_path.display().to_string(),
            source,
        })?;
    let pair = CertifiedKey::new(certs, signing_key);
    pair.keys_match().map_err(|source| TlsError::Key {
        path: key_path.display().to_string(),
        source,
    })?;
    Ok(pair)
}

/// Load a CA bundle into a root store.
pub fn load_root_store(path: &Path) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(load_certs(path)?);
    if added == 0 {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    if ignored > 0 {
        tracing::warn!(path = %path.display(), ignored, "Skipped unparsable CA certificates");
    }
    Ok(roots)
}

/// Build the listener's TLS context.
///
/// The server certificate comes from `resolver`, consulted once per
/// handshake. With a trusted CA and `client_auth`, clients must present a
/// certificate chaining to it; with a CA but no `client_auth`, presented
/// certificates are verified but optional. `client_auth` without a CA is
/// rejected rather than served without client verification.
pub fn build_server_config(
    trusted_ca: Option<&Path>,
    client_auth: bool,
    resolver: Arc<dyn ResolvesServerCert>,
) -> Result<ServerConfig, TlsError> {
    let provider = provider();
    let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let builder = match trusted_ca {
        Some(ca) => {
            let roots = Arc::new(load_root_store(ca)?);
            let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider);
            let verifier = if client_auth {
                verifier.build()?
            } else {
                verifier.allow_unauthenticated().build()?
            };
            builder.with_client_cert_verifier(verifier)
        }
        None if client_auth => return Err(TlsError::MissingClientCa),
        None => builder.with_no_client_auth(),
    };

    let mut config = builder.with_cert_resolver(resolver);
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

/// Fields of an X.509 certificate used for identity and expiry metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    /// Full subject distinguished name.
    pub subject: String,
    /// First subject common name, if any.
    pub common_name: Option<String>,
    /// First subject organizational unit, if any.
    pub organizational_unit: Option<String>,
    /// Expiry as seconds since the Unix epoch.
    pub not_after: i64,
}

impl CertificateInfo {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, TlsError> {
        let (_, cert) =
            x509_parser::parse_x509_certificate(der).map_err(|e| TlsError::Parse(e.to_string()))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);
        let organizational_unit = cert
            .subject()
            .iter_organizational_unit()
            .next()
            .and_then(|ou| ou.as_str().ok())
            .map(str::to_string);

        Ok(Self {
            subject: cert.subject().to_string(),
            common_name,
            organizational_unit,
            not_after: cert.validity().not_after.timestamp(),
        })
    }

    /// Whole days from `now` until expiry; negative once expired.
    pub fn days_until_expiration(&self, now: SystemTime) -> i64 {
        let now = match now.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        };
        (self.not_after - now) / 86_400
    }
}
