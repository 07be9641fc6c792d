//! Trust material for secured sessions.
//!
//! # Responsibilities
//! - Server identity from PEM files or a generated self-signed certificate
//! - Client trust from explicit certificates, a PEM bundle, or accept-any mode
//!
//! Every config is built on the `ring` provider with the safe default
//! protocol versions.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};

use crate::config::TlsConfig;
use crate::error::{Result, TransportError};

/// Which side of the handshake a session plays, and what it trusts.
#[derive(Clone)]
pub enum TlsPolicy {
    /// Accept handshakes with this identity.
    Server(Arc<ServerConfig>),
    /// Initiate handshakes and verify the peer as `server_name`.
    Client {
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    },
}

impl fmt::Debug for TlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsPolicy::Server(_) => f.write_str("TlsPolicy::Server"),
            TlsPolicy::Client { server_name, .. } => f
                .debug_struct("TlsPolicy::Client")
                .field("server_name", server_name)
                .finish(),
        }
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn tls_err(context: &str, err: impl fmt::Display) -> TransportError {
    TransportError::Tls(format!("{context}: {err}"))
}

impl TlsPolicy {
    /// Server identity from a certificate chain and its private key.
    pub fn server(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self> {
        let config = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| tls_err("protocol versions", e))?
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(|e| tls_err("server certificate", e))?;
        Ok(TlsPolicy::Server(Arc::new(config)))
    }

    /// Server identity loaded from PEM files.
    pub fn server_from_pem(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let chain = load_certs(cert_path)?;
        let mut reader = open(key_path)?;
        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(|e| tls_err("reading private key", e))?
            .ok_or_else(|| {
                TransportError::Tls(format!("no private key found in {}", key_path.display()))
            })?;
        Self::server(chain, key)
    }

    /// Server identity backed by a freshly generated self-signed certificate.
    pub fn server_self_signed(names: &[String]) -> Result<Self> {
        let identity = SelfSignedIdentity::generate(names)?;
        Self::server(vec![identity.cert], identity.key)
    }

    /// Client trusting exactly `roots`.
    pub fn client_trusting(roots: Vec<CertificateDer<'static>>, server_name: &str) -> Result<Self> {
        let mut store = RootCertStore::empty();
        for cert in roots {
            store
                .add(cert)
                .map_err(|e| tls_err("trusted certificate", e))?;
        }
        let config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| tls_err("protocol versions", e))?
            .with_root_certificates(store)
            .with_no_client_auth();
        Ok(TlsPolicy::Client {
            config: Arc::new(config),
            server_name: server_name_of(server_name)?,
        })
    }

    /// Client trusting the certificates of a PEM bundle.
    pub fn client_from_pem(ca_path: &Path, server_name: &str) -> Result<Self> {
        Self::client_trusting(load_certs(ca_path)?, server_name)
    }

    /// Client that accepts any server certificate. Test/dev only.
    pub fn insecure_client(server_name: &str) -> Result<Self> {
        let config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| tls_err("protocol versions", e))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
            .with_no_client_auth();
        Ok(TlsPolicy::Client {
            config: Arc::new(config),
            server_name: server_name_of(server_name)?,
        })
    }

    /// Listener side from configuration: PEM files when set, self-signed otherwise.
    pub fn server_from_config(config: &TlsConfig) -> Result<Self> {
        match (&config.cert_path, &config.key_path) {
            (Some(cert), Some(key)) => Self::server_from_pem(Path::new(cert), Path::new(key)),
            _ => Self::server_self_signed(&config.self_signed_names),
        }
    }

    /// Connecting side from configuration.
    pub fn client_from_config(config: &TlsConfig) -> Result<Self> {
        if config.insecure {
            return Self::insecure_client(&config.server_name);
        }
        match &config.ca_path {
            Some(ca) => Self::client_from_pem(Path::new(ca), &config.server_name),
            None => Err(TransportError::Tls(
                "client TLS needs ca_path or insecure = true".into(),
            )),
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, TlsPolicy::Server(_))
    }
}

/// Generated certificate and key, for tests and development listeners.
#[derive(Debug)]
pub struct SelfSignedIdentity {
    pub cert: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

impl SelfSignedIdentity {
    pub fn generate(names: &[String]) -> Result<Self> {
        let certified = rcgen::generate_simple_self_signed(names.to_vec())
            .map_err(|e| tls_err("generating self-signed certificate", e))?;
        Ok(Self {
            cert: certified.cert.der().clone(),
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                certified.key_pair.serialize_der(),
            )),
        })
    }

    /// Server policy presenting this identity.
    pub fn server_policy(&self) -> Result<TlsPolicy> {
        TlsPolicy::server(vec![self.cert.clone()], self.key.clone_key())
    }

    /// Client policy trusting only this identity.
    pub fn client_policy(&self, server_name: &str) -> Result<TlsPolicy> {
        TlsPolicy::client_trusting(vec![self.cert.clone()], server_name)
    }
}

fn server_name_of(name: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(name.to_string()).map_err(|e| tls_err("server name", e))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| TransportError::Tls(format!("{}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| tls_err("reading certificates", e))?;
    if certs.is_empty() {
        return Err(TransportError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Verifier that accepts every server certificate.
#[derive(Debug)]
pub struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
