//! TLS plumbing for the proxy frontend.
//!
//! The proxy terminates TLS locally with a fresh self-signed certificate
//! (clients are expected to disable verification or trust it explicitly)
//! and dials the real service with verified TLS, SNI set to the remote
//! hostname. Handshake secrets can be exported to a standard NSS key-log
//! file so captures of the proxied traffic can be decrypted offline.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rustls::{ClientConfig, KeyLog, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::ProxyError;

/// A freshly generated self-signed server identity for the local listener.
pub struct LocalIdentity {
    pub cert_der: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
}

impl LocalIdentity {
    /// Generate a throwaway certificate for `localhost`. Nothing is written
    /// to disk; the identity lives for one proxy run.
    pub fn generate() -> Result<LocalIdentity, ProxyError> {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])?;
        let cert_der = certified.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        ));
        Ok(LocalIdentity { cert_der, key })
    }

    /// A TLS acceptor presenting this identity.
    pub fn acceptor(&self) -> Result<TlsAcceptor, ProxyError> {
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![self.cert_der.clone()], self.key.clone_key())?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

/// A TLS connector for the upstream service, verifying against the system
/// trust store. `key_log` receives handshake secrets when set.
pub fn upstream_connector(
    key_log: Option<Arc<dyn KeyLog>>,
) -> Result<TlsConnector, ProxyError> {
    let mut roots = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in native.errors {
        tracing::debug!(error = %err, "skipping unreadable native certificate");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            tracing::debug!(error = %e, "skipping unusable native certificate");
        }
    }
    if roots.is_empty() {
        return Err(ProxyError::NoRootCertificates);
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    if let Some(key_log) = key_log {
        config.key_log = key_log;
    }
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Strip an optional `:port` suffix, leaving the hostname for SNI.
pub fn host_only(endpoint: &str) -> &str {
    match endpoint.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => endpoint,
    }
}

/// Parse a hostname into an owned TLS server name.
pub fn server_name(host: &str) -> Result<ServerName<'static>, ProxyError> {
    ServerName::try_from(host.to_string()).map_err(|_| ProxyError::InvalidServerName {
        name: host.to_string(),
    })
}

/// NSS-format key-log writer, shared by every connection's TLS client.
/// Writes are serialized; the file is opened in append mode so captures can
/// span proxy restarts.
pub struct NssKeyLog {
    file: Mutex<File>,
}

impl NssKeyLog {
    pub fn create(path: &Path) -> Result<NssKeyLog, ProxyError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(NssKeyLog {
            file: Mutex::new(file),
        })
    }
}

impl KeyLog for NssKeyLog {
    fn log(&self, label: &str, client_random: &[u8], secret: &[u8]) {
        let line = format!("{label} {} {}\n", hex(client_random), hex(secret));
        let mut file = self.file.lock().expect("key log lock");
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "failed to write tls key log entry");
        }
    }
}

impl std::fmt::Debug for NssKeyLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NssKeyLog").finish_non_exhaustive()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
