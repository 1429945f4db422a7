//! Proxy frontend error types.

use faultline_core::error::MirrorError;

/// Failures in the listener, TLS setup, or per-connection wiring.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Listener or socket I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake failed.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    /// Local certificate generation failed.
    #[error("certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    /// The remote hostname is not a valid TLS server name.
    #[error("invalid tls server name {name:?}")]
    InvalidServerName {
        /// The rejected hostname.
        name: String,
    },

    /// The system trust store yielded no usable roots, so upstream TLS
    /// could not be verified.
    #[error("no system root certificates found")]
    NoRootCertificates,

    /// An endpoint string was empty.
    #[error("endpoint must not be empty")]
    EmptyEndpoint,

    /// The mirror for a connection failed.
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}
