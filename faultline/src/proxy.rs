//! The proxy frontend: TLS listener, per-connection spawn, and wiring of
//! codec ↔ mirror ↔ trace for each accepted connection.
//!
//! Per-connection sequence: accept TLS locally with a generated certificate,
//! dial the real service, wrap it in verified TLS (SNI = remote hostname,
//! handshake secrets optionally key-logged), then hand both streams to the
//! two-phase mirror. Sockets close on every exit path because the halves
//! are owned by the mirror and dropped with it.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;

use faultline_core::injector::Injector;
use faultline_core::mirror::MirrorConn;
use faultline_core::trace::FrameTracer;

use crate::error::ProxyError;
use crate::tls::{self, NssKeyLog};

/// AMQP-over-TLS default port, appended to bare hostnames.
const AMQPS_PORT: u16 = 5671;

#[derive(Debug, Default, Clone)]
pub struct ProxyOptions {
    /// Newline-delimited JSON trace of all mirrored traffic.
    pub trace_file: Option<PathBuf>,
    /// NSS-format TLS key log, shared across connections.
    pub tls_key_log_file: Option<PathBuf>,
    /// When set, the bound listen address is written here (pair with port 0
    /// to let the OS pick); removed again on shutdown.
    pub address_file: Option<PathBuf>,
}

/// The fault-injection proxy: one listener, one injector, any number of
/// mirrored connections.
pub struct FaultProxy {
    local_endpoint: String,
    remote_endpoint: String,
    injector: Arc<dyn Injector>,
    options: ProxyOptions,
    cancel: CancellationToken,
}

impl FaultProxy {
    /// `local_endpoint` is where clients connect; `remote_endpoint` is the
    /// real service, defaulting to port 5671 when none is given.
    pub fn new(
        local_endpoint: impl Into<String>,
        remote_endpoint: impl Into<String>,
        injector: Arc<dyn Injector>,
        options: ProxyOptions,
    ) -> Result<FaultProxy, ProxyError> {
        let local_endpoint = local_endpoint.into();
        let mut remote_endpoint = remote_endpoint.into();
        if local_endpoint.is_empty() || remote_endpoint.is_empty() {
            return Err(ProxyError::EmptyEndpoint);
        }
        if !remote_endpoint.contains(':') {
            remote_endpoint = format!("{remote_endpoint}:{AMQPS_PORT}");
        }

        Ok(FaultProxy {
            local_endpoint,
            remote_endpoint,
            injector,
            options,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancelling this token closes the listener and tears down every live
    /// connection, including pending delayed frames.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept and mirror connections until the cancellation token trips.
    /// Accept failures after cancellation are expected (the socket is being
    /// closed) and not reported as errors.
    pub async fn listen_and_serve(&self) -> Result<(), ProxyError> {
        tracing::info!("starting server");
        let listener = TcpListener::bind(&self.local_endpoint).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "listener started");

        let _address_file = match &self.options.address_file {
            Some(path) => {
                std::fs::write(path, local_addr.to_string())?;
                Some(AddressFileGuard(path.clone()))
            }
            None => None,
        };

        let identity = tls::LocalIdentity::generate()?;
        let acceptor = identity.acceptor()?;

        let key_log = match &self.options.tls_key_log_file {
            Some(path) => Some(Arc::new(NssKeyLog::create(path)?) as Arc<dyn rustls::KeyLog>),
            None => None,
        };
        let connector = tls::upstream_connector(key_log)?;

        let tracer = match &self.options.trace_file {
            Some(path) => Some(Arc::new(FrameTracer::create(path)?)),
            None => None,
        };

        let sni = tls::server_name(tls::host_only(&self.remote_endpoint))?;

        tracing::info!(remote = %self.remote_endpoint, "server started, accepting connections");
        loop {
            let (socket, peer) = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("cancellation received, closing listener");
                    return Ok(());
                }
                accepted = listener.accept() => accepted?,
            };
            tracing::info!(client = %peer, "connection accepted");

            let conn = ConnHandler {
                acceptor: acceptor.clone(),
                connector: connector.clone(),
                sni: sni.clone(),
                remote_endpoint: self.remote_endpoint.clone(),
                injector: self.injector.clone(),
                tracer: tracer.clone(),
                cancel: self.cancel.child_token(),
            };
            tokio::spawn(async move {
                if let Err(e) = conn.mirror_connection(socket).await {
                    tracing::error!(client = %peer, error = %e, "failed mirroring connection");
                }
            });
        }
    }
}

struct ConnHandler {
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    sni: rustls_pki_types::ServerName<'static>,
    remote_endpoint: String,
    injector: Arc<dyn Injector>,
    tracer: Option<Arc<FrameTracer>>,
    cancel: CancellationToken,
}

impl ConnHandler {
    async fn mirror_connection(self, local_socket: TcpStream) -> Result<(), ProxyError> {
        let local_tls = self.acceptor.accept(local_socket).await?;

        tracing::info!(remote = %self.remote_endpoint, "setting up remote tls connection");
        let remote_tcp = TcpStream::connect(&self.remote_endpoint).await?;
        let remote_tls = self.connector.connect(self.sni, remote_tcp).await?;

        let mut mirror = MirrorConn::new(
            tokio::io::split(local_tls),
            tokio::io::split(remote_tls),
            self.tracer,
            self.cancel,
        );
        mirror.run_two_phase(self.injector).await?;
        tracing::info!("connection finished");
        Ok(())
    }
}

/// Removes the listen-address file on shutdown.
struct AddressFileGuard(PathBuf);

impl Drop for AddressFileGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            tracing::debug!(error = %e, "failed to remove address file");
        }
    }
}
