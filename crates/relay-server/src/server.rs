//! Relay WebSocket server.
//!
//! Listens on a TCP port, upgrades every connection to WebSocket and
//! hands frames to the [`Handler`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use dropline_protocol::constants::{DEFAULT_RELAY_PORT, SIGNALING_SUBPROTOCOL, WS_MAX_MESSAGE_SIZE};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_util::sync::CancellationToken;

use crate::ServerError;
use crate::connection;
use crate::handler::Handler;
use crate::relay::Relay;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Largest accepted signaling message, in bytes.
    ///
    /// Larger messages up to twice this size are dropped and logged while
    /// the connection stays open. Beyond that the transport closes it.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_RELAY_PORT,
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

/// The signaling relay server.
pub struct RelayServer<H: Handler = Relay> {
    config: ServerConfig,
    handler: Arc<H>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    running: AtomicBool,
    next_conn_id: AtomicU64,
    active: AtomicUsize,
}

impl<H: Handler> RelayServer<H> {
    /// Creates a new server with the given handler.
    pub fn new(config: ServerConfig, handler: H) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler: Arc::new(handler),
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            running: AtomicBool::new(false),
            next_conn_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
        })
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Returns the local address the server is listening on.
    ///
    /// Only available after [`run`](Self::run) binds the socket.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }

    /// Returns the listening port (0 if not yet bound).
    pub async fn port(&self) -> u16 {
        self.local_addr.lock().await.map(|a| a.port()).unwrap_or(0)
    }

    /// Number of currently connected signaling clients.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Gracefully shuts down the server and every connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the server until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = SocketAddr::new(self.config.bind, self.config.port);
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(local_addr);
        tracing::info!("relay listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, peer_addr).await {
                                    tracing::error!(%peer_addr, "connection error: {e}");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                        }
                    }
                }
            }
        }
    }

    /// Upgrades one TCP connection and serves it until it closes.
    async fn handle_connection(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), ServerError> {
        // The read pump enforces max_message_size itself; the transport cap
        // only bounds memory for frames far past it.
        let transport_limit = self.config.max_message_size.saturating_mul(2);
        let mut ws_config = tokio_tungstenite::tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(transport_limit);
        ws_config.max_frame_size = Some(transport_limit);
        let ws_stream =
            accept_hdr_async_with_config(stream, negotiate_subprotocol, Some(ws_config)).await?;

        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(conn_id, %peer_addr, "signaling client connected");

        self.active.fetch_add(1, Ordering::SeqCst);
        let conn = connection::spawn_connection(
            ws_stream,
            conn_id,
            Arc::clone(&self.handler),
            self.config.max_message_size,
            self.cancel.clone(),
        );
        conn.closed().await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        Ok(())
    }
}

/// Echoes the `json` subprotocol when the client asks for it.
///
/// Browsers abort the handshake if a requested subprotocol is not
/// confirmed.
fn negotiate_subprotocol(
    request: &Request,
    mut response: Response,
) -> Result<Response, ErrorResponse> {
    let requested = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|p| p.trim() == SIGNALING_SUBPROTOCOL));

    if requested {
        response.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(SIGNALING_SUBPROTOCOL),
        );
    }
    Ok(response)
}
