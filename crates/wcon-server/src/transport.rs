//! WebSocket listener using tokio-tungstenite.
//!
//! Accepts viewer connections on a TCP port and hands them to the server
//! through a channel after the WebSocket handshake.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wcon_core::{WconError, WconResult};

/// The WebSocket stream type used by console sessions.
pub type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A handle to an accepted WebSocket connection.
pub struct WsConnection {
    pub ws_stream: WsStream,
    /// Remote address, when the peer resolved one.
    pub remote_addr: Option<SocketAddr>,
}

/// Start the WebSocket listener.
///
/// Returns the bound address (useful when the port is 0) and a receiver
/// that yields accepted connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> WconResult<(SocketAddr, mpsc::Receiver<WsConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| WconError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener
        .local_addr()
        .map_err(|e| WconError::Transport(format!("WS local_addr failed: {e}")))?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WsConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WsConnection {
                                    ws_stream,
                                    remote_addr: Some(addr),
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((local_addr, rx))
}
