//! Signaling connection management: read/write pumps, ping/pong, send buffering.

use std::sync::Arc;

use dropline_protocol::constants::{WS_PING_PERIOD, WS_PONG_WAIT};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::SEND_BUFFER_SIZE;
use crate::handler::Handler;
use crate::registry::ConnId;

/// Handle for sending frames to one signaling client.
///
/// Cloneable; wraps an `mpsc::Sender`.
#[derive(Clone, Debug)]
pub struct PeerSender {
    id: ConnId,
    tx: mpsc::Sender<WsMessage>,
}

impl PeerSender {
    /// Connection id this sender writes to.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Queues a JSON text frame.
    ///
    /// Returns `Err` if the buffer is full or the client disconnected.
    pub fn send_text(&self, json: String) -> Result<(), SendError> {
        self.tx.try_send(WsMessage::Text(json.into())).map_err(|_| {
            tracing::warn!(conn_id = self.id, "send buffer full or closed, dropping message");
            SendError
        })
    }

    /// Returns `true` if the send channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    #[cfg(test)]
    pub(crate) fn for_test(id: ConnId, tx: mpsc::Sender<WsMessage>) -> Self {
        Self { id, tx }
    }
}

/// Error returned when the send channel is full or closed.
#[derive(Debug, thiserror::Error)]
#[error("send failed: buffer full or connection closed")]
pub struct SendError;

/// Active signaling connection.
///
/// Owns the read/write pump tasks.
pub struct PeerConnection {
    sender: PeerSender,
    cancel: CancellationToken,
    finished: JoinHandle<()>,
}

impl PeerConnection {
    pub fn sender(&self) -> PeerSender {
        self.sender.clone()
    }

    /// Signals shutdown of both pumps.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Waits until the read pump has stopped and the handler has been told.
    pub async fn closed(self) {
        let _ = self.finished.await;
    }
}

/// Runs the read and write pumps for a WebSocket connection.
///
/// The pumps run as background tokio tasks and stop when the client goes
/// away, stays silent past [`WS_PONG_WAIT`], or `server_cancel` fires.
pub fn spawn_connection<S, H>(
    ws_stream: S,
    id: ConnId,
    handler: Arc<H>,
    max_message_size: usize,
    server_cancel: CancellationToken,
) -> PeerConnection
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Send
        + 'static,
    H: Handler,
{
    let (tx, rx) = mpsc::channel::<WsMessage>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let sender = PeerSender { id, tx };

    let (ws_sink, ws_stream) = ws_stream.split();

    tokio::spawn(write_pump(ws_sink, rx, cancel.clone()));

    let read_cancel = cancel.clone();
    let read_sender = sender.clone();
    let finished = tokio::spawn(async move {
        read_pump(
            ws_stream,
            read_sender,
            Arc::clone(&handler),
            max_message_size,
            read_cancel.clone(),
        )
        .await;
        // When read pump exits, cancel the write pump too.
        read_cancel.cancel();
        handler.on_disconnected(id).await;
        tracing::info!(conn_id = id, "signaling client disconnected");
    });

    PeerConnection {
        sender,
        cancel,
        finished,
    }
}

/// Write pump: drains the send channel and sends WS pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<WsMessage>, cancel: CancellationToken)
where
    S: futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately.
    ping_interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(ws_msg) => {
                        if let Err(e) = sink.send(ws_msg).await {
                            tracing::error!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(WsMessage::Ping(Vec::new().into())).await {
                    tracing::error!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: reads WS frames and hands them to the handler.
///
/// Any incoming frame resets the read deadline.
async fn read_pump<S, H>(
    mut stream: S,
    sender: PeerSender,
    handler: Arc<H>,
    max_message_size: usize,
    cancel: CancellationToken,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Send
        + Unpin,
    H: Handler,
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                tracing::warn!(conn_id = sender.id, "read deadline expired, closing connection");
                break;
            }

            frame = stream.next() => {
                let ws_msg = match frame {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        tracing::error!(conn_id = sender.id, "read pump error: {e}");
                        break;
                    }
                    None => break,
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                match ws_msg {
                    WsMessage::Text(text) => {
                        if text.len() > max_message_size {
                            tracing::error!(conn_id = sender.id, "message exceeds max size ({} > {max_message_size})", text.len());
                            continue;
                        }
                        handler.on_text(sender.clone(), text.as_str().to_owned()).await;
                    }
                    WsMessage::Binary(data) => {
                        if data.len() > max_message_size {
                            tracing::error!(conn_id = sender.id, "binary message exceeds max size ({} > {max_message_size})", data.len());
                            continue;
                        }
                        match String::from_utf8(data.to_vec()) {
                            Ok(text) => handler.on_text(sender.clone(), text).await,
                            Err(_) => tracing::warn!(conn_id = sender.id, "dropping non-UTF-8 binary frame"),
                        }
                    }
                    WsMessage::Ping(data) => {
                        let _ = sender.tx.try_send(WsMessage::Pong(data));
                    }
                    WsMessage::Pong(_) => {}
                    WsMessage::Close(_) => {
                        tracing::debug!(conn_id = sender.id, "received close frame");
                        break;
                    }
                    WsMessage::Frame(_) => {}
                }
            }
        }
    }
}
