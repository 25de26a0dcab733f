//! WebSocket signaling pipe to the relay.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use dropline_protocol::Envelope;
use dropline_protocol::constants::{SIGNALING_SUBPROTOCOL, WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};

use crate::PeerEvent;
use crate::pipe::{PipeError, SignalingPipe};

const WRITE_BUFFER_SIZE: usize = 64;

/// A connected signaling pipe.
///
/// Incoming envelopes are posted to the event queue given to
/// [`WsPipe::connect`]; [`PeerEvent::SignalingClosed`] follows when the
/// socket goes away.
pub struct WsPipe {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: JoinHandle<()>,
    _write_handle: JoinHandle<()>,
}

impl WsPipe {
    /// Connects to the relay at `url` and posts
    /// [`PeerEvent::SignalingOpened`] once the handshake completes.
    pub async fn connect<C: Send + 'static>(
        url: &str,
        events: mpsc::Sender<PeerEvent<C>>,
    ) -> Result<Self, PipeError> {
        let mut request = url.into_client_request()?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(SIGNALING_SUBPROTOCOL),
        );

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false).await?;
        info!(%url, "connected to relay");

        let (write, read) = ws_stream.split();
        let (write_tx, write_rx) = mpsc::channel(WRITE_BUFFER_SIZE);
        let cancel = CancellationToken::new();

        events
            .send(PeerEvent::SignalingOpened)
            .await
            .map_err(|_| PipeError::Closed)?;

        let write_handle = tokio::spawn(write_pump(write, write_rx, cancel.clone()));
        let read_handle = tokio::spawn(read_pump(read, events, write_tx.clone(), cancel.clone()));

        Ok(Self {
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
        })
    }

    pub fn is_connected(&self) -> bool {
        !self.cancel.is_cancelled() && !self.write_tx.is_closed()
    }

    /// Closes the socket; the read side reports the closure.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl SignalingPipe for WsPipe {
    fn send(&self, envelope: &Envelope) -> Result<(), PipeError> {
        if self.cancel.is_cancelled() {
            return Err(PipeError::Closed);
        }
        let json = envelope.encode()?;
        trace!(signal_type = %envelope.signal_type, "sending envelope");
        self.write_tx
            .try_send(tungstenite::Message::Text(json.into()))
            .map_err(|_| PipeError::Closed)
    }
}

impl Drop for WsPipe {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(m) = msg else { break };
                if let Err(e) = write.send(m).await {
                    error!("WebSocket write error: {e}");
                    break;
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

/// Forwards envelopes from the relay as events until the socket ends.
///
/// Like the relay, any incoming frame resets the read deadline.
async fn read_pump<S, C>(
    mut read: S,
    events: mpsc::Sender<PeerEvent<C>>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!("relay silent for too long, closing");
                break;
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                match msg {
                    tungstenite::Message::Text(text) => match Envelope::decode(&text) {
                        Ok(envelope) => {
                            if events.send(PeerEvent::Signal(envelope)).await.is_err() {
                                debug!("event queue gone, stopping read pump");
                                break;
                            }
                        }
                        Err(e) => warn!("malformed envelope from relay: {e}"),
                    },
                    tungstenite::Message::Ping(data) => {
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Close(_) => {
                        debug!("relay closed the connection");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    cancel.cancel();
    let _ = events.send(PeerEvent::SignalingClosed).await;
}
