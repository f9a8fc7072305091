//! WebSocket client for the conversational AI backend.
//! One task owns the socket: it pumps queued outbound messages down the wire
//! and turns inbound frames into [`RemoteEvent`]s for the session controller.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::{
    ClientContent, ClientMessage, Content, RealtimeInput, ServerMessage, Setup, ToolCall,
    ToolResponse, ToolResult,
};
use crate::audio::EncodedFrame;
use crate::config::VoiceConfig;
use crate::error::VoiceError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Decoded inbound traffic, in arrival order.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// Audio payload: base64 PCM16 plus its declared sample rate
    Audio { data: String, sample_rate: u32 },
    /// The user started speaking while the agent was talking
    Interrupted,
    /// The agent finished its response turn
    TurnComplete,
    /// A batch of calls that must each be answered
    ToolCalls(Vec<ToolCall>),
    /// Orderly close from the remote side
    Closed,
    /// The socket failed
    TransportError(String),
}

/// Handle to an open remote session.
///
/// Sending never blocks: messages queue onto the socket task. Dropping the
/// handle (or calling [`RemoteChannel::close`]) closes the socket.
pub struct RemoteChannel {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl RemoteChannel {
    /// Open the socket, send the setup message and wait for the remote
    /// acknowledgment, bounded by the configured connect timeout.
    pub async fn connect(
        config: &VoiceConfig,
        setup: Setup,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RemoteEvent>), VoiceError> {
        let api_key = config.require_api_key()?;
        let url = format!("{}?key={}", config.endpoint, api_key);

        let (mut ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| VoiceError::Transport(format!("connect failed: {}", e)))?;
        tracing::info!("Remote channel opened to {}", config.endpoint);

        let payload = serde_json::to_string(&ClientMessage::Setup(setup))
            .map_err(|e| VoiceError::Transport(e.to_string()))?;
        ws.send(Message::Text(payload.into()))
            .await
            .map_err(|e| VoiceError::Transport(format!("setup send failed: {}", e)))?;

        tokio::time::timeout(config.connect_timeout(), await_setup_ack(&mut ws))
            .await
            .map_err(|_| {
                VoiceError::Transport("timed out waiting for setup acknowledgment".to_string())
            })??;
        tracing::info!("Remote session acknowledged setup");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(pump(ws, out_rx, event_tx, shutdown_rx));

        Ok((
            Self {
                outbound: out_tx,
                shutdown: Mutex::new(Some(shutdown_tx)),
            },
            event_rx,
        ))
    }

    /// Queue one captured audio frame for transmission.
    pub fn send_audio(&self, frame: EncodedFrame) -> Result<(), VoiceError> {
        self.send(ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![frame],
        }))
    }

    /// Queue a one-shot system/context text turn.
    pub fn send_system_text(&self, text: impl Into<String>) -> Result<(), VoiceError> {
        self.send(ClientMessage::ClientContent(ClientContent {
            turns: vec![Content::user_text(text)],
            turn_complete: true,
        }))
    }

    /// Queue the answers to one inbound tool-call batch.
    pub fn send_tool_results(&self, results: Vec<ToolResult>) -> Result<(), VoiceError> {
        self.send(ClientMessage::ToolResponse(ToolResponse {
            function_responses: results,
        }))
    }

    fn send(&self, message: ClientMessage) -> Result<(), VoiceError> {
        self.outbound
            .send(message)
            .map_err(|_| VoiceError::Transport("remote channel closed".to_string()))
    }

    /// Close the socket. Safe to call more than once.
    pub fn close(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RemoteChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read inbound frames until the remote acknowledges setup.
async fn await_setup_ack(ws: &mut WsStream) -> Result<(), VoiceError> {
    while let Some(incoming) = ws.next().await {
        let message =
            incoming.map_err(|e| VoiceError::Transport(format!("handshake failed: {}", e)))?;
        if let Message::Text(txt) = message {
            match serde_json::from_str::<ServerMessage>(txt.as_str()) {
                Ok(parsed) if parsed.setup_complete.is_some() => return Ok(()),
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Skipping malformed handshake message: {}", e);
                }
            }
        }
    }
    Err(VoiceError::Transport(
        "remote closed before acknowledging setup".to_string(),
    ))
}

/// Own the socket until shutdown: outbound queue to the wire, inbound frames
/// to events. A malformed inbound message is logged and skipped, never fatal.
async fn pump(
    mut ws: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::UnboundedSender<RemoteEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            outgoing = out_rx.recv() => {
                let Some(message) = outgoing else {
                    let _ = ws.close(None).await;
                    break;
                };
                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!("Dropping unserializable outbound message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws.send(Message::Text(payload.into())).await {
                    let _ = event_tx.send(RemoteEvent::TransportError(e.to_string()));
                    break;
                }
            }
            incoming = ws.next() => {
                match incoming {
                    Some(Ok(Message::Text(txt))) => dispatch_inbound(txt.as_str(), &event_tx),
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = event_tx.send(RemoteEvent::Closed);
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong handled by the library
                    Some(Err(e)) => {
                        let _ = event_tx.send(RemoteEvent::TransportError(e.to_string()));
                        break;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                let _ = ws.close(None).await;
                break;
            }
        }
    }
    tracing::info!("Remote channel task finished");
}

fn dispatch_inbound(raw: &str, event_tx: &mpsc::UnboundedSender<RemoteEvent>) {
    let message: ServerMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Skipping malformed inbound message: {}", e);
            return;
        }
    };

    if let Some(content) = &message.server_content {
        // An interruption supersedes anything else in the same message
        if content.interrupted {
            let _ = event_tx.send(RemoteEvent::Interrupted);
            return;
        }
    }

    if let Some(batch) = message.tool_call {
        if !batch.function_calls.is_empty() {
            let _ = event_tx.send(RemoteEvent::ToolCalls(batch.function_calls));
        }
    }

    if let Some(content) = message.server_content {
        for blob in content.audio_chunks() {
            let _ = event_tx.send(RemoteEvent::Audio {
                data: blob.data.clone(),
                sample_rate: blob.sample_rate().unwrap_or(crate::audio::OUTPUT_SAMPLE_RATE),
            });
        }
        if content.turn_complete {
            let _ = event_tx.send(RemoteEvent::TurnComplete);
        }
    }
}
