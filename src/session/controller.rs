use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::tools::ToolDispatcher;
use super::{SessionStatus, UiAction};
use crate::audio::{
    decode_base64_pcm, CapturePipeline, EncodedFrame, EnergyVisualizer, PlaybackScheduler,
    VisualFrame, INPUT_SAMPLE_RATE,
};
use crate::booking::{BookingData, ScanResult};
use crate::config::VoiceConfig;
use crate::error::VoiceError;
use crate::remote::protocol::{
    Content, GenerationConfig, PrebuiltVoice, Setup, SpeechConfig, VoiceSelection,
};
use crate::remote::{RemoteChannel, RemoteEvent};

/// Receiving ends handed to the UI shell.
pub struct SessionEvents {
    /// Connection status for display
    pub status: watch::Receiver<SessionStatus>,
    /// Visual intensity frames while connected
    pub visuals: watch::Receiver<VisualFrame>,
    /// Side effects requested by the remote agent
    pub actions: mpsc::UnboundedReceiver<UiAction>,
}

/// Resources owned by one live connection, torn down together.
struct ActiveSession {
    channel: Arc<RemoteChannel>,
    pump: JoinHandle<()>,
    visualizer: JoinHandle<()>,
}

/// Orchestrates the live voice session.
///
/// Owns the connection lifecycle (`disconnected -> connecting -> connected ->
/// disconnected | error`) and wires microphone frames into the remote channel
/// and inbound traffic into the playback scheduler and tool dispatcher. Every
/// resource acquired while connecting is released on every exit path, and
/// teardown is idempotent. Only the mute setting survives across sessions.
pub struct SessionController {
    config: VoiceConfig,
    capture: CapturePipeline,
    playback: PlaybackScheduler,
    dispatcher: ToolDispatcher,
    status_tx: watch::Sender<SessionStatus>,
    visual_tx: watch::Sender<VisualFrame>,
    active: Mutex<Option<ActiveSession>>,
    last_scan: Mutex<Option<Uuid>>,
    /// Back-reference handed to the event-pump task
    this: Weak<SessionController>,
}

impl SessionController {
    pub fn new(config: VoiceConfig) -> (Arc<Self>, SessionEvents) {
        let (status_tx, status_rx) = watch::channel(SessionStatus::Disconnected);
        let (visual_tx, visual_rx) = watch::channel(VisualFrame::baseline());
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();

        let controller = Arc::new_cyclic(|this| Self {
            dispatcher: ToolDispatcher::new(config.contact_number.clone(), actions_tx),
            config,
            capture: CapturePipeline::new(),
            playback: PlaybackScheduler::new(),
            status_tx,
            visual_tx,
            active: Mutex::new(None),
            last_scan: Mutex::new(None),
            this: this.clone(),
        });

        (
            controller,
            SessionEvents {
                status: status_rx,
                visuals: visual_rx,
                actions: actions_rx,
            },
        )
    }

    pub fn status(&self) -> SessionStatus {
        *self.status_tx.borrow()
    }

    /// Open a session. `context` is free text describing what the user is
    /// interested in; it is passed to the agent with the greeting request.
    pub async fn open(&self, context: Option<String>) -> Result<(), VoiceError> {
        let this = self.this.upgrade().ok_or(VoiceError::NotConnected)?;
        match self.status() {
            SessionStatus::Connecting | SessionStatus::Connected => {
                return Err(VoiceError::AlreadyConnected);
            }
            _ => {}
        }

        self.status_tx.send_replace(SessionStatus::Connecting);
        self.dispatcher.reset();

        let setup = self.build_setup();
        let (channel, events) = match RemoteChannel::connect(&self.config, setup).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!("Session connect failed: {}", e);
                self.status_tx.send_replace(SessionStatus::Error);
                return Err(e);
            }
        };
        let channel = Arc::new(channel);

        // Output graph and its visualizer. A missing output device degrades
        // the session (no agent audio) instead of failing it.
        if let Err(e) = self.playback.start() {
            tracing::warn!("Agent audio disabled: {}", e);
        }
        let visualizer = EnergyVisualizer::new(self.playback.visual_tap())
            .spawn(self.visual_tx.clone());

        // Microphone. Permission or device failures leave the session up in
        // a voice-disabled state; the user can still hear the agent.
        let outbound = channel.clone();
        if let Err(e) = self.capture.start(move |frame| {
            let encoded = EncodedFrame::from_samples(&frame, INPUT_SAMPLE_RATE);
            let _ = outbound.send_audio(encoded);
        }) {
            if e.is_recoverable() {
                tracing::warn!("Voice capture disabled: {}", e);
            } else {
                tracing::error!("Voice capture failed unexpectedly: {}", e);
            }
        }

        let pump = tokio::spawn(this.run_events(events, channel.clone()));

        *self.active.lock() = Some(ActiveSession {
            channel: channel.clone(),
            pump,
            visualizer,
        });
        self.status_tx.send_replace(SessionStatus::Connected);
        tracing::info!("Live session connected");

        let context_prompt = context
            .map(|c| format!("Context: User is interested in \"{}\". ", c))
            .unwrap_or_default();
        let greeting = format!(
            "System: User connected. {}IMMEDIATELY greet them verbally and offer to help.",
            context_prompt
        );
        if let Err(e) = channel.send_system_text(greeting) {
            tracing::warn!("Greeting request failed: {}", e);
        }

        Ok(())
    }

    /// Close the session and release everything. Safe to call repeatedly.
    pub fn close(&self) {
        self.finish(SessionStatus::Disconnected);
    }

    /// Mute or unmute the microphone. Preserved across reconnects.
    pub fn set_muted(&self, muted: bool) {
        self.capture.set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.capture.is_muted()
    }

    /// Current human-contact link text (updated by the contact-summary tool).
    pub fn contact_url(&self) -> String {
        self.dispatcher.contact_url()
    }

    /// Best-known booking record accumulated by the booking tool.
    pub fn booking_snapshot(&self) -> BookingData {
        self.dispatcher.booking_snapshot()
    }

    /// Playback scheduler readouts (buffered lead, scheduled set).
    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    /// Inject a fresh scan result into the conversation as system context.
    /// Returns `Ok(false)` when the result was already injected (same id),
    /// so re-renders of an unchanged record never repeat it.
    pub fn inject_scan_result(&self, scan: &ScanResult) -> Result<bool, VoiceError> {
        if self.status() != SessionStatus::Connected {
            return Err(VoiceError::NotConnected);
        }

        let mut last = self.last_scan.lock();
        if *last == Some(scan.id) {
            return Ok(false);
        }

        let channel = self
            .active
            .lock()
            .as_ref()
            .map(|active| active.channel.clone())
            .ok_or(VoiceError::NotConnected)?;
        channel.send_system_text(format!(
            "System: {} Use this to help the user without asking them to repeat it.",
            scan.summary()
        ))?;
        *last = Some(scan.id);
        tracing::info!("Scan result {} shared with the agent", scan.id);
        Ok(true)
    }

    fn build_setup(&self) -> Setup {
        Setup {
            model: self.config.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceSelection {
                        prebuilt_voice_config: PrebuiltVoice {
                            voice_name: self.config.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Content::system_text(self.config.agent_instruction.clone()),
            tools: ToolDispatcher::declarations(),
        }
    }

    /// Consume inbound events until the channel ends, then tear down.
    async fn run_events(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<RemoteEvent>,
        channel: Arc<RemoteChannel>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                RemoteEvent::Audio { data, .. } => match decode_base64_pcm(&data, 1) {
                    Ok(samples) => {
                        self.playback.enqueue(samples);
                    }
                    Err(e) => {
                        tracing::warn!("Skipping undecodable audio payload: {}", e);
                    }
                },
                RemoteEvent::Interrupted => {
                    // Barge-in: flush agent audio, no state transition
                    self.playback.interrupt();
                }
                RemoteEvent::ToolCalls(calls) => {
                    let results = self.dispatcher.dispatch_batch(&calls);
                    if let Err(e) = channel.send_tool_results(results) {
                        tracing::warn!("Tool results not delivered: {}", e);
                    }
                }
                RemoteEvent::TurnComplete => {
                    tracing::debug!("Agent turn complete");
                }
                RemoteEvent::Closed => {
                    tracing::info!("Remote side closed the session");
                    self.finish(SessionStatus::Disconnected);
                    break;
                }
                RemoteEvent::TransportError(message) => {
                    tracing::error!("Session transport fault: {}", message);
                    self.finish(SessionStatus::Error);
                    break;
                }
            }
        }
    }

    /// Shared teardown for every exit path: release the capture device,
    /// flush and close playback, cancel the visualizer, close the channel.
    fn finish(&self, final_status: SessionStatus) {
        let active = self.active.lock().take();
        let Some(active) = active else {
            // Nothing live; a close while connecting/errored still settles
            // the status back to disconnected.
            if final_status == SessionStatus::Disconnected
                && self.status() != SessionStatus::Disconnected
            {
                self.status_tx.send_replace(SessionStatus::Disconnected);
            }
            return;
        };

        self.capture.stop();
        self.playback.stop();
        active.visualizer.abort();
        self.visual_tx.send_replace(VisualFrame::baseline());
        active.channel.close();
        active.pump.abort();

        self.status_tx.send_replace(final_status);
        tracing::info!("Session finished as {:?}", final_status);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(active) = self.active.lock().take() {
            self.capture.stop();
            self.playback.stop();
            active.visualizer.abort();
            active.channel.close();
            active.pump.abort();
        }
    }
}
