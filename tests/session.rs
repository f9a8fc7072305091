//! End-to-end session tests against a scripted remote endpoint.
//!
//! A local WebSocket server plays the conversational backend: it answers the
//! setup handshake, then pushes whatever the test scripts (audio payloads,
//! interruptions, tool-call batches) while recording everything the client
//! sends. Audio devices are not required; the playback schedule is observed
//! directly.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use voicelink::audio::encode_base64_pcm;
use voicelink::{ScanResult, SessionController, SessionStatus, UiAction, VoiceConfig};

struct MockRemote {
    endpoint: String,
    to_client: Option<mpsc::UnboundedSender<Value>>,
    from_client: mpsc::UnboundedReceiver<Value>,
}

impl MockRemote {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel::<Value>();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // Handshake: the first client message must be the setup
            let first = ws.next().await.unwrap().unwrap();
            let setup: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
            assert!(setup.get("setup").is_some(), "first message must be setup");
            let _ = sent_tx.send(setup);
            ws.send(Message::text(json!({"setupComplete": {}}).to_string()))
                .await
                .unwrap();

            loop {
                tokio::select! {
                    pushed = push_rx.recv() => match pushed {
                        Some(value) => {
                            if ws.send(Message::text(value.to_string())).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = ws.close(None).await;
                            break;
                        }
                    },
                    incoming = ws.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(value) = serde_json::from_str(text.as_str()) {
                                let _ = sent_tx.send(value);
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    }
                }
            }
        });

        Self {
            endpoint: format!("ws://{}", addr),
            to_client: Some(push_tx),
            from_client: sent_rx,
        }
    }

    fn config(&self) -> VoiceConfig {
        VoiceConfig {
            endpoint: self.endpoint.clone(),
            api_key: "test-key".to_string(),
            connect_timeout_secs: 5,
            ..VoiceConfig::default()
        }
    }

    fn push(&self, value: Value) {
        self.to_client.as_ref().unwrap().send(value).unwrap();
    }

    /// Close the socket from the remote side.
    fn hang_up(&mut self) {
        self.to_client.take();
    }

    async fn recv(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(2), self.from_client.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("client went away")
    }

    /// Receive messages until one satisfies the predicate.
    async fn recv_matching(&mut self, mut predicate: impl FnMut(&Value) -> bool) -> Value {
        loop {
            let value = self.recv().await;
            if predicate(&value) {
                return value;
            }
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn connecting_sends_setup_then_greeting_with_context() {
    let mut remote = MockRemote::spawn().await;
    let (controller, _events) = SessionController::new(remote.config());

    controller
        .open(Some("Precision Repair".to_string()))
        .await
        .unwrap();
    assert_eq!(controller.status(), SessionStatus::Connected);

    let setup = remote.recv().await;
    assert_eq!(
        setup["setup"]["generationConfig"]["responseModalities"][0],
        "AUDIO"
    );
    let tools = setup["setup"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 4);

    let greeting = remote
        .recv_matching(|v| v.get("clientContent").is_some())
        .await;
    let text = greeting["clientContent"]["turns"][0]["parts"][0]["text"]
        .as_str()
        .unwrap();
    assert!(text.contains("IMMEDIATELY greet"));
    assert!(text.contains("Precision Repair"));

    controller.close();
    assert_eq!(controller.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn tool_batches_are_fully_answered_and_merged() {
    let mut remote = MockRemote::spawn().await;
    let (controller, mut events) = SessionController::new(remote.config());
    controller.open(None).await.unwrap();

    remote.push(json!({
        "toolCall": {"functionCalls": [
            {"id": "c-1", "name": "open_booking_form", "args": {"name": "Thabo"}},
            {"id": "c-2", "name": "share_contact_summary", "args": {"summary": "MacBook won't boot"}},
            {"id": "c-3", "name": "reticulate_splines", "args": {}}
        ]}
    }));

    let response = remote
        .recv_matching(|v| v.get("toolResponse").is_some())
        .await;
    let results = response["toolResponse"]["functionResponses"]
        .as_array()
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["id"], "c-1");
    assert_eq!(results[1]["id"], "c-2");
    assert_eq!(results[2]["id"], "c-3");
    assert_eq!(results[2]["response"]["result"], "unsupported tool");

    // A later call merges onto the same record instead of replacing it
    remote.push(json!({
        "toolCall": {"functionCalls": [
            {"id": "c-4", "name": "open_booking_form", "args": {"phone": "0820000000"}}
        ]}
    }));
    remote
        .recv_matching(|v| {
            v["toolResponse"]["functionResponses"]
                .as_array()
                .is_some_and(|r| r[0]["id"] == "c-4")
        })
        .await;

    let booking = controller.booking_snapshot();
    assert_eq!(booking.name.as_deref(), Some("Thabo"));
    assert_eq!(booking.phone.as_deref(), Some("0820000000"));

    assert!(controller
        .contact_url()
        .contains("text=MacBook%20won%27t%20boot"));

    // The UI shell saw the form open both times
    let action = events.actions.recv().await.unwrap();
    assert!(matches!(action, UiAction::OpenBookingForm(_)));

    controller.close();
}

#[tokio::test]
async fn inbound_audio_is_scheduled_in_order_and_interrupt_flushes() {
    let mut remote = MockRemote::spawn().await;
    let (controller, _events) = SessionController::new(remote.config());
    controller.open(None).await.unwrap();
    remote.recv().await; // setup

    let chunk_a = encode_base64_pcm(&vec![0.3f32; 2400]);
    let chunk_b = encode_base64_pcm(&vec![-0.3f32; 1200]);
    remote.push(json!({
        "serverContent": {"modelTurn": {"parts": [
            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": chunk_a}},
            {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": chunk_b}}
        ]}}
    }));

    // Both chunks land on the timeline back-to-back: the cursor sits at the
    // end of the second buffer regardless of when each decode finished.
    wait_until(|| controller.playback().cursor() >= 3600).await;
    assert!(controller.playback().scheduled_len() <= 2);

    remote.push(json!({"serverContent": {"interrupted": true}}));
    wait_until(|| controller.playback().scheduled_len() == 0).await;
    // Cursor was reset to "now" at the interrupt; it never runs ahead of it
    assert!(controller.playback().cursor() <= controller.playback().now());

    controller.close();
}

#[tokio::test]
async fn remote_close_tears_the_session_down() {
    let mut remote = MockRemote::spawn().await;
    let (controller, _events) = SessionController::new(remote.config());
    controller.open(None).await.unwrap();
    assert_eq!(controller.status(), SessionStatus::Connected);

    remote.hang_up();
    wait_until(|| controller.status() == SessionStatus::Disconnected).await;

    // Teardown is idempotent after the remote already closed
    controller.close();
    controller.close();
    assert_eq!(controller.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn scan_results_inject_exactly_once_per_id() {
    let mut remote = MockRemote::spawn().await;
    let (controller, _events) = SessionController::new(remote.config());
    controller.open(None).await.unwrap();
    remote.recv().await; // setup

    let scan = ScanResult {
        id: uuid::Uuid::new_v4(),
        device_type: "iPhone".to_string(),
        model: "13 Pro".to_string(),
        serial_number: Some("F2LXK".to_string()),
        condition: "cracked screen".to_string(),
        description: "Display shattered in the top corner.".to_string(),
    };

    assert!(controller.inject_scan_result(&scan).unwrap());
    assert!(!controller.inject_scan_result(&scan).unwrap());

    let injected = remote
        .recv_matching(|v| {
            v["clientContent"]["turns"][0]["parts"][0]["text"]
                .as_str()
                .is_some_and(|t| t.contains("Visual scan result"))
        })
        .await;
    let text = injected["clientContent"]["turns"][0]["parts"][0]["text"]
        .as_str()
        .unwrap();
    assert!(text.contains("iPhone 13 Pro"));

    // No second injection for the unchanged record: let any stragglers land,
    // then check nothing else mentions the scan.
    tokio::time::sleep(Duration::from_millis(50)).await;
    while let Ok(value) = remote.from_client.try_recv() {
        let repeated = value["clientContent"]["turns"][0]["parts"][0]["text"]
            .as_str()
            .is_some_and(|t| t.contains("Visual scan result"));
        assert!(!repeated, "scan was injected twice");
    }

    controller.close();
}
