//! Wire messages for the bidirectional streaming endpoint.
//!
//! Outbound messages are externally tagged by their single top-level key
//! (`setup`, `realtimeInput`, `clientContent`, `toolResponse`); inbound
//! messages carry optional sections the server may combine, so they decode
//! into one struct with optional fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audio::EncodedFrame;

// ── Outbound ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
    ToolResponse(ToolResponse),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub tools: Vec<ToolDecl>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceSelection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceSelection {
    pub prebuilt_voice_config: PrebuiltVoice,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoice {
    pub voice_name: String,
}

/// Declaration of one callable tool group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDecl {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<EncodedFrame>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<ToolResult>,
}

// ── Inbound ──────────────────────────────────────────────────────

/// One inbound message. The server may combine sections (e.g. content plus
/// usage metadata), so each known section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCallBatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<InboundContent>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

impl ServerContent {
    /// Audio payloads of this turn, in order.
    pub fn audio_chunks(&self) -> Vec<&InlineBlob> {
        self.model_turn
            .as_ref()
            .map(|turn| {
                turn.parts
                    .iter()
                    .filter_map(|p| p.inline_data.as_ref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundContent {
    #[serde(default)]
    pub parts: Vec<InboundPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundPart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<InlineBlob>,
}

/// Base64 media payload with a format tag, e.g. `audio/pcm;rate=24000`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineBlob {
    pub mime_type: String,
    pub data: String,
}

impl InlineBlob {
    /// Sample rate declared by the mime tag, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .filter_map(|part| part.trim().strip_prefix("rate="))
            .find_map(|rate| rate.parse().ok())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallBatch {
    #[serde(default)]
    pub function_calls: Vec<ToolCall>,
}

/// A structured call request from the remote agent.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    /// Opaque correlation token; results must echo it
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// The correlated answer to one [`ToolCall`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub response: Value,
}

// ── Shared content shape ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<TextPart>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![TextPart { text: text.into() }],
        }
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![TextPart { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_are_externally_tagged() {
        let message = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![EncodedFrame {
                data: "AAAA".to_string(),
                mime_type: "audio/pcm;rate=16000".to_string(),
            }],
        });
        let json = serde_json::to_value(&message).unwrap();
        assert!(json.get("realtimeInput").is_some());
        assert_eq!(
            json["realtimeInput"]["mediaChunks"][0]["mimeType"],
            "audio/pcm;rate=16000"
        );
    }

    #[test]
    fn test_server_message_sections_decode() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAECAw=="}}]
                },
                "interrupted": false
            }
        }"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        let content = message.server_content.unwrap();
        let chunks = content.audio_chunks();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sample_rate(), Some(24_000));
        assert!(!content.interrupted);
    }

    #[test]
    fn test_interruption_notice_decodes() {
        let raw = r#"{"serverContent": {"interrupted": true}}"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(message.server_content.unwrap().interrupted);
    }

    #[test]
    fn test_tool_call_batch_decodes() {
        let raw = r#"{
            "toolCall": {"functionCalls": [
                {"id": "c-1", "name": "open_booking_form", "args": {"name": "Thabo"}},
                {"id": "c-2", "name": "mystery_tool"}
            ]}
        }"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        let calls = message.tool_call.unwrap().function_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "c-1");
        assert!(calls[1].args.is_null());
    }

    #[test]
    fn test_unknown_sections_are_ignored() {
        let raw = r#"{"usageMetadata": {"totalTokens": 5}, "setupComplete": {}}"#;
        let message: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(message.setup_complete.is_some());
        assert!(message.server_content.is_none());
    }
}
