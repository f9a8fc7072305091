use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::VoiceError;

/// Environment variables consulted for the API key, in order.
const API_KEY_ENV_VARS: &[&str] = &["VOICELINK_API_KEY", "GEMINI_API_KEY"];

fn default_endpoint() -> String {
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".to_string()
}

fn default_model() -> String {
    "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string()
}

fn default_voice_name() -> String {
    "Zephyr".to_string()
}

fn default_contact_number() -> String {
    "27817463629".to_string()
}

fn default_store_url() -> String {
    "https://www.yaga.co.za/apple911".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_agent_instruction() -> String {
    concat!(
        "You are \"Tumelo\", a warm and efficient AI support specialist for ",
        "\"Apple911 Solutions\". Keep responses concise and immediate. If the ",
        "user interrupts you, stop talking and address their new input. When a ",
        "repair or service is needed, call open_booking_form immediately and ",
        "keep it updated as details arrive; infer the serviceType from the ",
        "issue. For complex cases, call share_contact_summary and direct the ",
        "user to the human-agent button. Use open_scan_analyzer when seeing the ",
        "device would help, and navigate_to_section to guide the user around ",
        "the site."
    )
    .to_string()
}

/// Configuration for the live voice session.
#[derive(Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// WebSocket endpoint of the conversational AI backend.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model identifier sent in the setup message.
    #[serde(default = "default_model")]
    pub model: String,
    /// Prebuilt voice used for agent speech.
    #[serde(default = "default_voice_name")]
    pub voice_name: String,
    /// API key. Overridden by VOICELINK_API_KEY / GEMINI_API_KEY.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// WhatsApp number the contact-summary tool links to.
    #[serde(default = "default_contact_number")]
    pub contact_number: String,
    /// Store URL the agent may direct users to.
    #[serde(default = "default_store_url")]
    pub store_url: String,
    /// System instruction defining the agent persona and tool protocol.
    #[serde(default = "default_agent_instruction")]
    pub agent_instruction: String,
    /// Seconds to wait for the remote setup acknowledgment.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            voice_name: default_voice_name(),
            api_key: String::new(),
            contact_number: default_contact_number(),
            store_url: default_store_url(),
            agent_instruction: default_agent_instruction(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("voice_name", &self.voice_name)
            .field("api_key", &"[REDACTED]")
            .field("contact_number", &self.contact_number)
            .field("store_url", &self.store_url)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl VoiceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Load from the config file if present, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = load_config().unwrap_or_default();
        for var in API_KEY_ENV_VARS {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    config.api_key = key;
                    break;
                }
            }
        }
        config
    }

    /// Require an API key, erroring out with guidance when missing.
    pub fn require_api_key(&self) -> Result<&str, VoiceError> {
        if self.api_key.is_empty() {
            Err(VoiceError::Config(
                "API key missing (set VOICELINK_API_KEY or GEMINI_API_KEY)".to_string(),
            ))
        } else {
            Ok(&self.api_key)
        }
    }
}

/// Path to the config file.
fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voicelink");
    fs::create_dir_all(&config_dir).ok();
    config_dir.join("voice.json")
}

/// Load the config from disk.
fn load_config() -> Option<VoiceConfig> {
    let path = config_path();
    if path.exists() {
        let content = fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    } else {
        None
    }
}

/// Save the config to disk.
pub fn save_config(config: &VoiceConfig) -> Result<(), VoiceError> {
    let path = config_path();
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| VoiceError::Config(e.to_string()))?;
    fs::write(&path, content).map_err(|e| VoiceError::Config(e.to_string()))?;
    Ok(())
}
