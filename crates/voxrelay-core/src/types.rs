//! Shared types for the voxrelay relay and its clients.
//!
//! Keeping them in voxrelay-core means consumers can depend on types without
//! pulling in tokio, reqwest, or axum.

use serde::{Deserialize, Serialize};

use crate::segment::TextChunk;

// ─── Relay config ──────────────────────────────────────────────────────────

/// Default upstream for `/api/tts`: edge-style query parameters on GET.
pub const DEFAULT_EDGE_URL: &str = "https://api.edge-tts.cn/v1/synthesize";

/// HTTP relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret for the password gate. Empty or `None` disables the gate.
    pub password: Option<String>,
    pub edge_url: String,
    /// Live voice-list endpoint. `None` serves the built-in catalog.
    pub voices_url: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 2003,
            password: None,
            edge_url: DEFAULT_EDGE_URL.into(),
            voices_url: None,
        }
    }
}

// ─── Audio ─────────────────────────────────────────────────────────────────

/// Output container requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    Pcm,
}

impl AudioFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Opus => "audio/opus",
            Self::Aac => "audio/aac",
            Self::Flac => "audio/flac",
            Self::Wav => "audio/wav",
            Self::Pcm => "audio/pcm",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Aac => "aac",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Pcm => "pcm",
        }
    }

    /// Lenient parse of a short name (`wav`) or an edge output-format name
    /// (`riff-24khz-16bit-mono-pcm`). Unknown names fall back to mp3.
    pub fn parse(s: &str) -> Self {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "opus" | "ogg" | "webm" => return Self::Opus,
            "aac" => return Self::Aac,
            "flac" => return Self::Flac,
            "wav" => return Self::Wav,
            "pcm" => return Self::Pcm,
            _ => {}
        }
        if name.starts_with("riff-") {
            Self::Wav
        } else if name.starts_with("raw-") {
            Self::Pcm
        } else if name.ends_with("-opus") {
            Self::Opus
        } else {
            Self::Mp3
        }
    }
}

// ─── Synthesis ─────────────────────────────────────────────────────────────

/// Per-request voice parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub voice: String,
    /// Signed speaking-rate offset, typically -100..=100.
    #[serde(default)]
    pub rate: i32,
    /// Signed pitch offset, typically -100..=100.
    #[serde(default)]
    pub pitch: i32,
    #[serde(default)]
    pub format: AudioFormat,
    /// Provider-specific output format name, sent upstream verbatim in place
    /// of `format` by edge-style providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Free-form style instructions (openai wire format only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl VoiceSettings {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            rate: 0,
            pitch: 0,
            format: AudioFormat::Mp3,
            output_format: None,
            instructions: None,
        }
    }

    /// Format name sent to edge-style providers.
    pub fn upstream_format(&self) -> &str {
        self.output_format
            .as_deref()
            .unwrap_or_else(|| self.format.extension())
    }
}

/// Everything needed to synthesize one segmented text.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub settings: VoiceSettings,
    pub chunks: Vec<TextChunk>,
}

/// Outcome of one chunk after the orchestrator is done with it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunkResult {
    pub index: usize,
    /// `None` when every attempt failed.
    pub audio: Option<Vec<u8>>,
    pub attempts: u32,
}

impl AudioChunkResult {
    pub fn succeeded(&self) -> bool {
        self.audio.is_some()
    }
}

/// Where a chunk stands when a progress update is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum ProgressStage {
    /// A retry is scheduled; `retry` is 1-based.
    Retrying { retry: u32 },
    Succeeded,
    Failed,
}

/// Progress update emitted by the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// 1-based index of the chunk this update is about.
    pub current: usize,
    pub total: usize,
    #[serde(flatten)]
    pub stage: ProgressStage,
    pub status: String,
}

impl Progress {
    /// Completion percentage for display.
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        self.current as f32 / self.total as f32 * 100.0
    }
}

// ─── Providers ─────────────────────────────────────────────────────────────

/// Request shape a provider endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireFormat {
    /// Edge-style parameters as a URL query on GET.
    EdgeQuery,
    /// Edge-style parameters as a JSON body on POST, text XML-escaped.
    EdgeJson,
    /// Chat-completion-style audio endpoint (`/v1/audio/speech`).
    #[serde(rename = "openai")]
    OpenAi,
}

/// Provider credential and the header convention it implies.
///
/// A key written as `x-api-key: <value>` (prefix case-insensitive) is sent in
/// an `x-api-key` header; anything else as a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApiKey {
    Bearer(String),
    Header(String),
}

const API_KEY_HEADER_PREFIX: &str = "x-api-key:";

impl ApiKey {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.get(..API_KEY_HEADER_PREFIX.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(API_KEY_HEADER_PREFIX) => {
                Self::Header(raw[API_KEY_HEADER_PREFIX.len()..].trim().to_string())
            }
            _ => Self::Bearer(raw.to_string()),
        }
    }
}

impl From<String> for ApiKey {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<ApiKey> for String {
    fn from(key: ApiKey) -> Self {
        match key {
            ApiKey::Bearer(k) => k,
            ApiKey::Header(k) => format!("x-api-key: {k}"),
        }
    }
}

/// Per-request and per-input budgets, in units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderLimits {
    pub max_segment: usize,
    pub max_total: usize,
}

impl ProviderLimits {
    pub fn for_format(format: WireFormat) -> Self {
        match format {
            WireFormat::OpenAi => Self {
                max_segment: 400,
                max_total: 2000,
            },
            WireFormat::EdgeQuery | WireFormat::EdgeJson => Self {
                max_segment: 5000,
                max_total: 100_000,
            },
        }
    }
}

/// A TTS endpoint: built-in or user-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,
    pub format: WireFormat,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<ApiKey>,
    /// Model for openai-format endpoints. When unset the voice id doubles as
    /// the model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Manually entered voice ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub voices: Vec<String>,
    /// OpenAI-style model listing used to discover voices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voices_endpoint: Option<String>,
    /// Overrides the format's default segment budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_segment: Option<usize>,
    #[serde(default)]
    pub custom: bool,
}

impl ProviderConfig {
    /// Built-in edge provider: this relay's own `/api/tts`.
    pub fn edge_relay(relay_url: &str) -> Self {
        Self {
            name: "edge-api".into(),
            format: WireFormat::EdgeJson,
            endpoint: format!("{}/api/tts", relay_url.trim_end_matches('/')),
            api_key: None,
            model: None,
            voices: Vec::new(),
            voices_endpoint: None,
            max_segment: None,
            custom: false,
        }
    }

    /// Built-in openai-format provider.
    pub fn oai_tts() -> Self {
        Self {
            name: "oai-tts".into(),
            format: WireFormat::OpenAi,
            endpoint: "https://oai-tts.zwei.de.eu.org/v1/audio/speech".into(),
            api_key: None,
            model: None,
            voices: Vec::new(),
            voices_endpoint: None,
            max_segment: None,
            custom: false,
        }
    }

    pub fn limits(&self) -> ProviderLimits {
        let mut limits = ProviderLimits::for_format(self.format);
        if let Some(max) = self.max_segment {
            limits.max_segment = max;
        }
        limits
    }
}

// ─── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, witty voice assistant. \
Reply in short, natural spoken language and keep answers under 100 words unless \
the user asks for detail.";

/// Chat-completion endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            api_key: None,
            model: "gpt-3.5-turbo".into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            temperature: 0.7,
            max_tokens: 150,
        }
    }
}

// ─── Client mode ───────────────────────────────────────────────────────────

/// Last-used client mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Chat,
    Tts,
}
