//! External TTS provider client: one HTTP request per text chunk.
//!
//! Three wire formats are supported:
//!
//! ```text
//! edge-query  GET  <endpoint>?text=..&voice=..&rate=..&pitch=..&format=..
//! edge-json   POST <endpoint> {text (xml-escaped), voice, rate, pitch, preview}
//! openai      POST <endpoint> {model, input (markers stripped), voice, response_format, instructions?}
//! ```

use std::future::Future;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use tracing::debug;

use voxrelay_core::text_prep::{escape_xml, strip_pause_markers};
use voxrelay_core::types::{ApiKey, ProviderConfig, VoiceSettings, WireFormat};

use crate::error::{Error, Result};

/// Characters sent for a preview request.
pub const PREVIEW_CHARS: usize = 20;

/// Voice used for custom openai endpoints when the voice id doubles as model.
const FALLBACK_OPENAI_VOICE: &str = "alloy";

/// Anything that turns one text chunk into audio bytes.
pub trait SpeechProvider {
    fn synthesize(
        &self,
        text: &str,
        settings: &VoiceSettings,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// [`SpeechProvider`] backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Synthesize the first [`PREVIEW_CHARS`] characters of `text`.
    pub async fn preview(&self, text: &str, settings: &VoiceSettings) -> Result<Vec<u8>> {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        self.request(&head, settings, true).await
    }

    async fn request(&self, text: &str, settings: &VoiceSettings, preview: bool) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidRequest("text is empty".into()));
        }
        if settings.voice.trim().is_empty() {
            return Err(Error::InvalidRequest("voice is empty".into()));
        }

        let headers = self.headers()?;
        let endpoint = &self.config.endpoint;

        debug!(
            "provider[{}]: {:?} request, {} chars",
            self.config.name,
            self.config.format,
            text.chars().count()
        );

        let builder = match self.config.format {
            WireFormat::EdgeQuery => self.client.get(endpoint).query(&[
                ("text", text.to_string()),
                ("voice", settings.voice.clone()),
                ("rate", settings.rate.to_string()),
                ("pitch", settings.pitch.to_string()),
                ("format", settings.upstream_format().to_string()),
            ]),
            WireFormat::EdgeJson => self.client.post(endpoint).json(&json!({
                "text": escape_xml(text),
                "voice": settings.voice,
                "rate": settings.rate,
                "pitch": settings.pitch,
                "preview": preview,
            })),
            WireFormat::OpenAi => {
                let (model, voice) = match &self.config.model {
                    Some(model) => (model.as_str(), settings.voice.as_str()),
                    None if self.config.custom => (settings.voice.as_str(), FALLBACK_OPENAI_VOICE),
                    None => (settings.voice.as_str(), settings.voice.as_str()),
                };
                let mut body = json!({
                    "model": model,
                    "input": strip_pause_markers(text),
                    "voice": voice,
                    "response_format": settings.format.extension(),
                });
                let instructions = settings
                    .instructions
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty());
                if let Some(instructions) = instructions {
                    body["instructions"] = json!(instructions);
                }
                self.client.post(endpoint).json(&body)
            }
        };

        let resp = builder.headers(headers).send().await?;
        read_audio(resp).await
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("audio/mpeg"));
        if let Some(key) = &self.config.api_key {
            auth_header(&mut headers, key)?;
        }
        Ok(headers)
    }
}

impl SpeechProvider for HttpProvider {
    fn synthesize(
        &self,
        text: &str,
        settings: &VoiceSettings,
    ) -> impl Future<Output = Result<Vec<u8>>> + Send {
        self.request(text, settings, false)
    }
}

/// Apply the key's header convention.
pub fn auth_header(headers: &mut HeaderMap, key: &ApiKey) -> Result<()> {
    let invalid = |_| Error::Configuration("api key contains invalid header characters".into());
    match key {
        ApiKey::Header(value) => {
            headers.insert("x-api-key", HeaderValue::from_str(value).map_err(invalid)?);
        }
        ApiKey::Bearer(value) => {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {value}")).map_err(invalid)?,
            );
        }
    }
    Ok(())
}

/// Map a provider response to audio bytes, rejecting errors and non-audio payloads.
pub(crate) async fn read_audio(resp: reqwest::Response) -> Result<Vec<u8>> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = if text.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            text
        };
        return Err(Error::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !is_audio_type(&content_type) {
        return Err(Error::UpstreamFormat(format!(
            "expected audio, got content type {content_type:?}"
        )));
    }

    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Err(Error::UpstreamFormat("empty audio payload".into()));
    }
    Ok(bytes.to_vec())
}

fn is_audio_type(content_type: &str) -> bool {
    content_type.contains("audio/") || content_type.starts_with("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use voxrelay_core::types::AudioFormat;

    const MP3: &[u8] = b"ID3\x03\x00fake-mp3";

    fn provider(format: WireFormat, endpoint: String) -> HttpProvider {
        HttpProvider::new(ProviderConfig {
            name: "test".into(),
            format,
            endpoint,
            api_key: None,
            model: None,
            voices: Vec::new(),
            voices_endpoint: None,
            max_segment: None,
            custom: false,
        })
    }

    #[tokio::test]
    async fn edge_query_sends_parameters() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/synthesize")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("text".into(), "Hello there".into()),
                Matcher::UrlEncoded("voice".into(), "en-US-GuyNeural".into()),
                Matcher::UrlEncoded("rate".into(), "-10".into()),
                Matcher::UrlEncoded("pitch".into(), "5".into()),
                Matcher::UrlEncoded("format".into(), "mp3".into()),
            ]))
            .with_header("content-type", "audio/mpeg")
            .with_body(MP3)
            .create_async()
            .await;

        let p = provider(WireFormat::EdgeQuery, format!("{}/v1/synthesize", server.url()));
        let mut settings = VoiceSettings::new("en-US-GuyNeural");
        settings.rate = -10;
        settings.pitch = 5;
        let audio = p.synthesize("Hello there", &settings).await.unwrap();

        assert_eq!(audio, MP3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn edge_json_escapes_text_and_uses_header_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/tts")
            .match_header("x-api-key", "k1")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::Json(json!({
                "text": "a &amp; b<break time=\"1s\"/>",
                "voice": "zh-CN-XiaoxiaoNeural",
                "rate": 0,
                "pitch": 0,
                "preview": false,
            })))
            .with_header("content-type", "audio/mpeg")
            .with_body(MP3)
            .create_async()
            .await;

        let mut p = provider(WireFormat::EdgeJson, format!("{}/api/tts", server.url()));
        p.config.api_key = Some(ApiKey::parse("x-api-key: k1"));
        let settings = VoiceSettings::new("zh-CN-XiaoxiaoNeural");
        p.synthesize("a & b<break time=\"1s\"/>", &settings).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn openai_strips_markers_and_sends_bearer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/audio/speech")
            .match_header("authorization", "Bearer sk-1")
            .match_body(Matcher::Json(json!({
                "model": "tts-1",
                "input": "Hi there",
                "voice": "nova",
                "response_format": "opus",
                "instructions": "calm",
            })))
            .with_header("content-type", "audio/ogg")
            .with_body(b"OggS")
            .create_async()
            .await;

        let mut p = provider(WireFormat::OpenAi, format!("{}/v1/audio/speech", server.url()));
        p.config.api_key = Some(ApiKey::parse("sk-1"));
        p.config.model = Some("tts-1".into());
        let mut settings = VoiceSettings::new("nova");
        settings.format = AudioFormat::Opus;
        settings.instructions = Some(" calm ".into());
        let audio = p.synthesize("Hi <break time='500ms'/>there", &settings).await.unwrap();
        assert_eq!(audio, b"OggS");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn custom_openai_without_model_uses_voice_as_model() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/speech")
            .match_body(Matcher::PartialJson(json!({
                "model": "tts-1-hd",
                "voice": "alloy",
            })))
            .with_header("content-type", "audio/mpeg")
            .with_body(MP3)
            .create_async()
            .await;

        let mut p = provider(WireFormat::OpenAi, format!("{}/speech", server.url()));
        p.config.custom = true;
        p.synthesize("hello", &VoiceSettings::new("tts-1-hd")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn edge_json_preview_truncates() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/tts")
            .match_body(Matcher::PartialJson(json!({
                "text": "abcdefghijklmnopqrst",
                "preview": true,
            })))
            .with_header("content-type", "audio/mpeg")
            .with_body(MP3)
            .create_async()
            .await;

        let p = provider(WireFormat::EdgeJson, format!("{}/api/tts", server.url()));
        p.preview("abcdefghijklmnopqrstuvwxyz", &VoiceSettings::new("v"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upstream_error_carries_status_and_body() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/tts")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let p = provider(WireFormat::EdgeJson, format!("{}/api/tts", server.url()));
        let err = p.synthesize("hi", &VoiceSettings::new("v")).await.unwrap_err();
        match err {
            Error::Upstream { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejects_non_audio_and_empty_payloads() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/html")
            .with_header("content-type", "text/html")
            .with_body("<html></html>")
            .create_async()
            .await;
        server
            .mock("POST", "/empty")
            .with_header("content-type", "audio/mpeg")
            .create_async()
            .await;

        let settings = VoiceSettings::new("v");
        let html = provider(WireFormat::EdgeJson, format!("{}/html", server.url()));
        let err = html.synthesize("hi", &settings).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFormat(_)));
        assert!(err.is_retryable());

        let empty = provider(WireFormat::EdgeJson, format!("{}/empty", server.url()));
        let err = empty.synthesize("hi", &settings).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFormat(_)));
    }

    #[tokio::test]
    async fn blank_text_is_invalid() {
        let p = provider(WireFormat::EdgeJson, "http://127.0.0.1:9/api/tts".into());
        let err = p.synthesize("  ", &VoiceSettings::new("v")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
