//! Voice catalog sources: the built-in table, a live Edge-style voice list,
//! and OpenAI-style model listings for custom providers.

use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, warn};

use voxrelay_core::types::ApiKey;
use voxrelay_core::voices::{builtin_voices, Voice};

use crate::error::{Error, Result};
use crate::provider::auth_header;

/// Model ids accepted as voices besides the `tts-` prefix.
const OPENAI_VOICE_IDS: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Where `/api/voices` gets its list.
#[derive(Debug, Clone)]
pub enum VoiceCatalog {
    Builtin,
    Remote { client: reqwest::Client, url: String },
}

impl VoiceCatalog {
    /// `None` selects the built-in table.
    pub fn from_url(url: Option<String>) -> Self {
        match url.filter(|u| !u.trim().is_empty()) {
            Some(url) => Self::Remote {
                client: reqwest::Client::new(),
                url,
            },
            None => Self::Builtin,
        }
    }

    pub async fn list(&self) -> Result<Vec<Voice>> {
        match self {
            Self::Builtin => Ok(builtin_voices()),
            Self::Remote { client, url } => {
                debug!("catalog: fetching {url}");
                let resp = client.get(url).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(Error::Upstream {
                        status: status.as_u16(),
                        message: resp.text().await.unwrap_or_default(),
                    });
                }
                Ok(resp.json::<Vec<Voice>>().await?)
            }
        }
    }

    /// Like [`list`](Self::list), but serves the built-in table when the
    /// remote list is unavailable.
    pub async fn list_or_builtin(&self) -> Vec<Voice> {
        match self.list().await {
            Ok(voices) => voices,
            Err(e) => {
                warn!("catalog: remote voice list unavailable, using built-in: {e}");
                builtin_voices()
            }
        }
    }
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<Model>,
}

#[derive(Deserialize)]
struct Model {
    id: String,
}

fn is_openai_voice(id: &str) -> bool {
    id.starts_with("tts-") || OPENAI_VOICE_IDS.contains(&id)
}

/// Fetch an OpenAI-style `/models` listing and keep the TTS voice ids.
pub async fn discover_openai_voices(
    client: &reqwest::Client,
    models_endpoint: &str,
    api_key: Option<&ApiKey>,
) -> Result<Vec<String>> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        auth_header(&mut headers, key)?;
    }

    let resp = client.get(models_endpoint).headers(headers).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Upstream {
            status: status.as_u16(),
            message: resp.text().await.unwrap_or_default(),
        });
    }

    let list: ModelList = resp.json().await?;
    let voices: Vec<String> = list
        .data
        .into_iter()
        .map(|m| m.id)
        .filter(|id| is_openai_voice(id))
        .collect();
    debug!("catalog: discovered {} voices at {models_endpoint}", voices.len());
    Ok(voices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn builtin_catalog_lists_table() {
        let voices = VoiceCatalog::from_url(None).list().await.unwrap();
        assert_eq!(voices.len(), 25);
        assert!(matches!(VoiceCatalog::from_url(Some(" ".into())), VoiceCatalog::Builtin));
    }

    #[tokio::test]
    async fn remote_catalog_parses_edge_list() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/voices")
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"Name":"n","ShortName":"de-DE-KatjaNeural","Gender":"Female","Locale":"de-DE","FriendlyName":"Katja"}]"#,
            )
            .create_async()
            .await;

        let catalog = VoiceCatalog::from_url(Some(format!("{}/voices", server.url())));
        let voices = catalog.list().await.unwrap();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].id(), "de-DE-KatjaNeural");
        assert_eq!(voices[0].local_name, "Katja");
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_builtin() {
        let mut server = Server::new_async().await;
        server.mock("GET", "/voices").with_status(503).create_async().await;

        let catalog = VoiceCatalog::from_url(Some(format!("{}/voices", server.url())));
        assert!(matches!(
            catalog.list().await,
            Err(Error::Upstream { status: 503, .. })
        ));
        assert_eq!(catalog.list_or_builtin().await.len(), 25);
    }

    #[tokio::test]
    async fn discovers_tts_models_only() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/models")
            .match_header("authorization", "Bearer sk-9")
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data":[{"id":"gpt-4o"},{"id":"tts-1"},{"id":"nova"},{"id":"whisper-1"},{"id":"tts-1-hd"}]}"#,
            )
            .create_async()
            .await;

        let voices = discover_openai_voices(
            &reqwest::Client::new(),
            &format!("{}/v1/models", server.url()),
            Some(&ApiKey::parse("sk-9")),
        )
        .await
        .unwrap();

        assert_eq!(voices, vec!["tts-1", "nova", "tts-1-hd"]);
        mock.assert_async().await;
    }
}
