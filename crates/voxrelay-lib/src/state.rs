//! Client application state: chat settings, saved providers, chat
//! transcript, generation history, last mode, and the request counter.
//!
//! All mutation goes through [`AppState::apply`]. [`StateStore`] persists the
//! whole value as pretty JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use voxrelay_core::history::BoundedHistory;
use voxrelay_core::segment::TextChunk;
use voxrelay_core::text_prep::preview_text;
use voxrelay_core::types::{ChatMessage, ChatSettings, Mode, ProviderConfig};

use crate::error::{Error, Result};
use crate::orchestrator::Assembled;

/// Names reserved for the built-in providers.
pub const BUILTIN_PROVIDERS: &[&str] = &["edge-api", "oai-tts"];

/// One entry in the generation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// `#<id>(<i>/<n>)` for a chunk, `#<id>(merged)` for the concatenation.
    pub label: String,
    pub preview: String,
    pub voice: String,
    pub provider: String,
    pub bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

pub fn chunk_label(request_id: u64, position: usize, total: usize) -> String {
    format!("#{request_id}({position}/{total})")
}

pub fn merged_label(request_id: u64) -> String {
    format!("#{request_id}(merged)")
}

/// Describes one finished synthesis for [`Action::RecordGeneration`].
#[derive(Debug, Clone)]
pub struct Generation<'a> {
    pub request_id: u64,
    pub voice: &'a str,
    pub provider: &'a str,
    pub text: &'a str,
    pub chunks: &'a [TextChunk],
    pub assembled: &'a Assembled,
    pub file: Option<PathBuf>,
}

impl Generation<'_> {
    /// History entries oldest first: each successful chunk, then the merged
    /// result when there was more than one chunk.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        let now = Utc::now();
        let total = self.chunks.len();
        let entry = |label: String, text: &str, bytes: usize, file: Option<PathBuf>| HistoryEntry {
            label,
            preview: preview_text(text),
            voice: self.voice.to_string(),
            provider: self.provider.to_string(),
            bytes,
            file,
            created_at: now,
        };

        if total <= 1 {
            return vec![entry(
                chunk_label(self.request_id, 1, 1),
                self.text,
                self.assembled.audio.len(),
                self.file.clone(),
            )];
        }

        let mut entries: Vec<HistoryEntry> = self
            .assembled
            .results
            .iter()
            .filter_map(|r| {
                let audio = r.audio.as_ref()?;
                let chunk = self.chunks.iter().find(|c| c.index == r.index)?;
                Some(entry(
                    chunk_label(self.request_id, r.index + 1, total),
                    &chunk.text,
                    audio.len(),
                    None,
                ))
            })
            .collect();
        entries.push(entry(
            merged_label(self.request_id),
            self.text,
            self.assembled.audio.len(),
            self.file.clone(),
        ));
        entries
    }
}

/// Every state mutation.
#[derive(Debug, Clone)]
pub enum Action {
    RecordChat(ChatMessage),
    ClearChat,
    SaveProvider(ProviderConfig),
    RemoveProvider(String),
    /// Entries oldest first.
    RecordGeneration(Vec<HistoryEntry>),
    ClearHistory,
    SetMode(Mode),
    UpdateChatSettings(ChatSettings),
    NextRequestId,
}

/// What an [`Action`] produced, beyond the state change itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Done,
    RequestId(u64),
    /// A removal found nothing to remove.
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppState {
    chat_settings: ChatSettings,
    providers: BTreeMap<String, ProviderConfig>,
    chat: Vec<ChatMessage>,
    history: BoundedHistory<HistoryEntry>,
    mode: Mode,
    request_counter: u64,
}

impl AppState {
    pub fn apply(&mut self, action: Action) -> Result<Applied> {
        match action {
            Action::RecordChat(message) => self.chat.push(message),
            Action::ClearChat => self.chat.clear(),
            Action::SaveProvider(mut provider) => {
                let name = provider.name.trim().to_string();
                if name.is_empty() {
                    return Err(Error::InvalidRequest("provider name is empty".into()));
                }
                if BUILTIN_PROVIDERS.contains(&name.as_str()) {
                    return Err(Error::InvalidRequest(format!(
                        "provider name {name:?} is reserved"
                    )));
                }
                if provider.endpoint.trim().is_empty() {
                    return Err(Error::InvalidRequest("provider endpoint is empty".into()));
                }
                provider.name = name.clone();
                provider.custom = true;
                self.providers.insert(name, provider);
            }
            Action::RemoveProvider(name) => {
                if self.providers.remove(name.trim()).is_none() {
                    return Ok(Applied::NotFound);
                }
            }
            Action::RecordGeneration(entries) => {
                for entry in entries {
                    self.history.push(entry);
                }
            }
            Action::ClearHistory => self.history.clear(),
            Action::SetMode(mode) => self.mode = mode,
            Action::UpdateChatSettings(settings) => self.chat_settings = settings,
            Action::NextRequestId => {
                self.request_counter += 1;
                return Ok(Applied::RequestId(self.request_counter));
            }
        }
        Ok(Applied::Done)
    }

    pub fn chat_settings(&self) -> &ChatSettings {
        &self.chat_settings
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.values()
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn history(&self) -> &BoundedHistory<HistoryEntry> {
        &self.history
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

/// JSON file holding one [`AppState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/voxrelay/state.json`.
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("voxrelay").join("state.json"))
            .ok_or_else(|| Error::Configuration("failed to locate data directory".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file yields default state; a corrupt one is an error.
    pub async fn load(&self) -> Result<AppState> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("state: {} not found, using defaults", self.path.display());
                Ok(AppState::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, state: &AppState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, json).await?;
        debug!("state: saved to {}", self.path.display());
        Ok(())
    }
}
