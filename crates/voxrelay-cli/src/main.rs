//! voxrelay CLI: TTS relay server and long-text synthesis client.
//!
//! ```text
//! voxrelay serve [--port 2003] [--host 127.0.0.1] [--password ..] [--edge-url ..]
//! voxrelay speak "long text" --voice zh-CN-XiaoxiaoNeural [--provider edge-api] [-o out.mp3]
//! voxrelay voices [--locale en] [--format 0|1]
//! voxrelay chat "hello" [--api-key ..] [--speak --voice en-US-AriaNeural]
//! voxrelay provider add|list|remove|discover
//! voxrelay history [--clear]
//! voxrelay pause 1.5
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxrelay_lib::catalog::{discover_openai_voices, VoiceCatalog};
use voxrelay_lib::chat::ChatClient;
use voxrelay_lib::orchestrator::Orchestrator;
use voxrelay_lib::provider::HttpProvider;
use voxrelay_lib::server;
use voxrelay_lib::speech::{speak_to_file, SpeechJob, Spoken};
use voxrelay_lib::state::{Action, AppState, Applied, StateStore};
use voxrelay_lib::voxrelay_core::text_prep::{clean_text, pause_marker, CleaningOptions};
use voxrelay_lib::voxrelay_core::types::{
    ApiKey, AudioFormat, ChatMessage, Mode, Progress, ProviderConfig, RelayConfig, VoiceSettings,
    WireFormat, DEFAULT_EDGE_URL,
};
use voxrelay_lib::voxrelay_core::voices::{filter_by_locale, render, CatalogBody, CatalogFormat};

const DEFAULT_LOG_FILTER: &str = "voxrelay=info,voxrelay_lib=info";

/// voxrelay: text-to-speech relay and long-text synthesis client
#[derive(Parser)]
#[command(name = "voxrelay", version, about)]
struct Cli {
    /// Client state file
    #[arg(long, global = true, env = "VOXRELAY_STATE")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP relay
    Serve {
        /// Listen port
        #[arg(long, default_value = "2003")]
        port: u16,
        /// Listen host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Shared secret for the password gate
        #[arg(long, env = "VOXRELAY_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Upstream edge-style synthesis endpoint
        #[arg(long, env = "VOXRELAY_EDGE_URL", default_value = DEFAULT_EDGE_URL)]
        edge_url: String,
        /// Live voice-list endpoint (built-in table when unset)
        #[arg(long, env = "VOXRELAY_VOICES_URL")]
        voices_url: Option<String>,
    },
    /// Synthesize text of any length into one audio file
    Speak(SpeakArgs),
    /// List available voices
    Voices {
        /// Locale substring filter, e.g. "en" or "zh-CN"
        #[arg(long, short)]
        locale: Option<String>,
        /// 0 = plugin text, 1 = id→label map, anything else = full list
        #[arg(long, short)]
        format: Option<String>,
        /// Live voice-list endpoint (built-in table when unset)
        #[arg(long, env = "VOXRELAY_VOICES_URL")]
        voices_url: Option<String>,
    },
    /// Talk to the chat assistant
    Chat(ChatArgs),
    /// Manage custom TTS providers
    #[command(subcommand)]
    Provider(ProviderCommand),
    /// Show or clear generation history
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Print a pause marker for embedding in text
    Pause {
        /// Pause length in seconds (0.01–100)
        seconds: f64,
    },
}

#[derive(Args)]
struct SpeakArgs {
    /// Text to speak; read from --file or stdin when omitted
    text: Option<String>,
    /// Read text from a file
    #[arg(long, conflicts_with = "text")]
    file: Option<PathBuf>,
    /// Provider: edge-api, oai-tts, or a saved custom provider
    #[arg(long, default_value = "edge-api")]
    provider: String,
    /// Relay URL backing the edge-api provider
    #[arg(long, default_value = "http://127.0.0.1:2003")]
    relay: String,
    #[arg(long)]
    voice: String,
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    rate: i32,
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pitch: i32,
    /// Output container: mp3, opus, aac, flac, wav, pcm
    #[arg(long, default_value = "mp3")]
    format: String,
    /// Style instructions (openai providers only)
    #[arg(long)]
    instructions: Option<String>,
    /// Output file (defaults to voxrelay-<id>.<ext>)
    #[arg(long, short)]
    out: Option<PathBuf>,
    /// Synthesize only the first few characters
    #[arg(long)]
    preview: bool,
    #[command(flatten)]
    cleaning: CleaningArgs,
}

#[derive(Args)]
struct ChatArgs {
    /// Message to send
    message: Option<String>,
    /// Chat-completion API key, saved for later use
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Override the chat model, saved for later use
    #[arg(long)]
    model: Option<String>,
    /// Clear the transcript instead of sending
    #[arg(long)]
    clear: bool,
    #[command(flatten)]
    read_aloud: ChatVoiceArgs,
}

/// Reading assistant replies aloud through the relay.
#[derive(Args)]
struct ChatVoiceArgs {
    /// Synthesize the reply to an audio file
    #[arg(long, requires = "voice")]
    speak: bool,
    #[arg(long)]
    voice: Option<String>,
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    rate: i32,
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pitch: i32,
    /// Relay URL used for synthesis
    #[arg(long, default_value = "http://127.0.0.1:2003")]
    relay: String,
    /// Output file (defaults to voxrelay-<id>.mp3)
    #[arg(long, short)]
    out: Option<PathBuf>,
}

/// Every cleanup pass runs unless switched off.
#[derive(Args)]
struct CleaningArgs {
    /// Keep markdown syntax
    #[arg(long)]
    keep_markdown: bool,
    #[arg(long)]
    keep_emoji: bool,
    #[arg(long)]
    keep_urls: bool,
    #[arg(long)]
    keep_line_breaks: bool,
    /// Keep bracketed citation numbers like [1]
    #[arg(long)]
    keep_citations: bool,
    /// Comma-separated words to remove
    #[arg(long)]
    remove_keywords: Option<String>,
}

impl CleaningArgs {
    fn options(&self) -> CleaningOptions {
        CleaningOptions {
            remove_markdown: !self.keep_markdown,
            remove_emoji: !self.keep_emoji,
            remove_urls: !self.keep_urls,
            remove_line_breaks: !self.keep_line_breaks,
            remove_citations: !self.keep_citations,
            custom_keywords: self.remove_keywords.clone().unwrap_or_default(),
        }
    }
}

#[derive(Subcommand)]
enum ProviderCommand {
    /// Save a custom provider
    Add {
        #[arg(long)]
        name: String,
        /// edge-query, edge-json, or openai
        #[arg(long, default_value = "openai")]
        format: String,
        #[arg(long)]
        endpoint: String,
        /// Key; write "x-api-key: <key>" to send it as an x-api-key header
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Voice id (repeatable)
        #[arg(long = "voice")]
        voices: Vec<String>,
        /// OpenAI-style model listing used by `provider discover`
        #[arg(long)]
        voices_endpoint: Option<String>,
        /// Per-request unit budget override
        #[arg(long)]
        max_segment: Option<usize>,
    },
    /// List saved providers
    List,
    /// Remove a saved provider
    Remove { name: String },
    /// Fetch a provider's voice list from its voices endpoint
    Discover { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = StateStore::new(match cli.state {
        Some(path) => path,
        None => StateStore::default_path()?,
    });

    match cli.command {
        Command::Serve {
            port,
            host,
            password,
            edge_url,
            voices_url,
        } => {
            let config = RelayConfig {
                host,
                port,
                password,
                edge_url,
                voices_url,
            };
            let app = server::router(&config);

            let addr = format!("{}:{}", config.host, config.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!("voxrelay listening on {addr}");

            axum::serve(listener, app).await.context("server error")?;
        }

        Command::Speak(args) => speak(&store, args).await?,

        Command::Voices {
            locale,
            format,
            voices_url,
        } => {
            let voices = VoiceCatalog::from_url(voices_url).list().await?;
            let voices = filter_by_locale(voices, locale.as_deref().unwrap_or_default());
            match render(&voices, CatalogFormat::parse(format.as_deref())) {
                CatalogBody::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                CatalogBody::Text(text) => println!("{text}"),
            }
        }

        Command::Chat(args) => chat(&store, args).await?,

        Command::Provider(cmd) => provider(&store, cmd).await?,

        Command::History { clear } => {
            let mut state = store.load().await?;
            if clear {
                state.apply(Action::ClearHistory)?;
                store.save(&state).await?;
                println!("history cleared");
                return Ok(());
            }
            for entry in state.history().iter() {
                println!(
                    "{}  {:<14} {:<24} {:>9} B  {}{}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.label,
                    entry.voice,
                    entry.bytes,
                    entry.preview,
                    entry
                        .file
                        .as_ref()
                        .map(|f| format!("  → {}", f.display()))
                        .unwrap_or_default(),
                );
            }
        }

        Command::Pause { seconds } => println!("{}", pause_marker(seconds)?),
    }

    Ok(())
}

fn resolve_provider(state: &AppState, name: &str, relay: &str) -> anyhow::Result<ProviderConfig> {
    match name {
        "edge-api" => Ok(ProviderConfig::edge_relay(relay)),
        "oai-tts" => Ok(ProviderConfig::oai_tts()),
        other => state
            .provider(other)
            .cloned()
            .with_context(|| format!("unknown provider {other:?}")),
    }
}

async fn read_input(args: &SpeakArgs) -> anyhow::Result<String> {
    if let Some(text) = &args.text {
        return Ok(text.clone());
    }
    if let Some(path) = &args.file {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()));
    }
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;
    Ok(text)
}

async fn speak(store: &StateStore, args: SpeakArgs) -> anyhow::Result<()> {
    let mut state = store.load().await?;
    let config = resolve_provider(&state, &args.provider, &args.relay)?;
    let text = clean_text(&read_input(&args).await?, &args.cleaning.options());

    let settings = VoiceSettings {
        voice: args.voice.clone(),
        rate: args.rate,
        pitch: args.pitch,
        format: AudioFormat::parse(&args.format),
        output_format: None,
        instructions: args.instructions.clone(),
    };
    let limits = config.limits();
    let provider_name = config.name.clone();
    let http = HttpProvider::new(config);

    if args.preview {
        let audio = http.preview(&text, &settings).await?;
        let out = args
            .out
            .unwrap_or_else(|| PathBuf::from(format!("voxrelay-preview.{}", settings.format.extension())));
        tokio::fs::write(&out, &audio).await?;
        println!("preview written to {}", out.display());
        return Ok(());
    }

    state.apply(Action::SetMode(Mode::Tts))?;
    let job = SpeechJob {
        provider_name: &provider_name,
        text: &text,
        settings,
        limits,
        out: args.out,
    };
    let spoken = speak_to_file(&mut state, &Orchestrator::new(http), job, print_progress).await;
    store.save(&state).await?;
    report(&spoken?);
    Ok(())
}

fn print_progress(p: Progress) {
    eprintln!("[{:>3.0}%] {}", p.percent(), p.status);
}

fn report(spoken: &Spoken) {
    let failed = spoken.assembled.failed_chunks();
    if failed.is_empty() {
        println!(
            "wrote {} ({} bytes)",
            spoken.path.display(),
            spoken.assembled.audio.len()
        );
    } else {
        let numbers: Vec<String> = failed.iter().map(|i| (i + 1).to_string()).collect();
        println!(
            "wrote {} ({} bytes); chunk(s) {} failed and were skipped",
            spoken.path.display(),
            spoken.assembled.audio.len(),
            numbers.join(", ")
        );
    }
}

async fn chat(store: &StateStore, args: ChatArgs) -> anyhow::Result<()> {
    let ChatArgs {
        message,
        api_key,
        model,
        clear,
        read_aloud,
    } = args;
    let mut state = store.load().await?;

    if clear {
        state.apply(Action::ClearChat)?;
        store.save(&state).await?;
        println!("chat cleared");
        return Ok(());
    }

    let mut settings = state.chat_settings().clone();
    if api_key.is_some() || model.is_some() {
        if let Some(key) = api_key {
            settings.api_key = Some(key);
        }
        if let Some(model) = model {
            settings.model = model;
        }
        state.apply(Action::UpdateChatSettings(settings.clone()))?;
    }
    state.apply(Action::SetMode(Mode::Chat))?;

    let Some(message) = message.filter(|m| !m.trim().is_empty()) else {
        for m in state.chat() {
            println!("{:?}: {}", m.role, m.content);
        }
        store.save(&state).await?;
        return Ok(());
    };

    let client = ChatClient::new(settings);
    let reply = client.reply(state.chat(), &message).await;
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            store.save(&state).await?;
            return Err(e.into());
        }
    };

    state.apply(Action::RecordChat(ChatMessage::user(message)))?;
    state.apply(Action::RecordChat(ChatMessage::assistant(reply.clone())))?;
    store.save(&state).await?;
    println!("{reply}");

    if read_aloud.speak {
        // A failed read-aloud never fails the conversation
        match speak_reply(&mut state, &read_aloud, &reply).await {
            Ok(spoken) => report(&spoken),
            Err(e) => warn!("chat: reading the reply aloud failed: {e}"),
        }
        store.save(&state).await?;
    }
    Ok(())
}

async fn speak_reply(
    state: &mut AppState,
    voice: &ChatVoiceArgs,
    reply: &str,
) -> voxrelay_lib::Result<Spoken> {
    let config = ProviderConfig::edge_relay(&voice.relay);
    let provider_name = config.name.clone();
    let limits = config.limits();
    let mut settings = VoiceSettings::new(voice.voice.clone().unwrap_or_default());
    settings.rate = voice.rate;
    settings.pitch = voice.pitch;

    let job = SpeechJob {
        provider_name: &provider_name,
        text: reply,
        settings,
        limits,
        out: voice.out.clone(),
    };
    speak_to_file(state, &Orchestrator::new(HttpProvider::new(config)), job, print_progress).await
}

async fn provider(store: &StateStore, cmd: ProviderCommand) -> anyhow::Result<()> {
    let mut state = store.load().await?;

    match cmd {
        ProviderCommand::Add {
            name,
            format,
            endpoint,
            api_key,
            model,
            voices,
            voices_endpoint,
            max_segment,
        } => {
            let format: WireFormat = serde_json::from_value(serde_json::Value::String(format.clone()))
                .with_context(|| format!("unknown wire format {format:?}"))?;
            state.apply(Action::SaveProvider(ProviderConfig {
                name: name.clone(),
                format,
                endpoint,
                api_key: api_key.as_deref().map(ApiKey::parse),
                model,
                voices,
                voices_endpoint,
                max_segment,
                custom: true,
            }))?;
            store.save(&state).await?;
            println!("saved provider {name}");
        }

        ProviderCommand::List => {
            for p in state.providers() {
                let limits = p.limits();
                println!(
                    "{:<16} {:<10} {}  (segment {} / total {} units, {} voices)",
                    p.name,
                    serde_json::to_value(p.format)?.as_str().unwrap_or_default(),
                    p.endpoint,
                    limits.max_segment,
                    limits.max_total,
                    p.voices.len()
                );
            }
        }

        ProviderCommand::Remove { name } => match state.apply(Action::RemoveProvider(name.clone()))? {
            Applied::NotFound => bail!("no provider named {name:?}"),
            _ => {
                store.save(&state).await?;
                println!("removed provider {name}");
            }
        },

        ProviderCommand::Discover { name } => {
            let mut config = state
                .provider(&name)
                .cloned()
                .with_context(|| format!("no provider named {name:?}"))?;
            let endpoint = config
                .voices_endpoint
                .clone()
                .with_context(|| format!("provider {name:?} has no voices endpoint"))?;
            let voices =
                discover_openai_voices(&reqwest::Client::new(), &endpoint, config.api_key.as_ref())
                    .await?;
            if voices.is_empty() {
                bail!("no tts voices found at {endpoint}");
            }
            println!("{}", voices.join("\n"));
            config.voices = voices;
            state.apply(Action::SaveProvider(config))?;
            store.save(&state).await?;
        }
    }

    Ok(())
}
