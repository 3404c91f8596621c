//! Text of any length to an audio file, recorded in the generation history.
//!
//! Shared by the `speak` command and spoken chat replies.

use std::path::PathBuf;

use tracing::info;

use voxrelay_core::types::{Progress, ProviderLimits, VoiceSettings};

use crate::error::{Error, Result};
use crate::orchestrator::{plan_request, Assembled, Clock, Orchestrator};
use crate::provider::SpeechProvider;
use crate::state::{Action, AppState, Applied, Generation};

/// One synthesis to run.
#[derive(Debug, Clone)]
pub struct SpeechJob<'a> {
    pub provider_name: &'a str,
    pub text: &'a str,
    pub settings: VoiceSettings,
    pub limits: ProviderLimits,
    /// Defaults to `voxrelay-<id>.<ext>` in the working directory.
    pub out: Option<PathBuf>,
}

/// A finished, written synthesis.
#[derive(Debug)]
pub struct Spoken {
    pub request_id: u64,
    pub path: PathBuf,
    pub assembled: Assembled,
}

/// Segment, synthesize and write `job`, then record it in `state`'s history.
///
/// A request id is allocated even when synthesis fails, so the caller should
/// persist `state` either way.
pub async fn speak_to_file<P: SpeechProvider, C: Clock>(
    state: &mut AppState,
    orchestrator: &Orchestrator<P, C>,
    job: SpeechJob<'_>,
    on_progress: impl Fn(Progress),
) -> Result<Spoken> {
    let request = plan_request(job.text, job.settings, job.limits)?;
    let Applied::RequestId(request_id) = state.apply(Action::NextRequestId)? else {
        return Err(Error::Configuration("state did not allocate a request id".into()));
    };
    info!(
        "request #{request_id}: {} chunk(s) via {}",
        request.chunks.len(),
        job.provider_name
    );

    let assembled = orchestrator.run(&request, on_progress).await?;

    let path = job.out.unwrap_or_else(|| {
        PathBuf::from(format!("voxrelay-{request_id}.{}", assembled.format.extension()))
    });
    tokio::fs::write(&path, &assembled.audio).await?;

    let entries = Generation {
        request_id,
        voice: &request.settings.voice,
        provider: job.provider_name,
        text: job.text,
        chunks: &request.chunks,
        assembled: &assembled,
        file: Some(path.clone()),
    }
    .entries();
    state.apply(Action::RecordGeneration(entries))?;

    Ok(Spoken {
        request_id,
        path,
        assembled,
    })
}
