//! Chunk request orchestrator: sequential per-chunk synthesis with bounded
//! retry, then ordered concatenation.
//!
//! ```text
//! text → plan_request: segment under the provider budget
//!      → run: for each chunk in order
//!           Pending → InFlight(n) → Succeeded ─┬─ inter-chunk delay → next chunk
//!                               → Retrying(n) ─┘ (backoff, then InFlight(n+1))
//!                               → Failed ───── next chunk
//!      → concatenate successful payloads in order
//! ```
//!
//! Delays go through a [`Clock`] so tests can observe them without waiting.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use voxrelay_core::retry::{ChunkRetry, RetryPolicy};
use voxrelay_core::segment::segment;
use voxrelay_core::text_prep::unit_length;
use voxrelay_core::types::{
    AudioChunkResult, AudioFormat, Progress, ProgressStage, ProviderLimits, SynthesisRequest,
    VoiceSettings,
};

use crate::error::{Error, Result};
use crate::provider::SpeechProvider;

/// Source of delays.
pub trait Clock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// [`Clock`] backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Concatenated audio plus the per-chunk outcomes that produced it.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub audio: Vec<u8>,
    pub format: AudioFormat,
    pub results: Vec<AudioChunkResult>,
}

impl Assembled {
    /// Indices of chunks that never produced audio.
    pub fn failed_chunks(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.index)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.results.iter().all(AudioChunkResult::succeeded)
    }
}

/// Validate `text` against the provider limits and segment it.
pub fn plan_request(
    text: &str,
    settings: VoiceSettings,
    limits: ProviderLimits,
) -> Result<SynthesisRequest> {
    if text.trim().is_empty() {
        return Err(Error::InvalidRequest("text is empty".into()));
    }
    if settings.voice.trim().is_empty() {
        return Err(Error::InvalidRequest("voice is empty".into()));
    }
    let units = unit_length(text);
    if units > limits.max_total {
        return Err(Error::InvalidRequest(format!(
            "text is {units} units, limit is {}",
            limits.max_total
        )));
    }
    Ok(SynthesisRequest {
        settings,
        chunks: segment(text, limits.max_segment),
    })
}

pub struct Orchestrator<P, C = TokioClock> {
    provider: P,
    clock: C,
    policy: RetryPolicy,
}

impl<P: SpeechProvider> Orchestrator<P> {
    pub fn new(provider: P) -> Self {
        Self::with_clock(provider, TokioClock, RetryPolicy::default())
    }
}

impl<P: SpeechProvider, C: Clock> Orchestrator<P, C> {
    pub fn with_clock(provider: P, clock: C, policy: RetryPolicy) -> Self {
        Self {
            provider,
            clock,
            policy,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Synthesize every chunk in order and concatenate the successes.
    ///
    /// Fails with [`Error::AllChunksFailed`] only when no chunk succeeded.
    pub async fn run(
        &self,
        request: &SynthesisRequest,
        on_progress: impl Fn(Progress),
    ) -> Result<Assembled> {
        let total = request.chunks.len();
        if total == 0 {
            return Err(Error::InvalidRequest("nothing to synthesize".into()));
        }

        let mut results = Vec::with_capacity(total);

        for (position, chunk) in request.chunks.iter().enumerate() {
            let current = position + 1;
            let mut retry = ChunkRetry::new(self.policy);
            let mut audio = None;

            while let Some(attempt) = retry.start() {
                debug!("chunk {current}/{total}: attempt {attempt}");
                match self.provider.synthesize(&chunk.text, &request.settings).await {
                    Ok(bytes) => {
                        retry.succeed();
                        audio = Some(bytes);
                    }
                    Err(e) if e.is_retryable() => {
                        warn!("chunk {current}/{total}: attempt {attempt} failed: {e}");
                        if let Some(delay) = retry.fail() {
                            on_progress(Progress {
                                current,
                                total,
                                stage: ProgressStage::Retrying { retry: attempt },
                                status: format!(
                                    "chunk {current}/{total} failed, retry {attempt} in {}s",
                                    delay.as_secs()
                                ),
                            });
                            self.clock.sleep(delay).await;
                        }
                    }
                    Err(e) => {
                        warn!("chunk {current}/{total}: giving up: {e}");
                        retry.abandon();
                    }
                }
            }

            let succeeded = audio.is_some();
            let attempts = retry.attempts();
            on_progress(Progress {
                current,
                total,
                stage: if succeeded {
                    ProgressStage::Succeeded
                } else {
                    ProgressStage::Failed
                },
                status: if succeeded {
                    format!("chunk {current}/{total} done")
                } else {
                    format!("chunk {current}/{total} failed after {attempts} attempts")
                },
            });
            results.push(AudioChunkResult {
                index: chunk.index,
                audio,
                attempts,
            });

            if succeeded && current < total {
                self.clock.sleep(self.policy.inter_chunk_delay).await;
            }
        }

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        if succeeded == 0 {
            return Err(Error::AllChunksFailed { attempted: total });
        }

        let audio: Vec<u8> = results
            .iter()
            .filter_map(|r| r.audio.as_deref())
            .flatten()
            .copied()
            .collect();
        info!(
            "synthesized {succeeded}/{total} chunks, {} bytes",
            audio.len()
        );

        Ok(Assembled {
            audio,
            format: request.settings.format,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use voxrelay_core::segment::TextChunk;

    /// Returns the chunk text as audio, after failing a scripted number of times.
    #[derive(Default)]
    struct ScriptedProvider {
        failures: HashMap<String, u32>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn failing(mut self, text: &str, times: u32) -> Self {
            self.failures.insert(text.to_string(), times);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl SpeechProvider for ScriptedProvider {
        fn synthesize(
            &self,
            text: &str,
            _settings: &VoiceSettings,
        ) -> impl Future<Output = Result<Vec<u8>>> + Send {
            let mut calls = self.calls.lock().unwrap();
            let prior = calls.iter().filter(|c| c.as_str() == text).count() as u32;
            calls.push(text.to_string());
            let fail_for = self.failures.get(text).copied().unwrap_or(0);
            let result = if prior < fail_for {
                Err(Error::Upstream {
                    status: 500,
                    message: "scripted".into(),
                })
            } else {
                Ok(text.as_bytes().to_vec())
            };
            std::future::ready(result)
        }
    }

    #[derive(Clone, Default)]
    struct FakeClock {
        sleeps: Arc<Mutex<Vec<Duration>>>,
    }

    impl FakeClock {
        fn millis(&self) -> Vec<u128> {
            self.sleeps.lock().unwrap().iter().map(Duration::as_millis).collect()
        }
    }

    impl Clock for FakeClock {
        fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
            self.sleeps.lock().unwrap().push(duration);
            std::future::ready(())
        }
    }

    fn request(texts: &[&str]) -> SynthesisRequest {
        SynthesisRequest {
            settings: VoiceSettings::new("v"),
            chunks: texts
                .iter()
                .enumerate()
                .map(|(index, t)| TextChunk {
                    index,
                    text: t.to_string(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn concatenates_in_order_skipping_failed_middle() {
        let provider = ScriptedProvider::default().failing("B", u32::MAX);
        let clock = FakeClock::default();
        let orch = Orchestrator::with_clock(provider, clock.clone(), RetryPolicy::default());

        let progress = Mutex::new(Vec::new());
        let out = orch
            .run(&request(&["A", "B", "C"]), |p| progress.lock().unwrap().push(p))
            .await
            .unwrap();

        assert_eq!(out.audio, b"AC");
        assert_eq!(out.failed_chunks(), vec![1]);
        assert!(!out.is_complete());
        assert_eq!(out.results[1].attempts, 3);
        assert_eq!(
            orch.provider().calls(),
            vec!["A", "B", "B", "B", "C"]
        );
        // A done → inter-chunk, B backoff ×2, B failed (no inter-chunk), C last
        assert_eq!(clock.millis(), vec![3000, 5000, 7000]);

        let stages: Vec<ProgressStage> = progress.lock().unwrap().iter().map(|p| p.stage).collect();
        assert_eq!(
            stages,
            vec![
                ProgressStage::Succeeded,
                ProgressStage::Retrying { retry: 1 },
                ProgressStage::Retrying { retry: 2 },
                ProgressStage::Failed,
                ProgressStage::Succeeded,
            ]
        );
    }

    #[tokio::test]
    async fn backoff_schedule_then_inter_chunk_delay() {
        let provider = ScriptedProvider::default().failing("first", 2);
        let clock = FakeClock::default();
        let orch = Orchestrator::with_clock(provider, clock.clone(), RetryPolicy::default());

        let out = orch.run(&request(&["first", "second"]), |_| {}).await.unwrap();

        assert_eq!(out.audio, b"firstsecond");
        assert!(out.is_complete());
        assert_eq!(out.results[0].attempts, 3);
        assert_eq!(clock.millis(), vec![5000, 7000, 3000]);
    }

    #[tokio::test]
    async fn all_failures_name_the_chunk_count() {
        let provider = ScriptedProvider::default()
            .failing("x", u32::MAX)
            .failing("y", u32::MAX);
        let orch = Orchestrator::with_clock(provider, FakeClock::default(), RetryPolicy::immediate(2));

        let err = orch.run(&request(&["x", "y"]), |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::AllChunksFailed { attempted: 2 }));
        assert_eq!(err.to_string(), "all 2 chunks failed");
    }

    #[tokio::test]
    async fn empty_request_is_invalid() {
        let orch = Orchestrator::with_clock(
            ScriptedProvider::default(),
            FakeClock::default(),
            RetryPolicy::default(),
        );
        let err = orch.run(&request(&[]), |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn progress_reports_position() {
        let orch = Orchestrator::with_clock(
            ScriptedProvider::default(),
            FakeClock::default(),
            RetryPolicy::default(),
        );
        let seen = Mutex::new(Vec::new());
        orch.run(&request(&["a", "b", "c", "d"]), |p| {
            seen.lock().unwrap().push((p.current, p.total, p.percent()))
        })
        .await
        .unwrap();
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[1], (2, 4, 50.0));
        assert_eq!(seen[3], (4, 4, 100.0));
    }

    #[test]
    fn plan_rejects_oversized_and_blank_text() {
        let limits = ProviderLimits {
            max_segment: 10,
            max_total: 30,
        };
        let err = plan_request("   ", VoiceSettings::new("v"), limits).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let err = plan_request(&"a".repeat(31), VoiceSettings::new("v"), limits).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        let err = plan_request("hello", VoiceSettings::new(""), limits).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));

        let plan = plan_request(&"word ".repeat(6), VoiceSettings::new("v"), limits).unwrap();
        assert_eq!(plan.chunks.len(), 3);
        assert!(plan.chunks.iter().all(|c| c.units() <= 10));
    }
}
