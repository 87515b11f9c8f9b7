use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::backend::{Sampling, VlmClient};
use crate::batching::{optimal_batch_size, partition_frames, BatchObservation};
use crate::capture::EncodedFrame;
use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::prompt;

/// Literal marker separating the narrative from the trailing statistics
/// block in [`RunResult::report`]. Callers split on it best-effort.
pub const STATS_MARKER: &str = "--- Performance Statistics ---";

/// Substituted for a segment whose inference call came back empty, so one
/// bad segment cannot block the final synthesis.
pub const EMPTY_SEGMENT_PLACEHOLDER: &str = "(no response from the model for this segment)";

const WHOLE_CLIP_STAGE: &str = "whole-clip analysis";
const SUMMARY_STAGE: &str = "final summary";

/// Aggregate timing and shape statistics for one run.
#[derive(Debug)]
pub struct RunStats {
    pub total: Duration,
    pub frame_count: usize,
    pub batch_count: usize,
    pub batch_size: usize,
    pub batch_times: Vec<Duration>,
    pub synthesis: Option<Duration>,
    pub endpoint: String,
}

impl RunStats {
    fn average_batch_seconds(&self) -> f64 {
        if self.batch_times.is_empty() {
            return 0.0;
        }
        self.batch_times.iter().map(Duration::as_secs_f64).sum::<f64>()
            / self.batch_times.len() as f64
    }
}

/// Final narrative plus run statistics. Produced once at the end of a run.
#[derive(Debug)]
pub struct RunResult {
    pub narrative: String,
    pub stats: RunStats,
}

impl RunResult {
    /// Render the single output string: narrative, then the statistics block
    /// behind [`STATS_MARKER`].
    pub fn report(&self) -> String {
        let stats = &self.stats;
        let mut out = format!(
            "{}\n\n{STATS_MARKER}\nTotal runtime: {:.2} seconds\n",
            self.narrative,
            stats.total.as_secs_f64(),
        );
        if stats.batch_count <= 1 {
            let _ = write!(
                out,
                "Frames processed: {} in a single batch via {}\n\
                 Processing approach: Single batch (perfect temporal alignment)\n\
                 Context window utilization: Full sequence analysis",
                stats.frame_count, stats.endpoint,
            );
        } else {
            let _ = write!(
                out,
                "Frames processed: {} in {} batches of up to {} frames each via {}\n\
                 Processing approach: Batched processing with temporal context\n\
                 Average time per batch: {:.2} seconds\n\
                 Summary generation time: {:.2} seconds",
                stats.frame_count,
                stats.batch_count,
                stats.batch_size,
                stats.endpoint,
                stats.average_batch_seconds(),
                stats.synthesis.unwrap_or_default().as_secs_f64(),
            );
        }
        out
    }
}

/// Drives single-shot or multi-batch analysis of a frame sequence.
///
/// Batches run strictly in index order, one inference call in flight at a
/// time; each batch's prompt carries the previous batch's observations, so
/// no parallelism is possible without breaking that dependency.
pub struct Analyzer {
    client: Arc<dyn VlmClient>,
    sampling: Sampling,
    batch_ceiling: usize,
    batch_delay: Duration,
}

impl Analyzer {
    pub fn new(client: Arc<dyn VlmClient>, config: &RunConfig) -> Self {
        Self {
            client,
            sampling: Sampling {
                temperature: config.temperature,
                top_p: config.top_p,
            },
            batch_ceiling: config.batch_ceiling,
            batch_delay: config.batch_delay,
        }
    }

    /// Analyze the extracted frames against the user's task.
    ///
    /// `batch_size_override` skips the planner and is honored for every
    /// endpoint kind alike. `fps` is the rate the frames were sampled at and
    /// anchors every timestamp in the prompts.
    pub async fn analyze(
        &self,
        frames: &[EncodedFrame],
        user_prompt: &str,
        batch_size_override: Option<usize>,
        fps: u32,
    ) -> Result<RunResult, PipelineError> {
        if frames.is_empty() {
            return Err(PipelineError::Validation(
                "no frames to analyze".to_string(),
            ));
        }
        if fps == 0 {
            return Err(PipelineError::Validation(
                "sampling rate must be at least 1 fps".to_string(),
            ));
        }

        let batch_size = match batch_size_override {
            Some(0) => {
                return Err(PipelineError::Config(
                    "batch size override must be at least 1".to_string(),
                ))
            }
            Some(size) => size,
            None => optimal_batch_size(frames.len(), self.batch_ceiling),
        };

        info!(
            frame_count = frames.len(),
            batch_size,
            fps,
            endpoint = self.client.name(),
            temperature = self.sampling.temperature,
            top_p = self.sampling.top_p,
            "starting analysis"
        );

        if frames.len() <= batch_size {
            self.analyze_whole_clip(frames, user_prompt, fps).await
        } else {
            self.analyze_in_batches(frames, user_prompt, batch_size, fps)
                .await
        }
    }

    async fn analyze_whole_clip(
        &self,
        frames: &[EncodedFrame],
        user_prompt: &str,
        fps: u32,
    ) -> Result<RunResult, PipelineError> {
        info!(frame_count = frames.len(), "processing all frames in a single batch");
        let started = Instant::now();

        let prompt = prompt::whole_clip_prompt(frames.len(), fps, user_prompt);
        let narrative = self.call(WHOLE_CLIP_STAGE, &prompt, frames).await?;
        if narrative.trim().is_empty() {
            return Err(PipelineError::empty_response(
                WHOLE_CLIP_STAGE,
                self.client.name(),
            ));
        }

        let total = started.elapsed();
        info!(seconds = total.as_secs_f64(), "single batch analysis complete");

        Ok(RunResult {
            narrative,
            stats: RunStats {
                total,
                frame_count: frames.len(),
                batch_count: 1,
                batch_size: frames.len(),
                batch_times: vec![total],
                synthesis: None,
                endpoint: self.client.name().to_string(),
            },
        })
    }

    async fn analyze_in_batches(
        &self,
        frames: &[EncodedFrame],
        user_prompt: &str,
        batch_size: usize,
        fps: u32,
    ) -> Result<RunResult, PipelineError> {
        let started = Instant::now();
        let batches = partition_frames(frames, batch_size);
        info!(
            batch_count = batches.len(),
            batch_size, "processing clip in batches"
        );

        let mut observations: Vec<BatchObservation> = Vec::with_capacity(batches.len());
        let mut batch_times = Vec::with_capacity(batches.len());

        for (i, batch) in batches.iter().enumerate() {
            let stage = format!("segment {}/{}", i + 1, batches.len());
            info!(
                segment = i + 1,
                total_segments = batches.len(),
                frames = batch.len(),
                start_seconds = batch.start_seconds(fps),
                end_seconds = batch.end_seconds(fps),
                "processing segment"
            );

            let prompt = prompt::segment_prompt(batch, fps, observations.last(), user_prompt);
            let batch_started = Instant::now();
            let mut text = self.call(&stage, &prompt, batch.frames).await?;
            if text.trim().is_empty() {
                warn!(
                    segment = i + 1,
                    "empty response for segment, substituting placeholder"
                );
                text = EMPTY_SEGMENT_PLACEHOLDER.to_string();
            }
            let batch_time = batch_started.elapsed();
            batch_times.push(batch_time);
            info!(
                segment = i + 1,
                seconds = batch_time.as_secs_f64(),
                "segment processed"
            );

            observations.push(BatchObservation {
                start_seconds: batch.start_seconds(fps),
                end_seconds: batch.end_seconds(fps),
                text,
            });

            // Courtesy throttle between sequential calls, skipped after the
            // last batch.
            if i + 1 < batches.len() && !self.batch_delay.is_zero() {
                sleep(self.batch_delay).await;
            }
        }

        info!("generating final temporally-aware summary");
        let synthesis_started = Instant::now();
        let prompt = prompt::synthesis_prompt(frames.len(), fps, &observations, user_prompt);
        let narrative = self.call(SUMMARY_STAGE, &prompt, &[]).await?;
        if narrative.trim().is_empty() {
            return Err(PipelineError::empty_response(
                SUMMARY_STAGE,
                self.client.name(),
            ));
        }
        let synthesis = synthesis_started.elapsed();

        Ok(RunResult {
            narrative,
            stats: RunStats {
                total: started.elapsed(),
                frame_count: frames.len(),
                batch_count: batches.len(),
                batch_size,
                batch_times,
                synthesis: Some(synthesis),
                endpoint: self.client.name().to_string(),
            },
        })
    }

    async fn call(
        &self,
        stage: &str,
        prompt: &str,
        images: &[EncodedFrame],
    ) -> Result<String, PipelineError> {
        self.client
            .generate(prompt, images, self.sampling)
            .await
            .map_err(|source| PipelineError::upstream(stage, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    #[derive(Debug, Clone)]
    struct RecordedCall {
        prompt: String,
        image_count: usize,
    }

    /// Records every call and replays a scripted response queue; once the
    /// script runs out it answers with "observation N".
    #[derive(Debug)]
    struct RecordingClient {
        calls: Mutex<Vec<RecordedCall>>,
        script: Mutex<VecDeque<Result<String, String>>>,
    }

    impl RecordingClient {
        fn new() -> Arc<Self> {
            Self::scripted(vec![])
        }

        fn scripted(responses: Vec<Result<String, String>>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                script: Mutex::new(responses.into()),
            })
        }

        fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VlmClient for RecordingClient {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(
            &self,
            prompt: &str,
            images: &[EncodedFrame],
            _sampling: Sampling,
        ) -> anyhow::Result<String> {
            let ordinal = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(RecordedCall {
                    prompt: prompt.to_string(),
                    image_count: images.len(),
                });
                calls.len()
            };
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(message)) => Err(anyhow::anyhow!(message)),
                None => Ok(format!("observation {ordinal}")),
            }
        }
    }

    fn frames(count: usize) -> Vec<EncodedFrame> {
        (0..count).map(|i| vec![i as u8]).collect()
    }

    fn analyzer(client: Arc<RecordingClient>) -> Analyzer {
        let config = RunConfig {
            batch_delay: Duration::ZERO,
            ..RunConfig::default()
        };
        Analyzer::new(client, &config)
    }

    #[tokio::test]
    async fn short_clip_uses_a_single_call() {
        let client = RecordingClient::new();
        let result = analyzer(client.clone())
            .analyze(&frames(10), "what happens?", None, 8)
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].image_count, 10);
        assert_eq!(result.narrative, "observation 1");
        assert_eq!(result.stats.batch_count, 1);
        assert!(result.report().contains("single batch"));
    }

    #[tokio::test]
    async fn long_clip_issues_segment_calls_then_one_synthesis_call() {
        let client = RecordingClient::new();
        let result = analyzer(client.clone())
            .analyze(&frames(50), "what happens?", Some(20), 8)
            .await
            .unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls.iter().map(|c| c.image_count).collect::<Vec<_>>(),
            vec![20, 20, 10, 0]
        );
        assert_eq!(result.stats.batch_count, 3);
        assert_eq!(result.stats.batch_size, 20);
        assert!(result.stats.synthesis.is_some());
        // The synthesis response is the narrative, not any segment text.
        assert_eq!(result.narrative, "observation 4");
    }

    #[tokio::test]
    async fn each_segment_carries_only_the_previous_observation() {
        let client = RecordingClient::new();
        analyzer(client.clone())
            .analyze(&frames(50), "track the dog", Some(20), 8)
            .await
            .unwrap();

        let calls = client.calls();
        assert!(!calls[0].prompt.contains("preceding segment"));
        assert!(calls[1].prompt.contains("preceding segment"));
        assert!(calls[1].prompt.contains("observation 1"));
        assert!(calls[2].prompt.contains("observation 2"));
        // Only the immediate predecessor is carried, never the full history.
        assert!(!calls[2].prompt.contains("observation 1"));
    }

    #[tokio::test]
    async fn synthesis_prompt_contains_every_segment() {
        let client = RecordingClient::new();
        analyzer(client.clone())
            .analyze(&frames(50), "what happens?", Some(20), 8)
            .await
            .unwrap();

        let synthesis = &client.calls()[3].prompt;
        assert!(synthesis.contains("Segment 1 (Time"));
        assert!(synthesis.contains("Segment 2 (Time"));
        assert!(synthesis.contains("Segment 3 (Time"));
        assert!(synthesis.contains("observation 1"));
        assert!(synthesis.contains("observation 2"));
        assert!(synthesis.contains("observation 3"));
    }

    #[tokio::test]
    async fn empty_segment_response_becomes_a_placeholder() {
        let client = RecordingClient::scripted(vec![Ok(String::new())]);
        let result = analyzer(client.clone())
            .analyze(&frames(50), "what happens?", Some(20), 8)
            .await
            .unwrap();

        let synthesis = &client.calls()[3].prompt;
        assert!(synthesis.contains(EMPTY_SEGMENT_PLACEHOLDER));
        assert_eq!(result.stats.batch_count, 3);
    }

    #[tokio::test]
    async fn empty_synthesis_response_is_fatal() {
        let client = RecordingClient::scripted(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
            Ok("c".to_string()),
            Ok(String::new()),
        ]);
        let err = analyzer(client)
            .analyze(&frames(50), "what happens?", Some(20), 8)
            .await
            .unwrap_err();

        match err {
            PipelineError::Upstream { stage, .. } => assert_eq!(stage, "final summary"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_whole_clip_response_is_fatal() {
        let client = RecordingClient::scripted(vec![Ok(String::new())]);
        let err = analyzer(client)
            .analyze(&frames(5), "what happens?", None, 8)
            .await
            .unwrap_err();

        match err {
            PipelineError::Upstream { stage, .. } => assert_eq!(stage, "whole-clip analysis"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_segment_call_fails_the_whole_run() {
        let client = RecordingClient::scripted(vec![
            Ok("a".to_string()),
            Err("connection refused".to_string()),
        ]);
        let err = analyzer(client.clone())
            .analyze(&frames(50), "what happens?", Some(20), 8)
            .await
            .unwrap_err();

        match err {
            PipelineError::Upstream { stage, .. } => assert_eq!(stage, "segment 2/3"),
            other => panic!("expected upstream error, got {other:?}"),
        }
        // The run stops at the failure; no synthesis call is attempted.
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_frame_sequence_is_rejected() {
        let err = analyzer(RecordingClient::new())
            .analyze(&[], "what happens?", None, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn zero_batch_size_override_is_rejected() {
        let client = RecordingClient::new();
        let err = analyzer(client.clone())
            .analyze(&frames(10), "what happens?", Some(0), 8)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)), "got {err:?}");
        assert!(client.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_inserted_between_batches_but_not_after_the_last() {
        let client = RecordingClient::new();
        let analyzer = Analyzer::new(client, &RunConfig::default());

        let started = tokio::time::Instant::now();
        analyzer
            .analyze(&frames(50), "what happens?", Some(20), 8)
            .await
            .unwrap();

        // Three batches pause twice; the synthesis call adds no pause.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn single_batch_run_never_pauses() {
        let client = RecordingClient::new();
        let analyzer = Analyzer::new(client, &RunConfig::default());

        let started = tokio::time::Instant::now();
        analyzer
            .analyze(&frames(10), "what happens?", None, 8)
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn batched_report_includes_statistics_block() {
        let client = RecordingClient::new();
        let result = analyzer(client)
            .analyze(&frames(50), "what happens?", Some(20), 8)
            .await
            .unwrap();

        let report = result.report();
        let (narrative, stats) = report.split_once(STATS_MARKER).unwrap();
        assert!(narrative.contains("observation 4"));
        assert!(stats.contains("50 in 3 batches of up to 20 frames each via mock"));
        assert!(stats.contains("Summary generation time:"));
    }
}
