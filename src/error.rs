use thiserror::Error;

/// Top-level error type for the analysis pipeline.
///
/// Every variant is fatal to the run; there is no automatic retry. The only
/// non-fatal degradation in the pipeline is the empty-segment placeholder,
/// which is handled inside the orchestrator and never surfaces here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid or missing endpoint settings. Raised before any network call.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad input video. Raised before any inference call is attempted.
    #[error("invalid video input: {0}")]
    Validation(String),

    /// An inference call failed or returned fatally-empty content. The stage
    /// names which call failed ("segment 2/3", "final summary", ...).
    #[error("{stage} failed: {source}")]
    Upstream {
        stage: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn upstream(stage: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Upstream {
            stage: stage.into(),
            source: source.into(),
        }
    }

    pub fn empty_response(stage: impl Into<String>, endpoint: &str) -> Self {
        Self::Upstream {
            stage: stage.into(),
            source: anyhow::anyhow!("{endpoint} returned an empty response"),
        }
    }
}
