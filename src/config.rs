use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::batching::DEFAULT_BATCH_CEILING;
use crate::error::PipelineError;

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llava:latest";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 1.0;
pub const DEFAULT_BATCH_DELAY_MS: u64 = 1000;

/// Which backend family services inference calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Ollama,
    OpenAi,
}

impl FromStr for EndpointKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            other => Err(PipelineError::Config(format!(
                "invalid ENDPOINT_TYPE '{other}': must be 'ollama' or 'openai'"
            ))),
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => f.write_str("ollama"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

/// Settings for one analysis run, constructed once at process start and
/// passed into the orchestrator. Never read from the environment after
/// construction.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub endpoint: EndpointKind,
    pub ollama_host: String,
    pub ollama_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    /// Upper bound on frames per inference call when auto-calculating.
    pub batch_ceiling: usize,
    /// Courtesy pause between sequential batch calls. Zero disables it.
    pub batch_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointKind::Ollama,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: None,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            batch_ceiling: DEFAULT_BATCH_CEILING,
            batch_delay: Duration::from_millis(DEFAULT_BATCH_DELAY_MS),
        }
    }
}

impl RunConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary lookup (useful for testing).
    pub fn from_lookup<F>(get: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = match get("ENDPOINT_TYPE") {
            Some(raw) => raw.trim().to_ascii_lowercase().parse()?,
            None => EndpointKind::Ollama,
        };

        let config = Self {
            endpoint,
            ollama_host: get("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string()),
            ollama_model: get("OLLAMA_MODEL").unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL"),
            temperature: parse_setting(&get, "LLM_TEMPERATURE", DEFAULT_TEMPERATURE)?,
            top_p: parse_setting(&get, "LLM_TOP_P", DEFAULT_TOP_P)?,
            batch_ceiling: parse_setting(&get, "BATCH_SIZE_CEILING", DEFAULT_BATCH_CEILING)?,
            batch_delay: Duration::from_millis(parse_setting(
                &get,
                "BATCH_DELAY_MS",
                DEFAULT_BATCH_DELAY_MS,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that the selected endpoint has everything it needs. Runs before
    /// any network call.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_ceiling == 0 {
            return Err(PipelineError::Config(
                "BATCH_SIZE_CEILING must be at least 1".to_string(),
            ));
        }

        match self.endpoint {
            EndpointKind::Ollama => {
                if self.ollama_host.is_empty() {
                    return Err(PipelineError::Config(
                        "ENDPOINT_TYPE is 'ollama' but OLLAMA_HOST is empty".to_string(),
                    ));
                }
                if self.ollama_model.is_empty() {
                    return Err(PipelineError::Config(
                        "ENDPOINT_TYPE is 'ollama' but OLLAMA_MODEL is empty".to_string(),
                    ));
                }
            }
            EndpointKind::OpenAi => {
                if self.openai_api_key.as_deref().map_or(true, str::is_empty) {
                    return Err(PipelineError::Config(
                        "ENDPOINT_TYPE is 'openai' but OPENAI_API_KEY is not set".to_string(),
                    ));
                }
                if self.openai_model.is_empty() {
                    return Err(PipelineError::Config(
                        "ENDPOINT_TYPE is 'openai' but OPENAI_MODEL is empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn parse_setting<F, T>(get: &F, key: &str, default: T) -> Result<T, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PipelineError::Config(format!("invalid {key} '{raw}': {e}"))),
        None => Ok(default),
    }
}
