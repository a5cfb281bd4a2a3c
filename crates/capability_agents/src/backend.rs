use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend rejected the prompt: {0}")]
    Rejected(String),
}

/// Tuning knobs forwarded with every prompt.
#[derive(Debug, Clone)]
pub struct PromptParameters {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for PromptParameters {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 4096,
        }
    }
}

/// Boundary to the generative backend that produces analysis and code.
///
/// The backend is opaque from the agents' point of view: slow, fallible,
/// and free to answer in whatever shape it likes. Agents own the job of
/// parsing and validating what comes back.
#[async_trait]
pub trait PromptBackend: Send + Sync {
    async fn send_prompt(
        &self,
        prompt: &str,
        parameters: &PromptParameters,
    ) -> Result<String, BackendError>;
}

pub type SharedBackend = Arc<dyn PromptBackend>;
