use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use foreman_core::Result;

/// A request to the execution engine.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    /// The task-derived prompt.
    pub prompt: String,
    /// The controller's persona and policy prompt.
    pub system: Option<String>,
    /// Engine-side conversation session to resume, if any.
    pub session_id: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// A completed engine call.
#[derive(Debug, Clone)]
pub struct EngineResponse {
    pub text: String,
    /// Session id to resume next time (engines may mint a new one).
    pub session_id: Option<String>,
    /// Token accounting, when the engine reports it.
    pub usage: Option<EngineUsage>,
}

/// Token usage reported by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    /// Engine-reported context window; overrides configured usage limits.
    pub context_window: Option<u64>,
}

/// Trait implemented by each engine adapter. The cancellation token lets
/// `pause()`/`deactivate()` interrupt an in-flight call; implementations
/// must return promptly once it fires.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Human-readable adapter name.
    fn name(&self) -> &str;

    /// Run one prompt to completion.
    async fn run(&self, request: &EngineRequest, cancel: &CancellationToken)
    -> Result<EngineResponse>;
}

/// Rough token estimate (~4 chars per token) for engines that report no
/// usage.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
