//! Mock engine for deterministic testing.
//!
//! Returns pre-configured replies without reaching any external process.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::adapter::{Engine, EngineRequest, EngineResponse, EngineUsage};
use foreman_core::{ForemanError, Result};

/// A pre-configured reply from the mock engine.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub text: String,
    pub usage: Option<EngineUsage>,
    /// If set, the engine returns this error instead.
    pub error: Option<String>,
    /// Simulated latency; lets tests exercise cancellation mid-call.
    pub delay: Duration,
}

impl Default for MockReply {
    fn default() -> Self {
        Self {
            text: String::new(),
            usage: Some(EngineUsage {
                input_tokens: 100,
                output_tokens: 50,
                ..Default::default()
            }),
            error: None,
            delay: Duration::ZERO,
        }
    }
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, input: u64, output: u64) -> Self {
        self.usage = Some(EngineUsage {
            input_tokens: input,
            output_tokens: output,
            ..Default::default()
        });
        self
    }

    pub fn with_context_window(mut self, window: u64) -> Self {
        let mut usage = self.usage.unwrap_or_default();
        usage.context_window = Some(window);
        self.usage = Some(usage);
        self
    }

    pub fn without_usage(mut self) -> Self {
        self.usage = None;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A mock engine that plays back queued replies in order.
pub struct MockEngine {
    replies: Arc<Mutex<Vec<MockReply>>>,
    /// Every request received, for assertions in tests.
    pub requests: Arc<Mutex<Vec<EngineRequest>>>,
    name: String,
}

impl MockEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text reply.
    pub fn with_reply(self, text: &str) -> Self {
        self.replies.lock().push(MockReply::text(text));
        self
    }

    /// Queue an error reply.
    pub fn with_error(self, error: &str) -> Self {
        self.replies.lock().push(MockReply::error(error));
        self
    }

    /// Queue a fully custom reply.
    pub fn with_mock_reply(self, reply: MockReply) -> Self {
        self.replies.lock().push(reply);
        self
    }

    /// All requests made to this engine so far.
    pub fn recorded_requests(&self) -> Vec<EngineRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self) -> MockReply {
        let mut replies = self.replies.lock();
        if replies.is_empty() {
            MockReply::text("(mock: no more queued replies)")
        } else {
            replies.remove(0)
        }
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        request: &EngineRequest,
        cancel: &CancellationToken,
    ) -> Result<EngineResponse> {
        self.requests.lock().push(request.clone());
        let reply = self.next_reply();

        if !reply.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ForemanError::Cancelled),
                _ = tokio::time::sleep(reply.delay) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(ForemanError::Cancelled);
        }

        if let Some(error) = reply.error {
            return Err(ForemanError::Engine(error));
        }

        Ok(EngineResponse {
            text: reply.text,
            session_id: request.session_id.clone().or_else(|| Some("mock-session".into())),
            usage: reply.usage,
        })
    }
}
