//! # foreman-engine
//!
//! The boundary to the external reasoning/execution engine: a single
//! opaque `run` call returning free text plus optional token accounting.
//! Ships a deterministic mock for tests; real adapters live with the
//! embedding application.

pub mod adapter;
pub mod mock;

pub use adapter::{Engine, EngineRequest, EngineResponse, EngineUsage, estimate_tokens};
pub use mock::{MockEngine, MockReply};
