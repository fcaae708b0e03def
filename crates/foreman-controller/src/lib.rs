//! # foreman-controller
//!
//! The autonomous project manager at the heart of Foreman: owns the
//! authoritative controller state, selects and dispatches tasks to the
//! execution engine, classifies the results, gates risky actions behind
//! the approval queue, and reacts to the token governor with wind-down
//! and auto-resume transitions.

pub mod controller;
mod dispatch;

pub use controller::Controller;
pub use dispatch::DEFAULT_SYSTEM_PROMPT;
