//! # foreman-core
//!
//! Core types, events, and collaborator traits for the Foreman autonomous
//! work-item controller. This crate defines the shared vocabulary used by
//! every other crate in the workspace.

pub mod error;
pub mod event;
pub mod state;
pub mod task;
pub mod types;

pub use error::{ForemanError, Result};
pub use event::{Event, EventBus};
pub use state::{ControllerState, StateStore};
pub use task::{Task, TaskStatus, TaskStore};
pub use types::*;
