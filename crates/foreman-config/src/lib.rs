//! # foreman-config
//!
//! Configuration for the Foreman controller, loaded from `foreman.toml`
//! with environment-variable overrides and startup validation.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    AutoApprovalConfig, ConfigWarning, ControllerConfig, EngineConfig, ForemanConfig,
    LoggingConfig, UsageLimitConfig, WarningSeverity,
};
