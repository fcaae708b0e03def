use foreman_core::ApprovalActionType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `foreman.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForemanConfig {
    pub controller: ControllerConfig,
    pub engine: EngineConfig,
    pub usage: UsageLimitConfig,
    pub auto_approval: AutoApprovalConfig,
    pub logging: LoggingConfig,
}

// ── Controller ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Seconds between dispatch-loop ticks.
    pub poll_interval_secs: u64,
    /// Minutes until a pending approval request expires (hard timeout).
    pub approval_expiry_minutes: i64,
    /// Maximum characters of engine output kept in an action-log entry.
    pub log_output_max_chars: usize,
    /// Overrides the built-in controller persona prompt.
    pub system_prompt: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            approval_expiry_minutes: 30,
            log_output_max_chars: 500,
            system_prompt: None,
        }
    }
}

// ── Engine ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model identifier passed through to the engine adapter.
    pub model: String,
    /// Maximum tokens per engine response.
    pub max_tokens: u32,
    /// Resume the engine-side conversation session across tasks.
    pub resume_sessions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4-20250514".into(),
            max_tokens: 16384,
            resume_sessions: true,
        }
    }
}

// ── Usage limits ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageLimitConfig {
    /// Token budget for the rolling hourly window.
    pub max_tokens_per_hour: u64,
    /// Token budget for the calendar day.
    pub max_tokens_per_day: u64,
    /// Fraction of the budget at which the controller winds down (0..1].
    pub pause_threshold: f64,
    /// Fraction of the budget at which a warning is emitted; must be
    /// strictly below `pause_threshold`.
    pub warning_threshold: f64,
    /// Resume automatically when the hourly window resets.
    pub auto_resume_on_reset: bool,
}

impl Default for UsageLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_hour: 200_000,
            max_tokens_per_day: 1_000_000,
            pause_threshold: 0.8,
            warning_threshold: 0.6,
            auto_resume_on_reset: true,
        }
    }
}

// ── Auto-approval ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoApprovalConfig {
    pub enabled: bool,
    /// Action types eligible for auto-approval once aged.
    pub allowed_action_types: Vec<ApprovalActionType>,
    /// Minutes a request must stay pending before auto-approval. 0 disables.
    pub max_pending_time_minutes: i64,
    /// Git pushes always need a human even when `git_push` is allowed above.
    pub require_confirmation_for_git_push: bool,
}

impl Default for AutoApprovalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_action_types: vec![],
            max_pending_time_minutes: 0,
            require_confirmation_for_git_push: true,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stdout only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

impl ForemanConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Poll interval ───
        if self.controller.poll_interval_secs == 0 {
            warnings.push(ConfigWarning {
                field: "controller.poll_interval_secs".into(),
                message: "poll interval is 0 — the dispatch loop would spin".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 5".into()),
            });
        }

        // ── Approval expiry ───
        if self.controller.approval_expiry_minutes <= 0 {
            warnings.push(ConfigWarning {
                field: "controller.approval_expiry_minutes".into(),
                message: "approval requests would expire immediately".into(),
                severity: WarningSeverity::Warning,
                hint: Some("30 minutes is typical".into()),
            });
        }

        // ── Usage thresholds ───
        // The governor assumes warning < pause <= 1.0 and does not re-check
        // in its hot path, so ordering violations are hard errors here.
        if self.usage.pause_threshold <= 0.0 || self.usage.pause_threshold > 1.0 {
            warnings.push(ConfigWarning {
                field: "usage.pause_threshold".into(),
                message: format!(
                    "pause threshold {} is out of range (0, 1]",
                    self.usage.pause_threshold
                ),
                severity: WarningSeverity::Error,
                hint: Some("0.8 is typical".into()),
            });
        }
        if self.usage.warning_threshold >= self.usage.pause_threshold {
            warnings.push(ConfigWarning {
                field: "usage.warning_threshold".into(),
                message: format!(
                    "warning threshold {} must be strictly below pause threshold {}",
                    self.usage.warning_threshold, self.usage.pause_threshold
                ),
                severity: WarningSeverity::Error,
                hint: Some("Use e.g. warning 0.6, pause 0.8".into()),
            });
        }
        if self.usage.max_tokens_per_hour == 0 {
            warnings.push(ConfigWarning {
                field: "usage.max_tokens_per_hour".into(),
                message: "hourly budget is 0 — the controller would never run".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 200000".into()),
            });
        }
        if self.usage.max_tokens_per_day < self.usage.max_tokens_per_hour {
            warnings.push(ConfigWarning {
                field: "usage.max_tokens_per_day".into(),
                message: "daily budget is below the hourly budget".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Daily is usually a multiple of hourly (e.g. 5x)".into()),
            });
        }

        // ── Auto-approval ───
        if self.auto_approval.enabled && self.auto_approval.allowed_action_types.is_empty() {
            warnings.push(ConfigWarning {
                field: "auto_approval.allowed_action_types".into(),
                message: "auto-approval enabled but no action types are allowed".into(),
                severity: WarningSeverity::Warning,
                hint: Some("List e.g. [\"planning\", \"large_edit\"]".into()),
            });
        }
        if self.auto_approval.max_pending_time_minutes < 0 {
            warnings.push(ConfigWarning {
                field: "auto_approval.max_pending_time_minutes".into(),
                message: "negative pending time".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use 0 to disable, or a positive number of minutes".into()),
            });
        }

        // ── Engine ───
        if self.engine.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "engine.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'anthropic/claude-sonnet-4-20250514'".into()),
            });
        }
        if self.engine.max_tokens == 0 {
            warnings.push(ConfigWarning {
                field: "engine.max_tokens".into(),
                message: "max_tokens is 0 — the engine won't produce output".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 8192".into()),
            });
        }

        // ── Logging ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| w.to_string())
            .collect();
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors.join("\n"))
        }
    }
}
