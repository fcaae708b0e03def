//! # foreman-governor
//!
//! Tracks rolling hourly and cumulative daily token consumption against the
//! configured budgets and derives a usage-limit status from them. The
//! controller reacts to that status with wind-down / resume transitions;
//! the governor itself never touches controller state.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use foreman_config::UsageLimitConfig;
use foreman_core::{Event, EventBus, UsageLimitStatus};

/// The rolling hourly window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub limit: u64,
    pub reset_at: DateTime<Utc>,
}

impl HourlyUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// The calendar-day window. Resets at date change, not a rolling 24 h.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyUsage {
    pub input: u64,
    pub output: u64,
    /// Day key, `%Y-%m-%d`.
    pub date: String,
}

impl DailyUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// Returned by [`TokenGovernor::record_usage`].
#[derive(Debug, Clone)]
pub struct UsageReport {
    pub usage: HourlyUsage,
    pub daily_usage: DailyUsage,
    pub status: UsageLimitStatus,
}

/// Hourly and daily consumption as percentages of their budgets (0–100+).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsagePercentages {
    pub hourly: f64,
    pub daily: f64,
}

/// Partial update for the usage-limit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageLimitUpdate {
    pub max_tokens_per_hour: Option<u64>,
    pub max_tokens_per_day: Option<u64>,
    pub pause_threshold: Option<f64>,
    pub warning_threshold: Option<f64>,
    pub auto_resume_on_reset: Option<bool>,
}

#[derive(Debug, Clone)]
struct GovernorState {
    hourly: HourlyUsage,
    daily: DailyUsage,
    config: UsageLimitConfig,
    /// Completed hourly windows, most recent last. Kept for reporting.
    archived: Vec<HourlyUsage>,
    last_status: UsageLimitStatus,
}

/// Tracks token spend and derives [`UsageLimitStatus`] from it.
#[derive(Clone)]
pub struct TokenGovernor {
    state: Arc<RwLock<GovernorState>>,
    events: EventBus,
}

/// Archived windows kept for a day of history.
const MAX_ARCHIVED_WINDOWS: usize = 24;

impl TokenGovernor {
    pub fn new(config: UsageLimitConfig, events: EventBus) -> Self {
        let now = Utc::now();
        Self {
            state: Arc::new(RwLock::new(GovernorState {
                hourly: HourlyUsage {
                    input_tokens: 0,
                    output_tokens: 0,
                    limit: config.max_tokens_per_hour,
                    reset_at: now + Duration::hours(1),
                },
                daily: DailyUsage {
                    input: 0,
                    output: 0,
                    date: today(),
                },
                config,
                archived: Vec::new(),
                last_status: UsageLimitStatus::Ok,
            })),
            events,
        }
    }

    /// Record token consumption and return the updated windows and status.
    ///
    /// An engine-reported `context_window` that differs from the configured
    /// hourly limit takes precedence over static configuration: the hourly
    /// limit becomes the context window and the daily limit five times it.
    pub fn record_usage(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        context_window: Option<u64>,
    ) -> UsageReport {
        let mut state = self.state.write();
        let now = Utc::now();
        Self::roll_windows(&mut state, now);

        if let Some(window) = context_window
            && window != state.config.max_tokens_per_hour
        {
            info!(
                reported = window,
                configured = state.config.max_tokens_per_hour,
                "engine-reported context window overrides configured limits"
            );
            state.config.max_tokens_per_hour = window;
            state.config.max_tokens_per_day = window * 5;
            state.hourly.limit = window;
        }

        state.hourly.input_tokens += input_tokens;
        state.hourly.output_tokens += output_tokens;
        state.daily.input += input_tokens;
        state.daily.output += output_tokens;

        let status = Self::derive_status(&state);
        if status != state.last_status {
            if status != UsageLimitStatus::Ok {
                let (hourly_pct, daily_pct) = Self::fractions(&state);
                warn!(
                    %status,
                    hourly_pct = hourly_pct * 100.0,
                    daily_pct = daily_pct * 100.0,
                    "usage status changed"
                );
                self.events.publish(Event::UsageWarning {
                    status,
                    hourly_pct: hourly_pct * 100.0,
                    daily_pct: daily_pct * 100.0,
                });
            }
            state.last_status = status;
        }

        UsageReport {
            usage: state.hourly.clone(),
            daily_usage: state.daily.clone(),
            status,
        }
    }

    /// Current status without recording anything.
    pub fn status(&self) -> UsageLimitStatus {
        let state = self.state.read();
        Self::derive_status(&state)
    }

    /// Current windows and status without recording anything.
    pub fn report(&self) -> UsageReport {
        let state = self.state.read();
        UsageReport {
            usage: state.hourly.clone(),
            daily_usage: state.daily.clone(),
            status: Self::derive_status(&state),
        }
    }

    /// Hourly and daily consumption as percentages of their budgets.
    pub fn percentages(&self) -> UsagePercentages {
        let state = self.state.read();
        let (hourly, daily) = Self::fractions(&state);
        UsagePercentages {
            hourly: hourly * 100.0,
            daily: daily * 100.0,
        }
    }

    /// Roll expired windows forward. Returns `true` when the hourly window
    /// reset, which is the signal the controller's wind-down recovery waits
    /// for.
    pub fn roll_if_due(&self) -> bool {
        let mut state = self.state.write();
        let rolled = Self::roll_windows(&mut state, Utc::now());
        if rolled {
            let status = Self::derive_status(&state);
            state.last_status = status;
        }
        rolled
    }

    /// When the current hourly window ends.
    pub fn hourly_reset_at(&self) -> DateTime<Utc> {
        self.state.read().hourly.reset_at
    }

    pub fn config(&self) -> UsageLimitConfig {
        self.state.read().config.clone()
    }

    pub fn update_config(&self, update: UsageLimitUpdate) -> UsageLimitConfig {
        let mut state = self.state.write();
        if let Some(v) = update.max_tokens_per_hour {
            state.config.max_tokens_per_hour = v;
            state.hourly.limit = v;
        }
        if let Some(v) = update.max_tokens_per_day {
            state.config.max_tokens_per_day = v;
        }
        if let Some(v) = update.pause_threshold {
            state.config.pause_threshold = v;
        }
        if let Some(v) = update.warning_threshold {
            state.config.warning_threshold = v;
        }
        if let Some(v) = update.auto_resume_on_reset {
            state.config.auto_resume_on_reset = v;
        }
        state.config.clone()
    }

    /// Current hourly window snapshot.
    pub fn hourly(&self) -> HourlyUsage {
        self.state.read().hourly.clone()
    }

    /// Current daily window snapshot.
    pub fn daily(&self) -> DailyUsage {
        self.state.read().daily.clone()
    }

    /// Completed hourly windows, oldest first.
    pub fn archived_hours(&self) -> Vec<HourlyUsage> {
        self.state.read().archived.clone()
    }

    fn roll_windows(state: &mut GovernorState, now: DateTime<Utc>) -> bool {
        let mut hourly_rolled = false;
        if now > state.hourly.reset_at {
            let finished = state.hourly.clone();
            state.archived.push(finished);
            if state.archived.len() > MAX_ARCHIVED_WINDOWS {
                state.archived.remove(0);
            }
            state.hourly = HourlyUsage {
                input_tokens: 0,
                output_tokens: 0,
                limit: state.config.max_tokens_per_hour,
                reset_at: now + Duration::hours(1),
            };
            hourly_rolled = true;
        }
        let day = today();
        if state.daily.date != day {
            state.daily = DailyUsage {
                input: 0,
                output: 0,
                date: day,
            };
        }
        hourly_rolled
    }

    fn fractions(state: &GovernorState) -> (f64, f64) {
        let hourly = if state.hourly.limit > 0 {
            state.hourly.total() as f64 / state.hourly.limit as f64
        } else {
            0.0
        };
        let daily = if state.config.max_tokens_per_day > 0 {
            state.daily.total() as f64 / state.config.max_tokens_per_day as f64
        } else {
            0.0
        };
        (hourly, daily)
    }

    fn derive_status(state: &GovernorState) -> UsageLimitStatus {
        let (hourly, daily) = Self::fractions(state);
        let fraction = hourly.max(daily);
        if fraction < state.config.warning_threshold {
            UsageLimitStatus::Ok
        } else if fraction < state.config.pause_threshold {
            UsageLimitStatus::Warning
        } else if fraction < 1.0 {
            UsageLimitStatus::ApproachingLimit
        } else {
            UsageLimitStatus::AtLimit
        }
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}
