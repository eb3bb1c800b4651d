//! Background jobs.

#[cfg(feature = "scheduler")]
mod scheduler;

#[cfg(feature = "scheduler")]
pub use scheduler::Scheduler;

use quill_core::rate_limit::ExpirySweep;

use crate::config::parse_flag;

/// Every five minutes, on the minute.
pub const DEFAULT_SWEEP_SCHEDULE: &str = "0 */5 * * * *";

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Six-field cron expression for the rate-limit expiry sweep.
    pub sweep_schedule: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_schedule: DEFAULT_SWEEP_SCHEDULE.to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            enabled: lookup("SCHEDULER_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.enabled),
            sweep_schedule: lookup("SWEEP_SCHEDULE")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.sweep_schedule),
        }
    }
}

/// One sweep pass. Failures are logged and the next run tries again.
pub async fn run_sweep(sweep: &ExpirySweep) {
    match sweep.run_once().await {
        Ok(removed) => tracing::debug!(removed, "Rate-limit sweep finished"),
        Err(e) => tracing::error!(error = %e, "Rate-limit sweep failed"),
    }
}
