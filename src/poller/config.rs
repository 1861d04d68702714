//! Poller configuration.

use crate::error::{PollError, Result};
use crate::types::Event;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Ordering applied to each tick's merged batch before dispatch.
pub type EventOrder = Arc<dyn Fn(&Event, &Event) -> Ordering + Send + Sync>;

/// Default batch order: ascending timestamp. The sort is stable, so events
/// sharing a timestamp keep the order the source returned them in.
pub fn timestamp_order() -> EventOrder {
    Arc::new(|a: &Event, b: &Event| a.timestamp.cmp(&b.timestamp))
}

/// How ticks are driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// A dedicated thread ticks every `period`.
    #[default]
    Background,
    /// No thread; the owner calls `poll_now`.
    Manual,
}

/// Poller configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Time between tick starts.
    /// Default: 250ms
    pub period: Duration,

    /// Tick driver.
    /// Default: Background
    pub schedule: Schedule,

    /// Name of the background thread.
    pub thread_name: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(250),
            schedule: Schedule::Background,
            thread_name: "transport-poller".to_string(),
        }
    }
}

impl PollerConfig {
    /// Background poller ticking every `period`.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Poller driven only by `poll_now`.
    pub fn manual() -> Self {
        Self {
            schedule: Schedule::Manual,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.schedule == Schedule::Background && self.period.is_zero() {
            return Err(PollError::InvalidConfig(
                "poll period must be greater than zero".to_string(),
            ));
        }
        if self.thread_name.contains('\0') {
            return Err(PollError::InvalidConfig(
                "thread name must not contain NUL".to_string(),
            ));
        }
        Ok(())
    }
}
