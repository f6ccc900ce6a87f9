use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::Clock;

/// What a completed suspension actually achieved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaitReport {
    pub planned: DateTime<Utc>,
    pub achieved: DateTime<Utc>,
    /// `achieved - planned` in milliseconds; positive means late.
    pub drift_ms: f64,
}

/// The wait was abandoned because the run's cancellation token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Suspends the calling task until an absolute instant.
#[derive(Clone)]
pub struct Waiter {
    clock: Arc<dyn Clock>,
}

impl Waiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Yield until `instant`, or until `cancel` fires.
    ///
    /// A past instant is a no-op that logs a warning; suspension itself never errors.
    pub async fn suspend_until(
        &self,
        instant: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<WaitReport, Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let now = self.clock.now();
        if instant <= now {
            let report = self.report(instant);
            warn!(
                planned = %instant.to_rfc3339(),
                drift_ms = report.drift_ms,
                "wait target already passed; continuing without suspension"
            );
            return Ok(report);
        }

        debug!(
            until = %instant.to_rfc3339(),
            wait_secs = (instant - now).num_milliseconds() as f64 / 1_000.0,
            "suspending"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = self.clock.sleep_until(instant) => Ok(self.report(instant)),
        }
    }

    fn report(&self, planned: DateTime<Utc>) -> WaitReport {
        let achieved = self.clock.now();
        WaitReport {
            planned,
            achieved,
            drift_ms: drift_ms(planned, achieved),
        }
    }
}

/// Signed `actual - planned` in fractional milliseconds.
pub fn drift_ms(planned: DateTime<Utc>, actual: DateTime<Utc>) -> f64 {
    let delta = actual - planned;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000.0,
        None => delta.num_milliseconds() as f64,
    }
}
