//! Timing plan derivation and request validation. Pure functions: no I/O,
//! no suspension, deterministic for a given `now`.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use snapslot_core::types::Timezone;

use crate::error::{Result, SchedulerError};
use crate::types::{PlanRejection, ScheduleRequest, SubmitRequest, TimingPlan};

/// Preparation begins this long before the target instant.
pub const PREPARATION_LEAD_SECS: i64 = 60;
/// The commit fires this long after the target, never before it.
pub const EXECUTION_EPSILON_MS: i64 = 1;
/// Longest wait before preparation a plan accepts.
pub const MAX_PLAN_HORIZON_SECS: f64 = 24.0 * 3600.0;
/// Booking policy window enforced on submissions, independent of the plan horizon.
pub const MAX_BOOKING_DAYS_AHEAD: i64 = 7;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Derive the preparation and execution instants for `target` as seen from `now`.
///
/// The returned plan is always fully populated; `feasible` is false when any
/// rule fails and `reason` names the first failing rule.
pub fn compute_plan(target: DateTime<Utc>, now: DateTime<Utc>) -> TimingPlan {
    let preparation_instant = target - Duration::seconds(PREPARATION_LEAD_SECS);
    let execution_instant = target + Duration::milliseconds(EXECUTION_EPSILON_MS);

    let wait_to_preparation_secs = seconds_between(now, preparation_instant);
    let wait_to_execution_secs = seconds_between(now, execution_instant);

    let rejection = if preparation_instant <= now {
        Some(PlanRejection::PreparationPassed)
    } else if execution_instant <= now {
        Some(PlanRejection::TargetPassed)
    } else if wait_to_preparation_secs > MAX_PLAN_HORIZON_SECS {
        Some(PlanRejection::TooFarAhead)
    } else {
        None
    };

    let reason = match rejection {
        None => "timing valid".to_string(),
        Some(PlanRejection::PreparationPassed) => format!(
            "preparation window already passed (preparation {}, now {})",
            preparation_instant.to_rfc3339(),
            now.to_rfc3339()
        ),
        Some(PlanRejection::TargetPassed) => format!(
            "target already passed (target {}, now {})",
            target.to_rfc3339(),
            now.to_rfc3339()
        ),
        Some(PlanRejection::TooFarAhead) => format!(
            "target too far in the future: wait too long ({:.1} h, max {:.0} h)",
            wait_to_preparation_secs / 3600.0,
            MAX_PLAN_HORIZON_SECS / 3600.0
        ),
    };

    TimingPlan {
        target_instant: target,
        preparation_instant,
        execution_instant,
        wait_to_preparation_secs,
        wait_to_execution_secs,
        feasible: rejection.is_none(),
        reason,
        rejection,
    }
}

/// Plan for a booking that runs now: every instant is `now`, nothing to wait for.
pub fn immediate_plan(now: DateTime<Utc>) -> TimingPlan {
    TimingPlan {
        target_instant: now,
        preparation_instant: now,
        execution_instant: now,
        wait_to_preparation_secs: 0.0,
        wait_to_execution_secs: 0.0,
        feasible: true,
        reason: "immediate execution".to_string(),
        rejection: None,
    }
}

/// Parse and range-check a raw submission.
///
/// Format problems are collected and reported together. When date, time and
/// timezone all parse, the target must lie no later than `now + 7 days`.
/// A target at or before `now` passes here and is refused by [`compute_plan`].
pub fn validate_request(
    raw: &SubmitRequest,
    default_timezone: Timezone,
    now: DateTime<Utc>,
) -> Result<ScheduleRequest> {
    let mut errors: Vec<String> = Vec::new();

    let resource_id = raw.resource_id.trim();
    if resource_id.is_empty() {
        errors.push("resource_id must not be empty".to_string());
    }

    let date = NaiveDate::parse_from_str(raw.target_date.trim(), DATE_FORMAT)
        .map_err(|_| {
            errors.push(format!(
                "invalid date format: {} (use YYYY-MM-DD)",
                raw.target_date
            ))
        })
        .ok();

    let time = NaiveTime::parse_from_str(raw.target_time.trim(), TIME_FORMAT)
        .map_err(|_| {
            errors.push(format!(
                "invalid time format: {} (use HH:MM:SS)",
                raw.target_time
            ))
        })
        .ok();

    let timezone = match raw.timezone.as_deref() {
        None => Some(default_timezone),
        Some(s) => s.parse::<Timezone>().map_err(|e| errors.push(e.to_string())).ok(),
    };

    if let (Some(date), Some(time), Some(timezone)) = (date, time, timezone) {
        let target = timezone.to_utc(date, time);
        let latest = now + Duration::days(MAX_BOOKING_DAYS_AHEAD);
        if target > latest {
            errors.push(format!(
                "target cannot be more than {MAX_BOOKING_DAYS_AHEAD} days ahead (latest {})",
                latest.to_rfc3339()
            ));
        }

        if errors.is_empty() {
            return Ok(ScheduleRequest {
                resource_id: resource_id.to_string(),
                target_date: date,
                target_time: time,
                timezone,
            });
        }
    }

    Err(SchedulerError::InvalidRequest(errors.join("; ")))
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}
