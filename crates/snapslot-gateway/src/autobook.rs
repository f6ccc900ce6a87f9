use chrono::{DateTime, Utc};
use tracing::{info, warn};

use snapslot_core::{classes::ClassCatalog, types::Timezone};
use snapslot_scheduler::{Acknowledgement, Orchestrator, SchedulerError, SubmitRequest};

/// Submit today's class (by local weekday) at its booking time.
///
/// Returns `None` when no active class is due today.
pub fn book_today(
    orchestrator: &Orchestrator,
    catalog: &ClassCatalog,
    timezone: Timezone,
    now: DateTime<Utc>,
) -> Option<Result<Acknowledgement, SchedulerError>> {
    let weekday = timezone.local_weekday(now);
    let Some(class) = catalog.due_on(weekday) else {
        info!(?weekday, "no class due today; nothing to auto-book");
        return None;
    };

    let req = SubmitRequest {
        resource_id: class.name.clone(),
        target_date: timezone.local_date(now).format("%Y-%m-%d").to_string(),
        target_time: class.booking_time.format("%H:%M:%S").to_string(),
        timezone: Some(timezone.to_string()),
    };

    let result = orchestrator.submit(req);
    match &result {
        Ok(ack) => info!(
            class = %class.name,
            run_id = %ack.run_id,
            execution = %ack.planned_execution_instant.to_rfc3339(),
            "auto-booking scheduled"
        ),
        Err(e) => warn!(class = %class.name, error = %e, code = e.code(), "auto-booking not scheduled"),
    }
    Some(result)
}
