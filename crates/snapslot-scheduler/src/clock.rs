use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;

/// Wall-clock source plus the ability to sleep until an absolute instant.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Resolve once `now() >= deadline`. Returns immediately for past deadlines.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Real time: `Utc::now()` and a single Tokio timer per wait, no polling.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        if let Ok(wait) = (deadline - Utc::now()).to_std() {
            tokio::time::sleep(wait).await;
        }
    }
}

/// Controllable clock for tests and dry runs.
///
/// In auto-advance mode every `sleep_until` jumps the clock forward to its
/// deadline. In held mode sleepers park until [`ManualClock::advance`] or
/// [`ManualClock::set`] moves time past their deadline.
#[derive(Debug)]
pub struct ManualClock {
    now: watch::Sender<DateTime<Utc>>,
    auto_advance: bool,
}

impl ManualClock {
    pub fn auto(start: DateTime<Utc>) -> Self {
        let (now, _) = watch::channel(start);
        Self {
            now,
            auto_advance: true,
        }
    }

    pub fn held(start: DateTime<Utc>) -> Self {
        let (now, _) = watch::channel(start);
        Self {
            now,
            auto_advance: false,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.send_modify(|t| *t += by);
    }

    /// Move to `instant`; moving backwards is ignored.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.now.send_if_modified(|t| {
            if *t < instant {
                *t = instant;
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        if self.auto_advance {
            self.set(deadline);
            tokio::task::yield_now().await;
            return;
        }
        let mut rx = self.now.subscribe();
        // The sender lives as long as `self`, so this only ends when time passes.
        let _ = rx.wait_for(|t| *t >= deadline).await;
    }
}
