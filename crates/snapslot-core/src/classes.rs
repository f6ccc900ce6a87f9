//! Static class catalog loaded from the `[[classes]]` config section.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// One recurring class the gateway knows how to book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub id: String,
    /// Exact label shown on the booking site, used as the resource identifier.
    pub name: String,
    /// Day of the week the booking is made on.
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    /// Local time at which booking opens.
    pub booking_time: NaiveTime,
    #[serde(default = "bool_true")]
    pub active: bool,
}

fn bool_true() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
    entries: Vec<ClassEntry>,
}

impl ClassCatalog {
    pub fn new(entries: Vec<ClassEntry>) -> Self {
        Self { entries }
    }

    pub fn active(&self) -> Vec<&ClassEntry> {
        self.entries.iter().filter(|c| c.active).collect()
    }

    /// Exact-name lookup; inactive entries are invisible.
    pub fn by_name(&self, name: &str) -> Option<&ClassEntry> {
        self.entries.iter().find(|c| c.active && c.name == name)
    }

    pub fn by_id(&self, id: &str) -> Option<&ClassEntry> {
        self.entries.iter().find(|c| c.active && c.id == id)
    }

    /// First active class whose booking falls on `weekday`.
    pub fn due_on(&self, weekday: Weekday) -> Option<&ClassEntry> {
        self.entries.iter().find(|c| c.active && c.weekday == weekday)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
