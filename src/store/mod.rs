//! The hosted data store as seen by this crate.
//!
//! Each concern the application needs from the store is a small async trait;
//! [`SqliteStore`] and [`MemoryStore`] implement all of them.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Artist, City, Event, EventEdit, EventReport, EventStatus, PendingArtist, PendingEvent,
    PendingVenue, Role, Venue,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("duplicate row violates a unique constraint")]
    Duplicate,
    #[error("row not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("background task failed: {0}")]
    Task(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Predicates for the event listing fetch. Results are always ordered by
/// `start_datetime` ascending with missing starts last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub status: EventStatus,
    pub state: Option<String>,
}

impl EventQuery {
    pub fn approved() -> Self {
        Self {
            status: EventStatus::Approved,
            state: None,
        }
    }

    pub fn in_state(mut self, state: &str) -> Self {
        self.state = Some(state.to_string());
        self
    }
}

/// Same-venue, same-day lookup used by duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DayQuery {
    /// Matched case-insensitively against the whole venue name.
    pub venue_name: String,
    /// `YYYY-MM-DD`, compared against the date prefix of `start_datetime`.
    pub day: String,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl DayQuery {
    pub(crate) fn matches(
        &self,
        venue_name: &str,
        start_datetime: Option<&str>,
        city: &str,
        state: &str,
    ) -> bool {
        if !venue_name.trim().eq_ignore_ascii_case(self.venue_name.trim()) {
            return false;
        }
        if start_datetime.and_then(|s| s.get(..10)) != Some(self.day.as_str()) {
            return false;
        }
        if let Some(wanted) = &self.city {
            if !city.trim().eq_ignore_ascii_case(wanted.trim()) {
                return false;
            }
        }
        if let Some(wanted) = &self.state {
            if state != wanted {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait CityDirectory: Send + Sync {
    /// First city in `state` whose name contains `city_fragment`. Both sides
    /// are compared by [`city_key`](crate::normalize::city_key), so case and
    /// periods do not matter.
    async fn find_city(&self, state: &str, city_fragment: &str) -> StoreResult<Option<City>>;

    /// Every city, ordered by state then name.
    async fn list_cities(&self) -> StoreResult<Vec<City>>;
}

#[async_trait]
pub trait EventCatalog: Send + Sync {
    async fn events(&self, query: &EventQuery) -> StoreResult<Vec<Event>>;

    /// One event by id, only if it is approved.
    async fn approved_event(&self, id: &str) -> StoreResult<Option<Event>>;

    /// Approved events at a venue on a given day.
    async fn approved_events_on_day(&self, query: &DayQuery) -> StoreResult<Vec<Event>>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Pending submissions at a venue on a given day.
    async fn pending_events_on_day(&self, query: &DayQuery) -> StoreResult<Vec<PendingEvent>>;

    /// Inserts a submission and returns it with its assigned id.
    /// Fails with [`StoreError::Duplicate`] when the same title, venue and day
    /// were already submitted.
    async fn insert_pending_event(&self, event: PendingEvent) -> StoreResult<PendingEvent>;

    async fn list_artists(&self) -> StoreResult<Vec<Artist>>;

    async fn list_venues(&self) -> StoreResult<Vec<Venue>>;

    async fn insert_pending_artist(&self, artist: PendingArtist) -> StoreResult<PendingArtist>;

    async fn insert_pending_venue(&self, venue: PendingVenue) -> StoreResult<PendingVenue>;

    async fn insert_event_report(&self, report: EventReport) -> StoreResult<EventReport>;
}

#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn role_for(&self, user_id: &str) -> StoreResult<Option<Role>>;

    /// Pending submissions, newest first.
    async fn pending_queue(&self) -> StoreResult<Vec<PendingEvent>>;

    /// Publishes a submission into the searchable events and marks it approved.
    async fn approve_pending(&self, id: &str) -> StoreResult<Event>;

    async fn reject_pending(&self, id: &str) -> StoreResult<()>;

    async fn update_pending(&self, id: &str, edit: &EventEdit) -> StoreResult<PendingEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_query_matches_prefix_and_venue() {
        let query = DayQuery {
            venue_name: "The Pageant".to_string(),
            day: "2030-05-01".to_string(),
            city: None,
            state: Some("MO".to_string()),
        };
        assert!(query.matches("the pageant ", Some("2030-05-01T20:00:00"), "St. Louis", "MO"));
        assert!(!query.matches("The Pageant", Some("2030-05-02T20:00:00"), "St. Louis", "MO"));
        assert!(!query.matches("The Pageant", None, "St. Louis", "MO"));
        assert!(!query.matches("The Pageant", Some("2030-05-01T20:00:00"), "St. Louis", "IL"));
        assert!(!query.matches("Pageant", Some("2030-05-01T20:00:00"), "St. Louis", "MO"));
    }
}
