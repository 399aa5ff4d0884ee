use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    CityDirectory, DayQuery, EventCatalog, EventQuery, ModerationStore, StoreError, StoreResult,
    SubmissionStore,
};
use crate::models::{
    optional_text, Artist, City, Event, EventEdit, EventReport, EventStatus, PendingArtist,
    PendingEvent, PendingVenue, Role, Venue,
};
use crate::normalize::{city_key, normalize_key};
use crate::utils;

#[derive(Default)]
struct Tables {
    cities: Vec<City>,
    events: Vec<Event>,
    pending: Vec<PendingEvent>,
    artists: Vec<Artist>,
    venues: Vec<Venue>,
    pending_artists: Vec<PendingArtist>,
    pending_venues: Vec<PendingVenue>,
    reports: Vec<EventReport>,
    roles: HashMap<String, Role>,
}

/// In-process store with call counters, injectable failures and per-state
/// fetch latency. Useful for tests and offline runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    city_lookups: AtomicU64,
    event_fetches: AtomicU64,
    fail_city_lookups: AtomicBool,
    fail_event_fetches: AtomicBool,
    fetch_delays: Mutex<HashMap<String, Duration>>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".into()))
    }

    fn next_id(&self, kind: &str, key: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        utils::stable_id(&[kind, key, &seq.to_string()])
    }

    pub fn with_city(self, city: City) -> Self {
        self.add_city(city);
        self
    }

    pub fn with_event(self, event: Event) -> Self {
        self.add_event(event);
        self
    }

    pub fn add_city(&self, city: City) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.cities.push(city);
        }
    }

    pub fn add_event(&self, event: Event) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.events.push(event);
        }
    }

    pub fn with_artist(self, artist: Artist) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.artists.push(artist);
        }
        self
    }

    pub fn with_venue(self, venue: Venue) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.venues.push(venue);
        }
        self
    }

    pub fn with_role(self, user_id: &str, role: Role) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            tables.roles.insert(user_id.to_string(), role);
        }
        self
    }

    /// Delays event fetches filtered to `state`. An empty state delays the
    /// unfiltered fetch.
    pub fn with_fetch_delay(self, state: &str, delay: Duration) -> Self {
        if let Ok(mut delays) = self.fetch_delays.lock() {
            delays.insert(state.to_string(), delay);
        }
        self
    }

    pub fn city_lookups(&self) -> u64 {
        self.city_lookups.load(Ordering::SeqCst)
    }

    pub fn event_fetches(&self) -> u64 {
        self.event_fetches.load(Ordering::SeqCst)
    }

    pub fn fail_city_lookups(&self, fail: bool) {
        self.fail_city_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn fail_event_fetches(&self, fail: bool) {
        self.fail_event_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn pending_artists(&self) -> Vec<PendingArtist> {
        self.tables
            .lock()
            .map(|t| t.pending_artists.clone())
            .unwrap_or_default()
    }

    pub fn pending_venues(&self) -> Vec<PendingVenue> {
        self.tables
            .lock()
            .map(|t| t.pending_venues.clone())
            .unwrap_or_default()
    }

    pub fn event_reports(&self) -> Vec<EventReport> {
        self.tables
            .lock()
            .map(|t| t.reports.clone())
            .unwrap_or_default()
    }

    fn fetch_delay(&self, state: Option<&str>) -> Option<Duration> {
        let delays = self.fetch_delays.lock().ok()?;
        delays.get(state.unwrap_or_default()).copied()
    }
}

fn pending_key(event: &PendingEvent) -> (String, String, String) {
    (
        normalize_key(&event.title),
        normalize_key(&event.venue_name),
        event
            .start_datetime
            .as_deref()
            .and_then(|s| s.get(..10))
            .unwrap_or_default()
            .to_string(),
    )
}

#[async_trait]
impl CityDirectory for MemoryStore {
    async fn find_city(&self, state: &str, city_fragment: &str) -> StoreResult<Option<City>> {
        self.city_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_city_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("city lookup failed".into()));
        }
        let fragment = city_key(city_fragment);
        let tables = self.tables()?;
        Ok(tables
            .cities
            .iter()
            .find(|c| c.state == state && city_key(&c.city_name).contains(&fragment))
            .cloned())
    }

    async fn list_cities(&self) -> StoreResult<Vec<City>> {
        let mut cities = self.tables()?.cities.clone();
        cities.sort_by(|a, b| {
            a.state
                .cmp(&b.state)
                .then_with(|| a.city_name.cmp(&b.city_name))
        });
        Ok(cities)
    }
}

#[async_trait]
impl EventCatalog for MemoryStore {
    async fn events(&self, query: &EventQuery) -> StoreResult<Vec<Event>> {
        self.event_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay(query.state.as_deref()) {
            tokio::time::sleep(delay).await;
        }
        if self.fail_event_fetches.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("event fetch failed".into()));
        }

        let tables = self.tables()?;
        let mut events: Vec<Event> = tables
            .events
            .iter()
            .filter(|e| e.status == query.status)
            .filter(|e| query.state.as_deref().map_or(true, |s| e.state == s))
            .cloned()
            .collect();
        // missing starts sort last, like `ORDER BY start_datetime IS NULL, start_datetime`
        events.sort_by(|a, b| match (&a.start_datetime, &b.start_datetime) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(events)
    }

    async fn approved_event(&self, id: &str) -> StoreResult<Option<Event>> {
        let tables = self.tables()?;
        Ok(tables
            .events
            .iter()
            .find(|e| e.id == id && e.status == EventStatus::Approved)
            .cloned())
    }

    async fn approved_events_on_day(&self, query: &DayQuery) -> StoreResult<Vec<Event>> {
        let tables = self.tables()?;
        Ok(tables
            .events
            .iter()
            .filter(|e| e.status == EventStatus::Approved)
            .filter(|e| {
                query.matches(
                    e.venue_name.as_deref().unwrap_or_default(),
                    e.start_datetime.as_deref(),
                    &e.city,
                    &e.state,
                )
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn pending_events_on_day(&self, query: &DayQuery) -> StoreResult<Vec<PendingEvent>> {
        let tables = self.tables()?;
        Ok(tables
            .pending
            .iter()
            .filter(|e| e.status == EventStatus::Pending)
            .filter(|e| {
                query.matches(
                    &e.venue_name,
                    e.start_datetime.as_deref(),
                    &e.city,
                    &e.state,
                )
            })
            .cloned()
            .collect())
    }

    async fn insert_pending_event(&self, event: PendingEvent) -> StoreResult<PendingEvent> {
        let mut event = event;
        let key = pending_key(&event);
        let mut tables = self.tables()?;
        if tables.pending.iter().any(|p| pending_key(p) == key) {
            return Err(StoreError::Duplicate);
        }
        if event.id.is_empty() {
            event.id = self.next_id("event", &key.0);
        }
        event.status = EventStatus::Pending;
        event.created_at = Some(Utc::now().to_rfc3339());
        tables.pending.push(event.clone());
        Ok(event)
    }

    async fn list_artists(&self) -> StoreResult<Vec<Artist>> {
        let mut artists = self.tables()?.artists.clone();
        artists.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artists)
    }

    async fn list_venues(&self) -> StoreResult<Vec<Venue>> {
        let mut venues = self.tables()?.venues.clone();
        venues.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(venues)
    }

    async fn insert_pending_artist(&self, artist: PendingArtist) -> StoreResult<PendingArtist> {
        let mut artist = artist;
        if artist.id.is_empty() {
            artist.id = self.next_id("artist", &normalize_key(&artist.name));
        }
        artist.status = EventStatus::Pending;
        self.tables()?.pending_artists.push(artist.clone());
        Ok(artist)
    }

    async fn insert_pending_venue(&self, venue: PendingVenue) -> StoreResult<PendingVenue> {
        let mut venue = venue;
        if venue.id.is_empty() {
            venue.id = self.next_id("venue", &normalize_key(&venue.name));
        }
        venue.status = EventStatus::Pending;
        self.tables()?.pending_venues.push(venue.clone());
        Ok(venue)
    }

    async fn insert_event_report(&self, report: EventReport) -> StoreResult<EventReport> {
        let mut report = report;
        if report.id.is_empty() {
            report.id = self.next_id("report", &report.event_id);
        }
        report.created_at = Some(Utc::now().to_rfc3339());
        self.tables()?.reports.push(report.clone());
        Ok(report)
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn role_for(&self, user_id: &str) -> StoreResult<Option<Role>> {
        Ok(self.tables()?.roles.get(user_id).copied())
    }

    async fn pending_queue(&self) -> StoreResult<Vec<PendingEvent>> {
        let tables = self.tables()?;
        // insertion order breaks ties between equal timestamps
        let mut queue: Vec<(usize, PendingEvent)> = tables
            .pending
            .iter()
            .cloned()
            .enumerate()
            .filter(|(_, e)| e.status == EventStatus::Pending)
            .collect();
        queue.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(queue.into_iter().map(|(_, e)| e).collect())
    }

    async fn approve_pending(&self, id: &str) -> StoreResult<Event> {
        let mut tables = self.tables()?;
        let pending = tables
            .pending
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("pending event {id}")))?;
        pending.status = EventStatus::Approved;
        let event = pending.to_approved_event();
        tables.events.retain(|e| e.id != event.id);
        tables.events.push(event.clone());
        Ok(event)
    }

    async fn reject_pending(&self, id: &str) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let pending = tables
            .pending
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("pending event {id}")))?;
        pending.status = EventStatus::Rejected;
        Ok(())
    }

    async fn update_pending(&self, id: &str, edit: &EventEdit) -> StoreResult<PendingEvent> {
        let mut tables = self.tables()?;
        let pending = tables
            .pending
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("pending event {id}")))?;
        pending.title = edit.title.trim().to_string();
        pending.start_datetime = Some(edit.start_datetime());
        pending.venue_name = edit.venue_name.trim().to_string();
        pending.address = optional_text(&edit.address);
        pending.city = edit.city.trim().to_string();
        pending.state = edit.state.trim().to_uppercase();
        pending.postal_code = optional_text(&edit.postal_code);
        pending.description = optional_text(&edit.description);
        pending.ticket_url = optional_text(&edit.ticket_url);
        pending.image_url = optional_text(&edit.image_url);
        Ok(pending.clone())
    }
}
