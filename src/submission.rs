//! Fan event submissions: validation, duplicate detection and pending
//! artist/venue creation.

use std::{fmt, sync::Arc};

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use futures::future::{join, try_join};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::dates::parse_timestamp;
use crate::models::{
    optional_text, Artist, Event, EventReport, IssueType, PendingArtist, PendingEvent,
    PendingVenue, SourceType, Venue,
};
use crate::normalize::{normalize_key, normalize_state};
use crate::scrape::ScrapedEvent;
use crate::store::{DayQuery, EventCatalog, StoreError, StoreResult, SubmissionStore};

const SUGGESTION_LIMIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    StartDate,
    Artist,
    Venue,
    Location,
    Name,
    Event,
    IssueType,
    Description,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Field::Title => "title",
            Field::StartDate => "start date",
            Field::Artist => "artist",
            Field::Venue => "venue",
            Field::Location => "city and state",
            Field::Name => "name",
            Field::Event => "event",
            Field::IssueType => "issue type",
            Field::Description => "description",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("missing {0}")]
    Missing(Field),
    #[error("event already listed or pending at this venue on that date")]
    Duplicate(Option<Box<DuplicateMatch>>),
    #[error("invalid date or time: {0}")]
    InvalidDate(String),
    #[error("{0}")]
    InvalidIssueType(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateSource {
    Approved,
    Pending,
}

/// An existing listing that collides with a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub id: String,
    pub title: String,
    pub venue_name: String,
    pub start_datetime: Option<String>,
    pub city: String,
    pub state: String,
    pub description: Option<String>,
    pub source: DuplicateSource,
}

impl DuplicateMatch {
    fn from_event(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            venue_name: event.venue_name.clone().unwrap_or_default(),
            start_datetime: event.start_datetime.clone(),
            city: event.city.clone(),
            state: event.state.clone(),
            description: event.description.clone(),
            source: DuplicateSource::Approved,
        }
    }

    fn from_pending(event: &PendingEvent) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            venue_name: event.venue_name.clone(),
            start_datetime: event.start_datetime.clone(),
            city: event.city.clone(),
            state: event.state.clone(),
            description: event.description.clone(),
            source: DuplicateSource::Pending,
        }
    }
}

/// An artist or venue picked from the typeahead, either already approved or
/// still awaiting review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LookupChoice {
    Approved { id: String, name: String },
    Pending { id: String, name: String },
}

impl LookupChoice {
    fn approved_id(choice: &Option<LookupChoice>) -> Option<String> {
        match choice {
            Some(LookupChoice::Approved { id, .. }) => Some(id.clone()),
            _ => None,
        }
    }

    fn pending_id(choice: &Option<LookupChoice>) -> Option<String> {
        match choice {
            Some(LookupChoice::Pending { id, .. }) => Some(id.clone()),
            _ => None,
        }
    }
}

/// The submission form. Dates are `YYYY-MM-DD`, times `HH:MM`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionDraft {
    pub title: String,
    pub start_date: String,
    pub start_time: String,
    pub end_time: String,
    pub artist_name: String,
    pub artist: Option<LookupChoice>,
    pub venue_name: String,
    pub venue: Option<LookupChoice>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub description: String,
    pub ticket_url: String,
    pub image_url: String,
    /// The link the form was scraped from, if any.
    pub link_url: String,
}

impl SubmissionDraft {
    /// Prefills a draft from a scraped link. The start is split into a date
    /// and time in `tz`.
    pub fn from_scraped(link_url: &str, scraped: &ScrapedEvent, tz: Tz) -> Self {
        let (start_date, start_time) = scraped
            .start_datetime
            .as_deref()
            .and_then(parse_timestamp)
            .map(|dt| {
                let local = dt.with_timezone(&tz);
                (
                    local.format("%Y-%m-%d").to_string(),
                    local.format("%H:%M").to_string(),
                )
            })
            .unwrap_or_default();

        Self {
            title: scraped.title.clone(),
            start_date,
            start_time,
            venue_name: scraped.venue_name.clone(),
            address: scraped.address.clone(),
            city: scraped.city.clone(),
            state: scraped.state.clone(),
            postal_code: scraped.postal_code.clone(),
            description: scraped.description.clone(),
            ticket_url: scraped.ticket_url.clone(),
            image_url: scraped.image_url.clone(),
            link_url: link_url.trim().to_string(),
            ..Self::default()
        }
    }

    /// Checks required fields in form order, then the date and times.
    pub fn validate(&self) -> Result<(), SubmissionError> {
        if self.title.trim().is_empty() {
            return Err(SubmissionError::Missing(Field::Title));
        }
        if self.start_date.trim().is_empty() {
            return Err(SubmissionError::Missing(Field::StartDate));
        }
        if self.artist_name.trim().is_empty() {
            return Err(SubmissionError::Missing(Field::Artist));
        }
        if self.venue_name.trim().is_empty() {
            return Err(SubmissionError::Missing(Field::Venue));
        }
        if self.city.trim().is_empty() || self.state.trim().is_empty() {
            return Err(SubmissionError::Missing(Field::Location));
        }

        NaiveDate::parse_from_str(self.start_date.trim(), "%Y-%m-%d")
            .map_err(|_| SubmissionError::InvalidDate(self.start_date.clone()))?;
        for time in [&self.start_time, &self.end_time] {
            let time = time.trim();
            if !time.is_empty() && NaiveTime::parse_from_str(time, "%H:%M").is_err() {
                return Err(SubmissionError::InvalidDate(time.to_string()));
            }
        }
        Ok(())
    }

    /// `date T time:00`, midnight when no time was given.
    pub fn start_datetime(&self) -> String {
        let time = self.start_time.trim();
        if time.is_empty() {
            format!("{}T00:00:00", self.start_date.trim())
        } else {
            format!("{}T{}:00", self.start_date.trim(), time)
        }
    }

    pub fn end_datetime(&self) -> Option<String> {
        let time = self.end_time.trim();
        (!time.is_empty()).then(|| format!("{}T{}:00", self.start_date.trim(), time))
    }

    pub fn to_pending(&self, created_by: Option<&str>) -> PendingEvent {
        let link = optional_text(&self.link_url);
        PendingEvent {
            title: self.title.trim().to_string(),
            start_datetime: Some(self.start_datetime()),
            end_datetime: self.end_datetime(),
            artist_name: optional_text(&self.artist_name),
            artist_id: LookupChoice::approved_id(&self.artist),
            pending_artist_id: LookupChoice::pending_id(&self.artist),
            venue_name: self.venue_name.trim().to_string(),
            venue_id: LookupChoice::approved_id(&self.venue),
            pending_venue_id: LookupChoice::pending_id(&self.venue),
            address: optional_text(&self.address),
            city: self.city.trim().to_string(),
            state: normalize_state(&self.state),
            postal_code: optional_text(&self.postal_code),
            description: optional_text(&self.description),
            ticket_url: optional_text(&self.ticket_url),
            image_url: optional_text(&self.image_url),
            source_type: if link.is_some() {
                SourceType::Link
            } else {
                SourceType::Manual
            },
            source_url: link,
            created_by: created_by.map(str::to_string),
            ..PendingEvent::default()
        }
    }
}

/// Artists and venues offered by the typeahead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Lookups {
    pub artists: Vec<Artist>,
    pub venues: Vec<Venue>,
}

/// The "report incorrect information" form on an event page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportDraft {
    pub event_id: String,
    pub issue_type: String,
    pub description: String,
    pub email: String,
}

impl ReportDraft {
    pub fn to_report(&self) -> Result<EventReport, SubmissionError> {
        if self.event_id.trim().is_empty() {
            return Err(SubmissionError::Missing(Field::Event));
        }
        if self.issue_type.trim().is_empty() {
            return Err(SubmissionError::Missing(Field::IssueType));
        }
        if self.description.trim().is_empty() {
            return Err(SubmissionError::Missing(Field::Description));
        }
        let issue_type = self
            .issue_type
            .parse::<IssueType>()
            .map_err(SubmissionError::InvalidIssueType)?;
        Ok(EventReport {
            id: String::new(),
            event_id: self.event_id.trim().to_string(),
            issue_type,
            description: self.description.trim().to_string(),
            email: optional_text(&self.email),
            created_at: None,
        })
    }
}

/// Up to eight items whose normalized name contains the normalized query.
/// A blank query returns the first eight.
pub fn suggest<'a, T>(items: &'a [T], query: &str, name: impl Fn(&T) -> &str) -> Vec<&'a T> {
    let query = normalize_key(query);
    items
        .iter()
        .filter(|item| query.is_empty() || normalize_key(name(*item)).contains(&query))
        .take(SUGGESTION_LIMIT)
        .collect()
}

/// True for a blank query or when some item's normalized name equals it.
pub fn has_exact_match<T>(items: &[T], query: &str, name: impl Fn(&T) -> &str) -> bool {
    let query = normalize_key(query);
    query.is_empty() || items.iter().any(|item| normalize_key(name(item)) == query)
}

#[derive(Clone)]
pub struct SubmissionService {
    catalog: Arc<dyn EventCatalog>,
    store: Arc<dyn SubmissionStore>,
}

impl SubmissionService {
    pub fn new(catalog: Arc<dyn EventCatalog>, store: Arc<dyn SubmissionStore>) -> Self {
        Self { catalog, store }
    }

    /// Loads the typeahead lists. A failed list is logged and left empty.
    pub async fn lookups(&self) -> Lookups {
        let (artists, venues) = join(self.store.list_artists(), self.store.list_venues()).await;
        Lookups {
            artists: artists.unwrap_or_else(|err| {
                warn!(error = %err, "artist lookup failed");
                Vec::new()
            }),
            venues: venues.unwrap_or_else(|err| {
                warn!(error = %err, "venue lookup failed");
                Vec::new()
            }),
        }
    }

    /// Looks for an approved or pending event with the same normalized title
    /// and venue on `day`, optionally narrowed to a city and state.
    pub async fn find_duplicate(
        &self,
        title: &str,
        venue_name: &str,
        day: &str,
        city: Option<&str>,
        state: Option<&str>,
    ) -> StoreResult<Option<DuplicateMatch>> {
        let title_key = normalize_key(title);
        let venue_key = normalize_key(venue_name);
        let day = day.trim();
        if title_key.is_empty() || venue_key.is_empty() || day.is_empty() {
            return Ok(None);
        }

        let query = DayQuery {
            venue_name: venue_name.trim().to_string(),
            day: day.to_string(),
            city: city.and_then(optional_text),
            state: state.map(normalize_state).filter(|s| !s.is_empty()),
        };
        let (approved, pending) = try_join(
            self.catalog.approved_events_on_day(&query),
            self.store.pending_events_on_day(&query),
        )
        .await?;

        Ok(approved
            .iter()
            .map(DuplicateMatch::from_event)
            .chain(pending.iter().map(DuplicateMatch::from_pending))
            .find(|m| normalize_key(&m.title) == title_key && normalize_key(&m.venue_name) == venue_key))
    }

    pub async fn check_for_duplicates(
        &self,
        draft: &SubmissionDraft,
    ) -> StoreResult<Option<DuplicateMatch>> {
        self.find_duplicate(
            &draft.title,
            &draft.venue_name,
            &draft.start_date,
            Some(&draft.city),
            Some(&draft.state),
        )
        .await
    }

    /// Validates the draft and queues it for moderation.
    #[instrument(skip(self, draft), fields(title = %draft.title, venue = %draft.venue_name))]
    pub async fn submit(
        &self,
        draft: &SubmissionDraft,
        created_by: Option<&str>,
    ) -> Result<PendingEvent, SubmissionError> {
        draft.validate()?;

        match self.check_for_duplicates(draft).await {
            Ok(Some(found)) => return Err(SubmissionError::Duplicate(Some(Box::new(found)))),
            Ok(None) => {}
            // the store's unique constraint still guards the insert
            Err(err) => warn!(error = %err, "duplicate check failed"),
        }

        match self.store.insert_pending_event(draft.to_pending(created_by)).await {
            Ok(stored) => {
                info!(id = %stored.id, "submission queued for review");
                Ok(stored)
            }
            Err(StoreError::Duplicate) => {
                let found = self.check_for_duplicates(draft).await.ok().flatten();
                Err(SubmissionError::Duplicate(found.map(Box::new)))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_pending_artist(
        &self,
        artist: PendingArtist,
    ) -> Result<PendingArtist, SubmissionError> {
        let name = artist.name.trim().to_string();
        if name.is_empty() {
            return Err(SubmissionError::Missing(Field::Name));
        }
        let cleaned = PendingArtist {
            id: String::new(),
            name,
            genre: artist.genre.as_deref().and_then(optional_text),
            hometown: artist.hometown.as_deref().and_then(optional_text),
            contact_email: artist.contact_email.as_deref().and_then(optional_text),
            bio: artist.bio.as_deref().and_then(optional_text),
            status: Default::default(),
        };
        Ok(self.store.insert_pending_artist(cleaned).await?)
    }

    pub async fn create_pending_venue(
        &self,
        venue: PendingVenue,
    ) -> Result<PendingVenue, SubmissionError> {
        let name = venue.name.trim().to_string();
        if name.is_empty() {
            return Err(SubmissionError::Missing(Field::Name));
        }
        let cleaned = PendingVenue {
            id: String::new(),
            name,
            city: venue.city.as_deref().and_then(optional_text),
            state: venue
                .state
                .as_deref()
                .map(normalize_state)
                .filter(|s| !s.is_empty()),
            address: venue.address.as_deref().and_then(optional_text),
            contact_email: venue.contact_email.as_deref().and_then(optional_text),
            capacity: venue.capacity,
            status: Default::default(),
        };
        Ok(self.store.insert_pending_venue(cleaned).await?)
    }

    #[instrument(skip(self, draft), fields(event_id = %draft.event_id))]
    pub async fn report_event(&self, draft: &ReportDraft) -> Result<EventReport, SubmissionError> {
        let report = draft.to_report()?;
        let stored = self.store.insert_event_report(report).await?;
        info!(report_id = %stored.id, issue = stored.issue_type.as_str(), "event report filed");
        Ok(stored)
    }
}
