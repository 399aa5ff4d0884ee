use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::geo;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in miles, `None` when either point is not finite.
    pub fn distance_to(&self, other: &Coordinate) -> Option<f64> {
        geo::distance_miles(self.lat, self.lng, other.lat, other.lng)
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

fn coordinate_from(lat: Option<f64>, lng: Option<f64>) -> Option<Coordinate> {
    match (lat, lng) {
        (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => {
            Some(Coordinate { lat, lng })
        }
        _ => None,
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(EventStatus::Pending),
            "approved" => Ok(EventStatus::Approved),
            "rejected" => Ok(EventStatus::Rejected),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// Where an event listing came from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Facebook,
    Eventbrite,
    Ticketmaster,
    Bandsintown,
    Songkick,
    #[default]
    Link,
    Manual,
}

impl SourceType {
    /// Tags a ticket or listing URL by the platform it points at.
    pub fn infer(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.contains("facebook.com") {
            SourceType::Facebook
        } else if lower.contains("eventbrite.com") {
            SourceType::Eventbrite
        } else if lower.contains("ticketmaster.com") || lower.contains("livenation.com") {
            SourceType::Ticketmaster
        } else if lower.contains("bandsintown.com") {
            SourceType::Bandsintown
        } else if lower.contains("songkick.com") {
            SourceType::Songkick
        } else {
            SourceType::Link
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Facebook => "facebook",
            SourceType::Eventbrite => "eventbrite",
            SourceType::Ticketmaster => "ticketmaster",
            SourceType::Bandsintown => "bandsintown",
            SourceType::Songkick => "songkick",
            SourceType::Link => "link",
            SourceType::Manual => "manual",
        }
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "facebook" => Ok(SourceType::Facebook),
            "eventbrite" => Ok(SourceType::Eventbrite),
            "ticketmaster" => Ok(SourceType::Ticketmaster),
            "bandsintown" => Ok(SourceType::Bandsintown),
            "songkick" => Ok(SourceType::Songkick),
            "link" => Ok(SourceType::Link),
            "manual" => Ok(SourceType::Manual),
            other => Err(format!("unknown source type: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct City {
    pub city_name: String,
    pub state: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl City {
    pub fn new(city_name: &str, state: &str, lat: f64, lng: f64) -> Self {
        Self {
            city_name: city_name.to_string(),
            state: state.to_string(),
            lat: Some(lat),
            lng: Some(lng),
        }
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        coordinate_from(self.lat, self.lng)
    }
}

/// An event row as exposed by the `events` table / event-card view.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Event {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub start_datetime: Option<String>,
    #[serde(default)]
    pub end_datetime: Option<String>,
    /// Legacy untyped date column, consulted when `start_datetime` is empty.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub venue_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub card_image_url: Option<String>,
    #[serde(default)]
    pub source_type: Option<SourceType>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Event {
    pub fn coordinate(&self) -> Option<Coordinate> {
        coordinate_from(self.lat, self.lng)
    }

    /// `start_datetime`, or the legacy `date` column when the former is blank.
    pub fn start_or_date(&self) -> Option<&str> {
        non_blank(self.start_datetime.as_deref()).or_else(|| non_blank(self.date.as_deref()))
    }

    pub fn card_image(&self) -> Option<&str> {
        non_blank(self.card_image_url.as_deref()).or_else(|| non_blank(self.image_url.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// An event annotated with its distance from the search center.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RankedEvent {
    #[serde(flatten)]
    pub event: Event,
    pub distance: Option<f64>,
}

/// A fan submission waiting in the moderation queue.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct PendingEvent {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub start_datetime: Option<String>,
    #[serde(default)]
    pub end_datetime: Option<String>,
    #[serde(default)]
    pub artist_name: Option<String>,
    #[serde(default)]
    pub artist_id: Option<String>,
    #[serde(default)]
    pub pending_artist_id: Option<String>,
    #[serde(default)]
    pub venue_name: String,
    #[serde(default)]
    pub venue_id: Option<String>,
    #[serde(default)]
    pub pending_venue_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl PendingEvent {
    /// The searchable event an approval publishes.
    pub fn to_approved_event(&self) -> Event {
        Event {
            id: self.id.clone(),
            title: self.title.clone(),
            start_datetime: self.start_datetime.clone(),
            end_datetime: self.end_datetime.clone(),
            date: None,
            city: self.city.clone(),
            state: self.state.clone(),
            lat: None,
            lng: None,
            status: EventStatus::Approved,
            venue_name: Some(self.venue_name.clone()),
            address: self.address.clone(),
            postal_code: self.postal_code.clone(),
            description: self.description.clone(),
            ticket_url: self.ticket_url.clone(),
            image_url: self.image_url.clone(),
            card_image_url: None,
            source_type: Some(self.source_type),
            source_url: self.source_url.clone(),
            artist_name: self.artist_name.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Admin edits applied to a pending event before it is approved.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct EventEdit {
    pub title: String,
    pub start_date: String,
    pub start_time: String,
    pub venue_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub description: String,
    pub ticket_url: String,
    pub image_url: String,
}

impl EventEdit {
    /// Prefills the edit form from a stored submission.
    pub fn from_pending(event: &PendingEvent) -> Self {
        let (start_date, start_time) = match event.start_datetime.as_deref() {
            Some(value) => match value.split_once('T') {
                Some((date, time)) => (date.to_string(), time.chars().take(5).collect()),
                None => (value.to_string(), String::new()),
            },
            None => (String::new(), String::new()),
        };

        Self {
            title: event.title.clone(),
            start_date,
            start_time,
            venue_name: event.venue_name.clone(),
            address: event.address.clone().unwrap_or_default(),
            city: event.city.clone(),
            state: event.state.clone(),
            postal_code: event.postal_code.clone().unwrap_or_default(),
            description: event.description.clone().unwrap_or_default(),
            ticket_url: event.ticket_url.clone().unwrap_or_default(),
            image_url: event.image_url.clone().unwrap_or_default(),
        }
    }

    pub fn start_datetime(&self) -> String {
        let time = self.start_time.trim();
        if time.is_empty() {
            format!("{}T00:00:00", self.start_date.trim())
        } else {
            format!("{}T{}:00", self.start_date.trim(), time)
        }
    }
}

/// Empty form fields are stored as NULL.
pub fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Venue {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct PendingArtist {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub hometown: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct PendingVenue {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
    #[serde(default)]
    pub status: EventStatus,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Fan,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Fan => "fan",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" | "super admin" | "super_admin" => Ok(Role::Admin),
            "fan" | "user" => Ok(Role::Fan),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// What a fan says is wrong with a listing.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    WrongDate,
    WrongVenue,
    Duplicate,
    Other,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::WrongDate => "wrong_date",
            IssueType::WrongVenue => "wrong_venue",
            IssueType::Duplicate => "duplicate",
            IssueType::Other => "other",
        }
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wrong_date" => Ok(IssueType::WrongDate),
            "wrong_venue" => Ok(IssueType::WrongVenue),
            "duplicate" => Ok(IssueType::Duplicate),
            "other" => Ok(IssueType::Other),
            other => Err(format!("unknown issue type: {other}")),
        }
    }
}

/// A fan's report of incorrect information on an event page.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventReport {
    #[serde(default)]
    pub id: String,
    pub event_id: String,
    pub issue_type: IssueType,
    pub description: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_falls_back_to_legacy_date() {
        let event = Event {
            start_datetime: Some("  ".to_string()),
            date: Some("2030-01-02".to_string()),
            ..Event::default()
        };
        assert_eq!(event.start_or_date(), Some("2030-01-02"));
    }

    #[test]
    fn coordinate_requires_both_components() {
        let mut event = Event {
            lat: Some(38.6),
            ..Event::default()
        };
        assert!(event.coordinate().is_none());
        event.lng = Some(-90.2);
        assert_eq!(event.coordinate(), Some(Coordinate::new(38.6, -90.2)));
    }

    #[test]
    fn infers_source_type_from_url() {
        assert_eq!(
            SourceType::infer("https://www.facebook.com/events/1035975867866154"),
            SourceType::Facebook
        );
        assert_eq!(
            SourceType::infer("https://concerts.livenation.com/show"),
            SourceType::Ticketmaster
        );
        assert_eq!(
            SourceType::infer("https://link.dice.fm/Ia9b62fa0126"),
            SourceType::Link
        );
    }

    #[test]
    fn ranked_event_serializes_flat() {
        let ranked = RankedEvent {
            event: Event {
                id: "ev-1".to_string(),
                title: "PUP".to_string(),
                status: EventStatus::Approved,
                ..Event::default()
            },
            distance: Some(12.5),
        };
        let value = serde_json::to_value(&ranked).expect("serialize ranked event");
        assert_eq!(value["id"], "ev-1");
        assert_eq!(value["status"], "approved");
        assert_eq!(value["distance"], 12.5);
    }

    #[test]
    fn issue_types_use_snake_case() {
        assert_eq!("Wrong_Venue".parse::<IssueType>(), Ok(IssueType::WrongVenue));
        assert!("bogus".parse::<IssueType>().is_err());
        assert_eq!(
            serde_json::to_value(IssueType::WrongDate).expect("serialize"),
            "wrong_date"
        );
    }

    #[test]
    fn edit_form_splits_and_rejoins_start() {
        let pending = PendingEvent {
            title: "Desert Dwellers".to_string(),
            start_datetime: Some("2030-10-17T20:00:00".to_string()),
            ..PendingEvent::default()
        };
        let edit = EventEdit::from_pending(&pending);
        assert_eq!(edit.start_date, "2030-10-17");
        assert_eq!(edit.start_time, "20:00");
        assert_eq!(edit.start_datetime(), "2030-10-17T20:00:00");
    }
}
