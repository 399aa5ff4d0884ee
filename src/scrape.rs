//! Client for the remote link-scraping function.
//!
//! Scraping is best effort: any failure yields a fallback result carrying
//! the submitted link so the form can still be filled in by hand.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::dates::local_to_utc;
use crate::models::{optional_text, SourceType};
use crate::submission::DuplicateMatch;

static CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(20))
        .user_agent(concat!("gigdog/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("http client")
});

/// Form-ready fields extracted from an event link.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScrapedEvent {
    pub title: String,
    pub description: String,
    pub venue_name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
    pub ticket_url: String,
    pub image_url: String,
    pub source_type: SourceType,
    pub source_url: String,
    /// Fields the scraper could not find; the form should ask for these.
    pub missing_fields: Vec<String>,
    pub scraped_ok: bool,
    pub duplicate: Option<DuplicateMatch>,
}

impl ScrapedEvent {
    fn fallback(url: &str) -> Self {
        Self {
            ticket_url: url.to_string(),
            source_url: url.to_string(),
            source_type: SourceType::infer(url),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct FunctionResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default, rename = "eventData")]
    event_data: Option<ScrapedFields>,
    #[serde(default)]
    missing_fields: Vec<String>,
    #[serde(default, rename = "finalUrl")]
    final_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScrapedFields {
    title: Option<String>,
    description: Option<String>,
    venue_name: Option<String>,
    address: Option<String>,
    city: Option<String>,
    state: Option<String>,
    postal_code: Option<String>,
    start_datetime: Option<String>,
    start_date: Option<String>,
    start_time: Option<String>,
    end_datetime: Option<String>,
    ticket_url: Option<String>,
    image_url: Option<String>,
    source_type: Option<String>,
    source_url: Option<String>,
}

fn present(value: &Option<String>) -> Option<String> {
    value.as_deref().and_then(optional_text)
}

pub struct ScrapeClient {
    endpoint: Option<Url>,
    api_key: Option<String>,
    timezone: Tz,
    default_start_time: String,
}

impl ScrapeClient {
    /// `endpoint` may be blank, in which case every scrape falls back.
    pub fn new(
        endpoint: Option<&str>,
        api_key: Option<String>,
        timezone: Tz,
        default_start_time: &str,
    ) -> Result<Self> {
        let endpoint = match endpoint.map(str::trim).filter(|e| !e.is_empty()) {
            Some(raw) => {
                Some(Url::parse(raw).with_context(|| format!("invalid scrape endpoint {raw}"))?)
            }
            None => None,
        };
        Ok(Self {
            endpoint,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timezone,
            default_start_time: default_start_time.to_string(),
        })
    }

    pub async fn scrape_event_from_url(&self, url: &str) -> ScrapedEvent {
        let url = url.trim();
        if url.is_empty() {
            return ScrapedEvent::default();
        }

        match self.invoke(url).await {
            Ok(response) if response.ok => self.normalize(url, response),
            Ok(_) => {
                warn!(%url, "scrape function returned not ok");
                ScrapedEvent::fallback(url)
            }
            Err(err) => {
                warn!(%url, error = %format!("{err:#}"), "scrape function failed");
                ScrapedEvent::fallback(url)
            }
        }
    }

    async fn invoke(&self, url: &str) -> Result<FunctionResponse> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| anyhow!("no scrape function configured"))?;

        let mut request = CLIENT.post(endpoint.clone()).json(&json!({ "url": url }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("request failed for {endpoint}"))?;
        let response = response
            .error_for_status()
            .with_context(|| format!("non-success status for {endpoint}"))?;
        response
            .json::<FunctionResponse>()
            .await
            .with_context(|| format!("unable to decode response from {endpoint}"))
    }

    fn normalize(&self, url: &str, response: FunctionResponse) -> ScrapedEvent {
        let fields = response.event_data.unwrap_or_default();
        let final_url = present(&response.final_url)
            .or_else(|| present(&fields.source_url))
            .unwrap_or_else(|| url.to_string());

        let start_datetime = present(&fields.start_datetime).or_else(|| {
            let date = present(&fields.start_date)?;
            let time = present(&fields.start_time).unwrap_or_else(|| self.default_start_time.clone());
            self.local_start(&date, &time)
        });
        debug!(%final_url, missing = response.missing_fields.len(), "scraped event link");

        ScrapedEvent {
            title: present(&fields.title).unwrap_or_default(),
            description: present(&fields.description).unwrap_or_default(),
            venue_name: present(&fields.venue_name).unwrap_or_default(),
            address: present(&fields.address).unwrap_or_default(),
            city: present(&fields.city).unwrap_or_default(),
            state: present(&fields.state).unwrap_or_default(),
            postal_code: present(&fields.postal_code).unwrap_or_default(),
            start_datetime,
            end_datetime: present(&fields.end_datetime),
            ticket_url: present(&fields.ticket_url).unwrap_or_else(|| final_url.clone()),
            image_url: present(&fields.image_url).unwrap_or_default(),
            source_type: present(&fields.source_type)
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(|| SourceType::infer(&final_url)),
            source_url: present(&fields.source_url).unwrap_or_else(|| final_url.clone()),
            missing_fields: response.missing_fields,
            scraped_ok: true,
            duplicate: None,
        }
    }

    /// Combines a local date and `HH:MM` time into a UTC RFC 3339 timestamp.
    fn local_start(&self, date: &str, time: &str) -> Option<String> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
            .ok()?;
        local_to_utc(date.and_time(time), self.timezone).map(|dt| dt.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(tz: Tz) -> ScrapeClient {
        ScrapeClient::new(None, None, tz, "19:00").expect("client")
    }

    fn response(body: serde_json::Value) -> FunctionResponse {
        serde_json::from_value(body).expect("valid response")
    }

    #[test]
    fn rejects_malformed_endpoint() {
        assert!(ScrapeClient::new(Some("not a url"), None, chrono_tz::UTC, "19:00").is_err());
        assert!(ScrapeClient::new(Some("  "), None, chrono_tz::UTC, "19:00").is_ok());
    }

    #[tokio::test]
    async fn unconfigured_endpoint_falls_back() {
        let scraped = client(chrono_tz::UTC)
            .scrape_event_from_url("https://www.eventbrite.com/e/12345")
            .await;
        assert!(!scraped.scraped_ok);
        assert_eq!(scraped.ticket_url, "https://www.eventbrite.com/e/12345");
        assert_eq!(scraped.source_url, "https://www.eventbrite.com/e/12345");
        assert_eq!(scraped.source_type, SourceType::Eventbrite);
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        let client = ScrapeClient::new(
            Some("http://127.0.0.1:9/functions/v1/scrape-event"),
            Some("key".to_string()),
            chrono_tz::UTC,
            "19:00",
        )
        .expect("client");
        let scraped = client
            .scrape_event_from_url("https://www.facebook.com/events/1035975867866154")
            .await;
        assert!(!scraped.scraped_ok);
        assert_eq!(scraped.source_type, SourceType::Facebook);
        assert!(scraped.title.is_empty());
    }

    #[tokio::test]
    async fn blank_url_is_empty_result() {
        let scraped = client(chrono_tz::UTC).scrape_event_from_url("   ").await;
        assert_eq!(scraped, ScrapedEvent::default());
    }

    #[test]
    fn builds_start_from_date_and_default_time() {
        let scraped = client(chrono_tz::America::Chicago).normalize(
            "https://link.dice.fm/abc",
            response(json!({
                "ok": true,
                "eventData": { "title": "PUP", "start_date": "2030-10-17", "venue_name": "Delmar Hall" },
                "missing_fields": ["city", "state"],
                "finalUrl": "https://dice.fm/event/pup"
            })),
        );
        assert!(scraped.scraped_ok);
        assert_eq!(scraped.title, "PUP");
        assert_eq!(
            scraped.start_datetime.as_deref(),
            Some("2030-10-18T00:00:00+00:00")
        );
        assert_eq!(scraped.ticket_url, "https://dice.fm/event/pup");
        assert_eq!(scraped.source_url, "https://dice.fm/event/pup");
        assert_eq!(scraped.source_type, SourceType::Link);
        assert_eq!(scraped.missing_fields, vec!["city", "state"]);
    }

    #[test]
    fn explicit_fields_win() {
        let scraped = client(chrono_tz::UTC).normalize(
            "https://example.com/x",
            response(json!({
                "ok": true,
                "eventData": {
                    "start_datetime": "2030-10-17T20:00:00Z",
                    "start_date": "2030-01-01",
                    "ticket_url": "https://tickets.example.com/1",
                    "source_type": "songkick"
                }
            })),
        );
        assert_eq!(scraped.start_datetime.as_deref(), Some("2030-10-17T20:00:00Z"));
        assert_eq!(scraped.ticket_url, "https://tickets.example.com/1");
        assert_eq!(scraped.source_url, "https://example.com/x");
        assert_eq!(scraped.source_type, SourceType::Songkick);
    }

    #[test]
    fn unparsable_start_pieces_are_dropped() {
        let scraped = client(chrono_tz::UTC).normalize(
            "https://example.com/x",
            response(json!({
                "ok": true,
                "eventData": { "start_date": "Friday", "start_time": "late" }
            })),
        );
        assert_eq!(scraped.start_datetime, None);
    }
}
