use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{info, warn};

use crate::config::{AppConfig, ConfigStore};
use crate::dates::{local_day, DateRange};
use crate::error::Result;
use crate::models::{City, Event, EventReport, PendingArtist, PendingEvent, PendingVenue};
use crate::moderation::{ModerationService, Moderator};
use crate::normalize::normalize_state;
use crate::resolver::{CityResolver, CoordinateCache};
use crate::scrape::{ScrapeClient, ScrapedEvent};
use crate::search::{EventSearch, SearchOutcome, SearchParams, SearchSession};
use crate::storage::{ImageBucket, LocalBucket, StoredObject};
use crate::store::{
    CityDirectory, EventCatalog, ModerationStore, SqliteStore, StoreError, SubmissionStore,
};
use crate::submission::{Lookups, ReportDraft, SubmissionDraft, SubmissionService};

/// One handle over configuration, the store and every workflow.
pub struct GigDog {
    config: AppConfig,
    timezone: Tz,
    cities: Arc<dyn CityDirectory>,
    catalog: Arc<dyn EventCatalog>,
    search: EventSearch,
    submissions: SubmissionService,
    moderation: ModerationService,
    scraper: ScrapeClient,
    bucket: Arc<dyn ImageBucket>,
}

impl GigDog {
    /// Opens the SQLite store and local image bucket named by the config,
    /// after applying environment overrides.
    pub fn open(config: &ConfigStore) -> Result<Self> {
        let config = config.read().with_env();
        let store = Arc::new(SqliteStore::open(&config.database_path())?);
        let bucket = Arc::new(LocalBucket::open_default(
            &config.image_bucket,
            config.storage_public_url.as_deref(),
        ));
        info!(database = %config.database_path().display(), "opened gigdog store");
        Self::with_backend(config, store, bucket)
    }

    pub fn with_backend<B>(
        config: AppConfig,
        backend: Arc<B>,
        bucket: Arc<dyn ImageBucket>,
    ) -> Result<Self>
    where
        B: CityDirectory + EventCatalog + SubmissionStore + ModerationStore + 'static,
    {
        let timezone = config.timezone()?;
        let scraper = ScrapeClient::new(
            config.scrape_function_url.as_deref(),
            config.scrape_api_key.clone(),
            timezone,
            &config.default_start_time,
        )?;
        let resolver = CityResolver::new(backend.clone(), CoordinateCache::new());

        Ok(Self {
            timezone,
            cities: backend.clone(),
            catalog: backend.clone(),
            search: EventSearch::new(backend.clone(), resolver),
            submissions: SubmissionService::new(backend.clone(), backend.clone()),
            moderation: ModerationService::new(backend),
            scraper,
            bucket,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn resolver(&self) -> &CityResolver {
        self.search.resolver()
    }

    /// Search parameters preset with the configured default radius.
    pub fn default_params(&self, state: &str, city: &str) -> SearchParams {
        SearchParams::new(state, city).with_radius(self.config.default_radius_miles)
    }

    /// A background search session sharing this handle's coordinate cache.
    pub fn session(&self) -> SearchSession {
        SearchSession::new(self.search.clone())
    }

    /// Runs the search pipeline, then narrows to `range` in the configured
    /// timezone.
    pub async fn search_events(
        &self,
        params: &SearchParams,
        range: DateRange,
    ) -> Result<SearchOutcome> {
        let mut outcome = self.search.run(params).await?;
        outcome.events = range.apply(outcome.events, self.timezone);
        Ok(outcome)
    }

    /// Distinct state codes that have at least one city, sorted.
    pub async fn list_states(&self) -> Result<Vec<String>> {
        let mut states: Vec<String> = self
            .cities
            .list_cities()
            .await?
            .into_iter()
            .map(|city| city.state)
            .filter(|state| !state.trim().is_empty())
            .collect();
        states.sort();
        states.dedup();
        Ok(states)
    }

    pub async fn cities_in_state(&self, state: &str) -> Result<Vec<City>> {
        let state = normalize_state(state);
        if state.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .cities
            .list_cities()
            .await?
            .into_iter()
            .filter(|city| city.state == state)
            .collect())
    }

    /// The detail view of one approved event. Unknown and unapproved ids are
    /// not found.
    pub async fn event_details(&self, id: &str) -> Result<Event> {
        self.catalog
            .approved_event(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("event {id}")).into())
    }

    /// Scrapes an event link and flags an existing listing at the same venue
    /// on the same local day.
    pub async fn scrape_link(&self, url: &str) -> ScrapedEvent {
        let mut scraped = self.scraper.scrape_event_from_url(url).await;
        self.flag_duplicate(&mut scraped).await;
        scraped
    }

    /// Submissions store the start as local wall time, so the probe day is
    /// taken in the configured timezone.
    async fn flag_duplicate(&self, scraped: &mut ScrapedEvent) {
        let Some(day) = scraped
            .start_datetime
            .as_deref()
            .and_then(|start| local_day(start, self.timezone))
        else {
            return;
        };
        match self
            .submissions
            .find_duplicate(&scraped.title, &scraped.venue_name, &day, None, None)
            .await
        {
            Ok(found) => scraped.duplicate = found,
            Err(err) => warn!(error = %err, "duplicate check after scrape failed"),
        }
    }

    pub async fn lookups(&self) -> Lookups {
        self.submissions.lookups().await
    }

    pub async fn submit_event(
        &self,
        draft: &SubmissionDraft,
        user_id: Option<&str>,
    ) -> Result<PendingEvent> {
        Ok(self.submissions.submit(draft, user_id).await?)
    }

    pub async fn create_pending_artist(&self, artist: PendingArtist) -> Result<PendingArtist> {
        Ok(self.submissions.create_pending_artist(artist).await?)
    }

    pub async fn create_pending_venue(&self, venue: PendingVenue) -> Result<PendingVenue> {
        Ok(self.submissions.create_pending_venue(venue).await?)
    }

    pub async fn report_event(&self, draft: &ReportDraft) -> Result<EventReport> {
        Ok(self.submissions.report_event(draft).await?)
    }

    pub fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<StoredObject> {
        Ok(self.bucket.upload(file_name, content_type, bytes)?)
    }

    pub async fn moderator(&self, user_id: Option<&str>) -> Result<Moderator> {
        Ok(self.moderation.authorize(user_id).await?)
    }
}
