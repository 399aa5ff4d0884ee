//! The geo-aware event query pipeline and the superseding search session
//! that drives it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, error, instrument};

use crate::dates::{is_upcoming_on, parse_timestamp};
use crate::models::{Coordinate, Event, RankedEvent};
use crate::normalize::{cache_key, normalize_state, same_place};
use crate::resolver::CityResolver;
use crate::store::{EventCatalog, EventQuery, StoreError};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("event fetch failed: {0}")]
    Store(#[from] StoreError),
}

/// Inputs for one search. `radius_miles` defaults to 0, which selects exact
/// city/state matching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchParams {
    pub state: String,
    pub city: String,
    pub radius_miles: f64,
    pub user: Option<Coordinate>,
}

impl SearchParams {
    pub fn new(state: &str, city: &str) -> Self {
        Self {
            state: state.to_string(),
            city: city.to_string(),
            ..Self::default()
        }
    }

    pub fn with_radius(mut self, miles: f64) -> Self {
        self.radius_miles = miles;
        self
    }

    pub fn with_user_location(mut self, user: Coordinate) -> Self {
        self.user = Some(user);
        self
    }

    /// Radius in miles; NaN, infinite and negative values count as 0.
    pub fn radius(&self) -> f64 {
        if self.radius_miles.is_finite() && self.radius_miles > 0.0 {
            self.radius_miles
        } else {
            0.0
        }
    }

    fn user_center(&self) -> Option<Coordinate> {
        self.user.filter(Coordinate::is_finite)
    }

    /// A search needs either a city and state or the user's coordinates.
    pub fn has_location(&self) -> bool {
        cache_key(&self.state, &self.city).is_some() || self.user_center().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Cross-state, everything within the radius of the center.
    Radius,
    /// Same normalized city and state.
    Exact,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub events: Vec<RankedEvent>,
    pub mode: SearchMode,
    pub center: Option<Coordinate>,
}

impl SearchOutcome {
    fn empty() -> Self {
        Self {
            events: Vec::new(),
            mode: SearchMode::Exact,
            center: None,
        }
    }
}

#[derive(Clone)]
pub struct EventSearch {
    catalog: Arc<dyn EventCatalog>,
    resolver: CityResolver,
}

impl EventSearch {
    pub fn new(catalog: Arc<dyn EventCatalog>, resolver: CityResolver) -> Self {
        Self { catalog, resolver }
    }

    pub fn resolver(&self) -> &CityResolver {
        &self.resolver
    }

    pub async fn run(&self, params: &SearchParams) -> Result<SearchOutcome, SearchError> {
        self.run_as_of(params, Utc::now().date_naive()).await
    }

    /// Runs the pipeline with `today` as the cutoff for upcoming events.
    #[instrument(
        skip(self, params),
        fields(state = %params.state, city = %params.city, radius = params.radius_miles)
    )]
    pub async fn run_as_of(
        &self,
        params: &SearchParams,
        today: NaiveDate,
    ) -> Result<SearchOutcome, SearchError> {
        if !params.has_location() {
            debug!("no location to search around");
            return Ok(SearchOutcome::empty());
        }

        let center = match params.user_center() {
            Some(user) => Some(user),
            None => self
                .resolver
                .resolve(&params.state, &params.city)
                .await
                .coordinate(),
        };
        let radius = params.radius();
        let mode = if radius > 0.0 && center.is_some() {
            SearchMode::Radius
        } else {
            SearchMode::Exact
        };

        let mut query = EventQuery::approved();
        let state = normalize_state(&params.state);
        if mode == SearchMode::Exact && !state.is_empty() {
            query = query.in_state(&state);
        }
        let fetched = self.catalog.events(&query).await.map_err(|err| {
            error!(error = %err, "event fetch failed");
            SearchError::from(err)
        })?;

        let upcoming: Vec<Event> = fetched
            .into_iter()
            .filter(|event| is_upcoming_on(event, today))
            .collect();
        let ranked = join_all(upcoming.into_iter().map(|event| self.rank(event, center))).await;

        let mut events: Vec<RankedEvent> = match mode {
            SearchMode::Radius => ranked
                .into_iter()
                .filter(|r| r.distance.is_some_and(|d| d <= radius))
                .collect(),
            SearchMode::Exact => ranked
                .into_iter()
                .filter(|r| same_place(&r.event.state, &r.event.city, &params.state, &params.city))
                .collect(),
        };
        events.sort_by(|a, b| {
            start_millis(&a.event)
                .cmp(&start_millis(&b.event))
                .then_with(|| {
                    a.distance
                        .unwrap_or(0.0)
                        .total_cmp(&b.distance.unwrap_or(0.0))
                })
        });

        debug!(count = events.len(), ?mode, "search complete");
        Ok(SearchOutcome {
            events,
            mode,
            center,
        })
    }

    /// Fills in missing event coordinates from the city directory and
    /// measures the distance to `center`.
    async fn rank(&self, event: Event, center: Option<Coordinate>) -> RankedEvent {
        let coordinate = match event.coordinate() {
            Some(coordinate) => Some(coordinate),
            None => self
                .resolver
                .resolve(&event.state, &event.city)
                .await
                .coordinate(),
        };
        let distance = center
            .zip(coordinate)
            .and_then(|(center, point)| center.distance_to(&point));
        RankedEvent { event, distance }
    }
}

fn start_millis(event: &Event) -> i64 {
    event
        .start_datetime
        .as_deref()
        .and_then(parse_timestamp)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

/// What a subscriber sees of the current search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub events: Vec<RankedEvent>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Runs searches in the background where each submission supersedes the
/// previous one. Results of a superseded run are never published.
pub struct SearchSession {
    search: EventSearch,
    state: Arc<watch::Sender<SearchState>>,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl SearchSession {
    pub fn new(search: EventSearch) -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            search,
            state: Arc::new(state),
            current: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    /// Cancels any in-flight run and starts a new one. Returns `None` when the
    /// parameters carry no location; the state is cleared in that case.
    pub fn submit(&self, params: SearchParams) -> Option<JoinHandle<()>> {
        let cancelled = Arc::new(AtomicBool::new(false));
        {
            let mut current = self
                .current
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(previous) = current.replace(Arc::clone(&cancelled)) {
                previous.store(true, Ordering::SeqCst);
            }
        }

        if !params.has_location() {
            self.state.send_replace(SearchState::default());
            return None;
        }

        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let search = self.search.clone();
        let publisher = Arc::clone(&self.state);
        Some(tokio::spawn(async move {
            let result = search.run(&params).await;
            publisher.send_if_modified(move |state| {
                if cancelled.load(Ordering::SeqCst) {
                    return false;
                }
                match result {
                    Ok(outcome) => {
                        state.events = outcome.events;
                        state.error = None;
                    }
                    Err(err) => {
                        state.events = Vec::new();
                        state.error = Some(err.to_string());
                    }
                }
                state.loading = false;
                true
            });
        }))
    }
}
