use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use gigdog::{
    City, CityResolver, CoordinateCache, Event, EventSearch, MemoryStore, Resolution, SearchMode,
    SearchParams, SearchSession,
};
use gigdog::models::{Coordinate, EventStatus};

const ST_LOUIS: (f64, f64) = (38.6270, -90.1994);
const BELLEVILLE: (f64, f64) = (38.5201, -89.9840);
const KANSAS_CITY: (f64, f64) = (39.0997, -94.5786);

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 6, 1).expect("valid date")
}

fn approved(id: &str, start: &str, city: &str, state: &str, at: Option<(f64, f64)>) -> Event {
    Event {
        id: id.to_string(),
        title: format!("Show {id}"),
        start_datetime: Some(start.to_string()),
        city: city.to_string(),
        state: state.to_string(),
        lat: at.map(|(lat, _)| lat),
        lng: at.map(|(_, lng)| lng),
        status: EventStatus::Approved,
        ..Event::default()
    }
}

fn directory() -> MemoryStore {
    MemoryStore::new()
        .with_city(City::new("St. Louis", "MO", ST_LOUIS.0, ST_LOUIS.1))
        .with_city(City::new("Belleville", "IL", BELLEVILLE.0, BELLEVILLE.1))
        .with_city(City::new("Kansas City", "MO", KANSAS_CITY.0, KANSAS_CITY.1))
}

fn search_over(store: &Arc<MemoryStore>) -> EventSearch {
    let resolver = CityResolver::new(store.clone(), CoordinateCache::new());
    EventSearch::new(store.clone(), resolver)
}

fn ids(events: &[gigdog::RankedEvent]) -> Vec<&str> {
    events.iter().map(|r| r.event.id.as_str()).collect()
}

#[tokio::test]
async fn exact_mode_keeps_only_the_named_city() {
    let store = Arc::new(
        directory()
            .with_event(approved("stl", "2030-06-05T20:00:00Z", "St. Louis", "MO", None))
            .with_event(approved("kc", "2030-06-04T20:00:00Z", "Kansas City", "MO", None)),
    );
    let outcome = search_over(&store)
        .run_as_of(&SearchParams::new("MO", "St. Louis"), today())
        .await
        .expect("search");

    assert_eq!(outcome.mode, SearchMode::Exact);
    assert_eq!(ids(&outcome.events), vec!["stl"]);
}

#[tokio::test]
async fn radius_mode_crosses_state_lines() {
    let store = Arc::new(
        directory()
            .with_event(approved(
                "belleville",
                "2030-06-05T20:00:00Z",
                "Belleville",
                "IL",
                Some(BELLEVILLE),
            ))
            .with_event(approved(
                "stl",
                "2030-06-05T20:00:00Z",
                "St. Louis",
                "MO",
                Some(ST_LOUIS),
            ))
            .with_event(approved(
                "kc",
                "2030-06-03T20:00:00Z",
                "Kansas City",
                "MO",
                Some(KANSAS_CITY),
            )),
    );
    let outcome = search_over(&store)
        .run_as_of(&SearchParams::new("MO", "St. Louis").with_radius(50.0), today())
        .await
        .expect("search");

    assert_eq!(outcome.mode, SearchMode::Radius);
    assert_eq!(outcome.center, Some(Coordinate::new(ST_LOUIS.0, ST_LOUIS.1)));
    assert_eq!(ids(&outcome.events), vec!["stl", "belleville"]);
    assert_eq!(outcome.events[0].distance, Some(0.0));
    let belleville = outcome.events[1].distance.expect("distance");
    assert!(belleville > 5.0 && belleville < 20.0, "got {belleville}");
}

#[tokio::test]
async fn unresolvable_events_only_survive_exact_mode() {
    let orphan = || approved("orphan", "2030-06-05T20:00:00Z", "St. Louis", "MO", None);

    // no directory rows, so neither the center nor the event resolve
    let store = Arc::new(MemoryStore::new().with_event(orphan()));
    let exact = search_over(&store)
        .run_as_of(&SearchParams::new("MO", "St. Louis"), today())
        .await
        .expect("search");
    assert_eq!(ids(&exact.events), vec!["orphan"]);
    assert_eq!(exact.events[0].distance, None);

    // with a center the radius applies and the orphan has no distance
    let store = Arc::new(
        MemoryStore::new()
            .with_city(City::new("Belleville", "IL", BELLEVILLE.0, BELLEVILLE.1))
            .with_event(orphan()),
    );
    let radius = search_over(&store)
        .run_as_of(&SearchParams::new("IL", "Belleville").with_radius(50.0), today())
        .await
        .expect("search");
    assert_eq!(radius.mode, SearchMode::Radius);
    assert!(radius.events.is_empty());
}

#[tokio::test]
async fn repeated_cities_hit_the_directory_once() {
    let store = Arc::new(directory());
    for n in 0..5 {
        store.add_event(approved(
            &format!("stl-{n}"),
            "2030-06-05T20:00:00Z",
            "St. Louis, MO",
            "MO",
            None,
        ));
    }
    let search = search_over(&store);
    let outcome = search
        .run_as_of(&SearchParams::new("mo", "St. Louis").with_radius(10.0), today())
        .await
        .expect("search");
    assert_eq!(outcome.events.len(), 5);
    // "St. Louis" and "St. Louis, MO" share one cache key
    assert_eq!(store.city_lookups(), 1);

    search
        .run_as_of(&SearchParams::new("MO", "ST. LOUIS, MO").with_radius(10.0), today())
        .await
        .expect("search");
    assert_eq!(store.city_lookups(), 1);
}

#[tokio::test]
async fn spelling_does_not_depend_on_a_warm_cache() {
    let store = Arc::new(directory().with_event(approved(
        "belleville",
        "2030-06-05T20:00:00Z",
        "Belleville",
        "IL",
        Some(BELLEVILLE),
    )));
    let params = SearchParams::new("MO", "st louis").with_radius(25.0);

    let cold = search_over(&store)
        .run_as_of(&params, today())
        .await
        .expect("cold search");
    assert_eq!(cold.mode, SearchMode::Radius);
    assert_eq!(ids(&cold.events), vec!["belleville"]);

    let warm = search_over(&store);
    warm.resolver().resolve("MO", "St. Louis").await;
    let warmed = warm.run_as_of(&params, today()).await.expect("warm search");
    assert_eq!(warmed.mode, cold.mode);
    assert_eq!(ids(&warmed.events), ids(&cold.events));
}

#[tokio::test]
async fn failed_lookups_are_retried() {
    let store = Arc::new(MemoryStore::new());
    let resolver = CityResolver::new(store.clone(), CoordinateCache::new());
    assert_eq!(resolver.resolve("MO", "St. Louis").await, Resolution::NotFound);

    store.add_city(City::new("St. Louis", "MO", ST_LOUIS.0, ST_LOUIS.1));
    assert_eq!(
        resolver.resolve("MO", "St. Louis").await,
        Resolution::Found(Coordinate::new(ST_LOUIS.0, ST_LOUIS.1))
    );
    assert_eq!(store.city_lookups(), 2);
}

#[tokio::test(start_paused = true)]
async fn latest_submission_wins() {
    let store = Arc::new(
        directory()
            .with_event(approved("stl", "2099-06-05T20:00:00Z", "St. Louis", "MO", None))
            .with_event(approved("belleville", "2099-06-05T20:00:00Z", "Belleville", "IL", None))
            .with_fetch_delay("MO", Duration::from_secs(5)),
    );
    let session = SearchSession::new(search_over(&store));
    let mut updates = session.subscribe();

    let slow = session
        .submit(SearchParams::new("MO", "St. Louis"))
        .expect("first search started");
    let fast = session
        .submit(SearchParams::new("IL", "Belleville"))
        .expect("second search started");
    assert!(session.state().loading);

    fast.await.expect("fast search joined");
    let state = session.state();
    assert!(!state.loading);
    assert_eq!(ids(&state.events), vec!["belleville"]);

    updates.borrow_and_update();
    slow.await.expect("slow search joined");
    assert!(!updates.has_changed().expect("sender alive"));
    assert_eq!(ids(&session.state().events), vec!["belleville"]);
    assert_eq!(store.event_fetches(), 2);
}
