//! City/state to coordinate resolution with a shared memo cache.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, warn};

use crate::models::Coordinate;
use crate::normalize::{cache_key, clean_city, normalize_state};
use crate::store::CityDirectory;

/// Process-wide coordinate memo keyed by `"STATE|city"`.
///
/// Clones share the same map. Entries are only ever added.
#[derive(Clone, Default)]
pub struct CoordinateCache {
    inner: Arc<Mutex<HashMap<String, Coordinate>>>,
}

impl CoordinateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Coordinate>> {
        // a poisoned map still holds valid coordinates
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Coordinate> {
        self.map().get(key).copied()
    }

    pub fn insert(&self, key: String, coordinate: Coordinate) {
        self.map().entry(key).or_insert(coordinate);
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// Outcome of a single coordinate lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Coordinate),
    /// Input normalized to empty; the directory was not consulted.
    Skipped,
    /// No matching city, or the match has no usable coordinates.
    NotFound,
    Failed(String),
}

impl Resolution {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Resolution::Found(coordinate) => Some(*coordinate),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct CityResolver {
    directory: Arc<dyn CityDirectory>,
    cache: CoordinateCache,
}

impl CityResolver {
    pub fn new(directory: Arc<dyn CityDirectory>, cache: CoordinateCache) -> Self {
        Self { directory, cache }
    }

    pub fn cache(&self) -> &CoordinateCache {
        &self.cache
    }

    pub async fn resolve(&self, state: &str, city: &str) -> Resolution {
        let Some(key) = cache_key(state, city) else {
            return Resolution::Skipped;
        };
        if let Some(hit) = self.cache.get(&key) {
            return Resolution::Found(hit);
        }

        let state = normalize_state(state);
        let fragment = clean_city(city);
        match self.directory.find_city(&state, &fragment).await {
            Ok(Some(row)) => match row.coordinate() {
                Some(coordinate) => {
                    debug!(%key, lat = coordinate.lat, lng = coordinate.lng, "resolved city");
                    self.cache.insert(key, coordinate);
                    Resolution::Found(coordinate)
                }
                None => Resolution::NotFound,
            },
            Ok(None) => Resolution::NotFound,
            Err(err) => {
                warn!(%key, error = %err, "city lookup failed");
                Resolution::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::City;
    use crate::store::MemoryStore;

    fn resolver_over(store: Arc<MemoryStore>) -> CityResolver {
        CityResolver::new(store, CoordinateCache::new())
    }

    #[tokio::test]
    async fn second_lookup_hits_cache() {
        let store = Arc::new(
            MemoryStore::new().with_city(City::new("St. Louis", "MO", 38.6270, -90.1994)),
        );
        let resolver = resolver_over(store.clone());

        let first = resolver.resolve("mo", "St. Louis, MO").await;
        let second = resolver.resolve("MO", "st. louis").await;
        assert_eq!(first, Resolution::Found(Coordinate::new(38.6270, -90.1994)));
        assert_eq!(first, second);
        assert_eq!(store.city_lookups(), 1);
        assert_eq!(resolver.cache().len(), 1);
    }

    #[tokio::test]
    async fn empty_input_skips_the_directory() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver_over(store.clone());
        assert_eq!(resolver.resolve("", "St. Louis").await, Resolution::Skipped);
        assert_eq!(resolver.resolve("MO", "  , MO").await, Resolution::Skipped);
        assert_eq!(store.city_lookups(), 0);
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver_over(store.clone());
        assert_eq!(resolver.resolve("MO", "Nowhere").await, Resolution::NotFound);
        assert_eq!(resolver.resolve("MO", "Nowhere").await, Resolution::NotFound);
        assert_eq!(store.city_lookups(), 2);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn rows_without_coordinates_are_not_found() {
        let store = Arc::new(MemoryStore::new().with_city(City {
            city_name: "Ghost Town".to_string(),
            state: "NV".to_string(),
            lat: Some(39.0),
            lng: None,
        }));
        let resolver = resolver_over(store);
        assert_eq!(resolver.resolve("NV", "Ghost Town").await, Resolution::NotFound);
    }

    #[tokio::test]
    async fn store_errors_become_failed() {
        let store = Arc::new(MemoryStore::new());
        store.fail_city_lookups(true);
        let resolver = resolver_over(store);
        let resolution = resolver.resolve("MO", "St. Louis").await;
        assert!(matches!(resolution, Resolution::Failed(_)));
        assert_eq!(resolution.coordinate(), None);
    }

    #[tokio::test]
    async fn clones_share_the_cache() {
        let store = Arc::new(
            MemoryStore::new().with_city(City::new("Boise", "ID", 43.6150, -116.2023)),
        );
        let resolver = resolver_over(store.clone());
        let twin = resolver.clone();
        resolver.resolve("ID", "Boise").await;
        twin.resolve("ID", "boise").await;
        assert_eq!(store.city_lookups(), 1);
    }
}
