//! Local live-music event discovery.
//!
//! The heart of the crate is [`search::EventSearch`]: resolve a city to
//! coordinates, fetch approved events, drop past ones, measure distances and
//! keep either everything within a radius or everything in the same city.
//! Around it sit fan submissions, admin moderation, link scraping and image
//! storage, all reachable through [`GigDog`].

pub mod app;
pub mod config;
pub mod dates;
pub mod error;
pub mod geo;
pub mod models;
pub mod moderation;
pub mod normalize;
pub mod resolver;
pub mod scrape;
pub mod search;
pub mod storage;
pub mod store;
pub mod submission;
mod utils;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use app::GigDog;
pub use config::{AppConfig, ConfigStore};
pub use dates::DateRange;
pub use error::{Error, Result};
pub use models::{City, Coordinate, Event, RankedEvent};
pub use resolver::{CityResolver, CoordinateCache, Resolution};
pub use search::{EventSearch, SearchMode, SearchOutcome, SearchParams, SearchSession, SearchState};
pub use store::{MemoryStore, SqliteStore};

static LOGGING: OnceCell<()> = OnceCell::new();

/// Installs a fmt subscriber filtered by `RUST_LOG`, or by `default_level`
/// when the variable is unset. Later calls are no-ops.
pub fn init_logging(default_level: &str) -> Result<()> {
    LOGGING
        .get_or_try_init(|| {
            let filter = match EnvFilter::try_from_default_env() {
                Ok(filter) => filter,
                Err(_) => EnvFilter::try_new(default_level)?,
            };
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;
            Ok::<(), Error>(())
        })
        .map(|_| ())
}
