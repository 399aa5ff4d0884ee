use thiserror::Error;

use crate::config::ConfigError;
use crate::moderation::ModerationError;
use crate::search::SearchError;
use crate::storage::StorageError;
use crate::store::StoreError;
use crate::submission::SubmissionError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Moderation(#[from] ModerationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("scrape client setup failed: {0:#}")]
    Scrape(#[from] anyhow::Error),
    #[error("logging setup failed: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
