//! Internal fetch errors.
//!
//! These never cross the crate boundary: `fetch_snapshot` folds every
//! variant into an in-band error snapshot.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid source URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("document is empty")]
    EmptyDocument,
}

pub type Result<T> = std::result::Result<T, FetchError>;
