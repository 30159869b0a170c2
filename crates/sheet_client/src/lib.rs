//! External document fetcher for the live sheet dashboard.
//!
//! The one contract that matters here: [`SheetClient::fetch_snapshot`]
//! never raises. Fetch and parse failures are converted in-band into a
//! one-row error table at this boundary, so the rest of the system can
//! treat every snapshot as displayable data.

pub mod client;
pub mod error;
pub mod parse;

pub use client::SheetClient;
pub use error::{FetchError, Result};
