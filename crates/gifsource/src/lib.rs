//! HTTP side of the gif wall: the listing client that asks the backend for
//! candidate gif URLs once at startup, and the blocking image fetcher the
//! download queue runs on its worker threads.

mod client;
mod fetch;

pub use client::{FeedClient, FeedConfig};
pub use fetch::HttpImageFetcher;
