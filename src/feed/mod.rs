// src/feed/mod.rs
pub mod date;
pub mod http;
pub mod parser;
pub mod types;

pub use http::HttpSourceFetcher;
pub use types::{Entry, FetchFailure, FetchResult, FetchedFeed, SourceDescriptor, SourceFetcher};
