mod bootstrap;
pub mod client;
pub mod models;
pub mod session;

pub use client::ApiClient;
pub use models::{CatalogEntry, Difficulty, Instrument, SearchQuery, SearchResponse, SiteConfig};
