//! Shrine Atlas: incremental index-key query engine for a shrine directory map.
//!
//! Geohash prefixes drive viewport loading, bigram keys drive text search,
//! and recurring festival rules drive the date filters.

pub mod config;
pub mod coverage;
pub mod error;
pub mod festival;
pub mod geo;
pub mod geohash;
pub mod logging;
pub mod merge;
pub mod ngram;
pub mod record;
pub mod search;
pub mod server;
pub mod session;
pub mod store;
pub mod viewport;

pub use config::Config;
pub use error::EngineError;
pub use session::BrowsingSession;
