//! Sieve: per-request plugin filtering.
//!
//! Given the host's active plugin roster and a snapshot of the current
//! request, the engine works out which plugins the request needs and hands
//! back a narrowed list, or the full roster whenever it is unsure.
//!
//! The library is usable on its own through [`engine::Engine`]; the `sieve`
//! binary wraps it in an HTTP service.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod graph;
pub mod metrics;
pub mod plugin;
pub mod request;
pub mod resolve;
pub mod routes;
pub mod rules;
pub mod state;
pub mod store;

pub use config::Config;
pub use engine::{Engine, EngineSettings, FilterOutcome, FilterResult, ReentrancyToken};
pub use state::AppState;
