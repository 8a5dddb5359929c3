//! Core domain types and logic for the webhook relay: the path engine,
//! transform pipeline, rule document, rule store, process config, metrics,
//! pattern builder, and request/payload log buffers. HTTP wiring lives in
//! `alertbridge-server`; outbound delivery lives in `alertbridge-relay`.

pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod path;
pub mod pattern;
pub mod request_log;
pub mod rules;
pub mod store;
pub mod transform;

pub use config::Config;
pub use context::RequestContext;
pub use error::RelayError;
pub use rules::RuleSet;
pub use store::RuleStore;
