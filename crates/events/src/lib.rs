//! Pipeline event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PipelineEvent`]: the event envelope published on every stage
//!   completion or failure.
//! - [`EventLogger`]: background subscriber writing every event to the
//!   tracing log.

pub mod bus;
pub mod logger;
pub mod names;

pub use bus::{EventBus, PipelineEvent};
pub use logger::EventLogger;
