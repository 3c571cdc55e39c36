//! In-process domain events for the delivery engine.
//!
//! - [`EventBus`] fans [`DomainEvent`]s out over `tokio::sync::broadcast`.
//! - [`kinds`] names every event the engine emits.
//! - [`EventLogger`] is a background subscriber that writes events to the log.

pub mod bus;
pub mod kinds;
pub mod logger;

pub use bus::{DomainEvent, EventBus};
pub use logger::EventLogger;
