//! Domain model and pure business rules for the service-delivery engine.
//!
//! Nothing here performs I/O. Persistence is reached through the traits in
//! [`repository`]; orchestration lives in `agency-engine`.

pub mod capability;
pub mod capacity;
pub mod employee;
pub mod error;
pub mod planner;
pub mod repository;
pub mod sequence;
pub mod skills;
pub mod template;
pub mod types;
pub mod workflow;
