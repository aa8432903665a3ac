//! Domain types for the batch generation service.
//!
//! Everything in this crate is pure: no I/O, no async. The task model and
//! its transition rules live in [`task`], inbound request shapes and their
//! validation in [`request`], and file naming conventions in [`naming`].

pub mod error;
pub mod naming;
pub mod progress;
pub mod request;
pub mod task;
pub mod task_events;
pub mod types;
