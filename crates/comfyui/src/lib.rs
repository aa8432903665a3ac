//! ComfyUI backend integration.
//!
//! - [`backend`]: the [`BackendClient`] contract the dispatcher drives.
//! - [`api`]: [`ComfyUIApi`], the REST implementation of that contract.
//! - [`outputs`]: ordered rules for locating generated images in a
//!   history payload.

pub mod api;
pub mod backend;
pub mod outputs;

pub use api::ComfyUIApi;
pub use backend::{BackendClient, BackendError};
pub use outputs::{extract_outputs, NoMatchingOutput, OutputRef, OutputRule, DEFAULT_OUTPUT_RULES};
