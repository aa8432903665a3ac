//! Task orchestration.
//!
//! - [`registry`]: the in-memory system of record for tasks, mirrored to
//!   the durable store and announced through the notification hub.
//! - [`dispatcher`]: one unit per task driving it through
//!   prepare → build → submit → poll → fetch → finalize.
//! - [`workflow`]: builds the backend execution graph for a request.
//! - [`storage`]: artifact output and input staging directories.

pub mod dispatcher;
pub mod registry;
pub mod storage;
pub mod workflow;

pub use dispatcher::{DispatchConfig, DispatchError, Dispatcher};
pub use registry::{RegistryError, TaskRegistry};
pub use storage::{ArtifactStore, StorageError};
pub use workflow::{QwenWorkflowBuilder, WorkflowBuilder};
