//! Inbound generation request shapes and their validation.
//!
//! Validation runs synchronously before any task is created; a rejected
//! request never reaches the registry.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_DIMENSION: u32 = 1024;
pub const MIN_DIMENSION: u32 = 64;
pub const MAX_DIMENSION: u32 = 4096;

pub const DEFAULT_STEPS: u32 = 8;
pub const MAX_STEPS: u32 = 150;

pub const DEFAULT_CFG: f64 = 1.0;
pub const MAX_CFG: f64 = 30.0;

pub const DEFAULT_BATCH_SIZE: u32 = 1;
pub const MAX_BATCH_SIZE: u32 = 16;

/// Maximum number of requests accepted in one batch submission.
pub const MAX_BATCH_REQUESTS: usize = 100;

/// Maximum prompt length in characters.
const MAX_PROMPT_LEN: usize = 4000;

/// Maximum batch label length.
const MAX_BATCH_NAME_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

fn default_dimension() -> u32 {
    DEFAULT_DIMENSION
}

fn default_steps() -> u32 {
    DEFAULT_STEPS
}

fn default_cfg() -> f64 {
    DEFAULT_CFG
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single image generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// An explicit `null` reads as empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub negative_prompt: String,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_cfg")]
    pub cfg: f64,
    /// Sampler seed; a random one is drawn at build time when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Number of images generated in one backend run.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default)]
    pub batch_name: Option<String>,
    /// File name of a previously staged input image.
    #[serde(default)]
    pub input_image: Option<String>,
}

impl GenerationRequest {
    /// A request with the given prompt and every other field defaulted.
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: String::new(),
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
            steps: DEFAULT_STEPS,
            cfg: DEFAULT_CFG,
            seed: None,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_name: None,
            input_image: None,
        }
    }

    /// Serialized copy stored on the task for traceability.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// The seed to use: the requested one, or a fresh random one.
    pub fn effective_seed(&self) -> u64 {
        self.seed
            .unwrap_or_else(|| rand::random::<u64>() % 1_000_000_000)
    }
}

/// Several generation requests submitted together under one label.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub requests: Vec<GenerationRequest>,
    #[serde(default)]
    pub batch_name: Option<String>,
    /// Accepted for client compatibility; scheduling ignores it.
    #[serde(default)]
    pub priority: i32,
}

impl BatchRequest {
    /// The label shared by every task in this batch.
    ///
    /// Falls back to `batch_<unix-seconds>` when the caller gave none.
    pub fn label(&self, now: crate::types::Timestamp) -> String {
        match self.batch_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("batch_{}", now.timestamp()),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a single generation request.
///
/// Rules:
/// - `prompt` must not be blank and must not exceed `MAX_PROMPT_LEN` chars.
/// - `width`/`height` within `MIN_DIMENSION..=MAX_DIMENSION`.
/// - `steps` within `1..=MAX_STEPS`, `batch_size` within `1..=MAX_BATCH_SIZE`.
/// - `cfg` finite and within `0.0..=MAX_CFG`.
/// - `input_image`, when present, must be a plain file name.
pub fn validate_generation_request(req: &GenerationRequest) -> Result<(), CoreError> {
    if req.prompt.trim().is_empty() {
        return Err(CoreError::Validation("Prompt must not be empty".to_string()));
    }
    if req.prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(CoreError::Validation(format!(
            "Prompt must not exceed {MAX_PROMPT_LEN} characters"
        )));
    }
    validate_dimension("width", req.width)?;
    validate_dimension("height", req.height)?;

    if req.steps == 0 || req.steps > MAX_STEPS {
        return Err(CoreError::Validation(format!(
            "Steps must be between 1 and {MAX_STEPS}, got {}",
            req.steps
        )));
    }
    if !req.cfg.is_finite() || !(0.0..=MAX_CFG).contains(&req.cfg) {
        return Err(CoreError::Validation(format!(
            "CFG must be between 0 and {MAX_CFG}, got {}",
            req.cfg
        )));
    }
    if req.batch_size == 0 || req.batch_size > MAX_BATCH_SIZE {
        return Err(CoreError::Validation(format!(
            "Batch size must be between 1 and {MAX_BATCH_SIZE}, got {}",
            req.batch_size
        )));
    }
    if let Some(name) = &req.batch_name {
        validate_batch_name(name)?;
    }
    if let Some(image) = &req.input_image {
        validate_file_name(image)?;
    }
    Ok(())
}

/// Validate a batch submission and every request inside it.
pub fn validate_batch_request(batch: &BatchRequest) -> Result<(), CoreError> {
    if batch.requests.is_empty() {
        return Err(CoreError::Validation(
            "Batch must contain at least one request".to_string(),
        ));
    }
    if batch.requests.len() > MAX_BATCH_REQUESTS {
        return Err(CoreError::Validation(format!(
            "Batch must not exceed {MAX_BATCH_REQUESTS} requests"
        )));
    }
    if let Some(name) = &batch.batch_name {
        validate_batch_name(name)?;
    }
    for (i, req) in batch.requests.iter().enumerate() {
        validate_generation_request(req).map_err(|e| match e {
            CoreError::Validation(msg) => CoreError::Validation(format!("Request {i}: {msg}")),
            other => other,
        })?;
    }
    Ok(())
}

/// Validate that `name` is a bare file name with no directory component.
pub fn validate_file_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(CoreError::Validation(format!(
            "Invalid file name '{name}'"
        )));
    }
    Ok(())
}

fn validate_dimension(field: &str, value: u32) -> Result<(), CoreError> {
    if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
        return Err(CoreError::Validation(format!(
            "{field} must be between {MIN_DIMENSION} and {MAX_DIMENSION}, got {value}"
        )));
    }
    Ok(())
}

fn validate_batch_name(name: &str) -> Result<(), CoreError> {
    if name.len() > MAX_BATCH_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Batch name must not exceed {MAX_BATCH_NAME_LEN} characters"
        )));
    }
    Ok(())
}
