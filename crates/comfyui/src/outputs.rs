//! Locating generated images in a ComfyUI history payload.
//!
//! Different graph variants save their images under different node ids.
//! Rather than branching per variant, the dispatcher walks an ordered list
//! of [`OutputRule`]s and takes the first one that yields images.

use serde::{Deserialize, Serialize};

/// Reference to one file produced by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_output_type")]
    pub kind: String,
}

fn default_output_type() -> String {
    "output".to_string()
}

impl OutputRef {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            subfolder: String::new(),
            kind: default_output_type(),
        }
    }
}

/// One candidate location for generated images: `outputs[node_id][key]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRule {
    pub node_id: &'static str,
    pub key: &'static str,
}

/// Known output locations, highest priority first.
pub const DEFAULT_OUTPUT_RULES: &[OutputRule] = &[
    // SaveImage node shared by the current graphs.
    OutputRule { node_id: "60", key: "images" },
    // VAEDecode of older text-to-image graphs.
    OutputRule { node_id: "8", key: "images" },
    // Preview node of the image-edit subgraph.
    OutputRule { node_id: "115:116", key: "images" },
];

/// No rule matched; carries the node ids that were present.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("No generated images found, available output nodes: [{}]", .available.join(", "))]
pub struct NoMatchingOutput {
    pub available: Vec<String>,
}

/// Apply `rules` in order to a history result and return the first
/// non-empty match as `(node_id, outputs)`.
///
/// Entries without a `filename` are ignored.
pub fn extract_outputs(
    result: &serde_json::Value,
    rules: &[OutputRule],
) -> Result<(&'static str, Vec<OutputRef>), NoMatchingOutput> {
    let outputs = result.get("outputs").and_then(|o| o.as_object());

    if let Some(outputs) = outputs {
        for rule in rules {
            let Some(entries) = outputs
                .get(rule.node_id)
                .and_then(|node| node.get(rule.key))
                .and_then(|v| v.as_array())
            else {
                continue;
            };

            let refs: Vec<OutputRef> = entries
                .iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect();
            if !refs.is_empty() {
                return Ok((rule.node_id, refs));
            }
        }
    }

    let mut available: Vec<String> = outputs
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default();
    available.sort();
    Err(NoMatchingOutput { available })
}
