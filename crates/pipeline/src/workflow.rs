//! Backend execution graphs for generation requests.
//!
//! A graph is a ComfyUI "API format" prompt: a JSON object keyed by node
//! id, each node naming its `class_type` and `inputs`. Inputs of the form
//! `["<node>", <slot>]` wire one node's output into another.
//!
//! Both graphs route the final image into the `SaveImage` node `"60"`,
//! which is the first output location the dispatcher probes.

use batchgen_core::error::CoreError;
use batchgen_core::request::GenerationRequest;
use serde_json::{json, Value};

/// Node id of the `SaveImage` node in every graph built here.
pub const SAVE_IMAGE_NODE: &str = "60";

const CLIP_MODEL: &str = "qwen_2.5_vl_7b_fp8_scaled.safetensors";
const VAE_MODEL: &str = "qwen_image_vae.safetensors";
const TEXT_TO_IMAGE_UNET: &str = "Qwen-Image_ComfyUI/qwen_image_bf16.safetensors";
const TEXT_TO_IMAGE_LORA: &str = "Qwen-Image-Lightning/Qwen-Image-Lightning-8steps-V1.0.safetensors";
const IMAGE_EDIT_UNET: &str = "Qwen-Image-Edit_ComfyUI/qwen_image_edit_2509_fp8_e4m3fn.safetensors";
const IMAGE_EDIT_LORA: &str = "Qwen-Image-Lightning/Qwen-Image-Lightning-4steps-V1.0.safetensors";

const SAMPLER: &str = "euler_cfg_pp";
const SCHEDULER: &str = "sgm_uniform";
const IMAGE_EDIT_DENOISE: f64 = 0.8;

/// Used when a text-to-image request carries no negative prompt.
const DEFAULT_NEGATIVE_PROMPT: &str = "deformed face, distorted features, exaggerated cartoon style, \
     oversized head, plastic skin, 3d render, low quality, malformed, extra hands, extra fingers, \
     odd lighting, oversaturated colours";

/// Builds the execution graph submitted for a request.
pub trait WorkflowBuilder: Send + Sync {
    fn build(&self, request: &GenerationRequest) -> Result<Value, CoreError>;
}

/// Qwen-Image graphs: text-to-image, or image edit when the request
/// references an input image already uploaded to the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct QwenWorkflowBuilder;

impl WorkflowBuilder for QwenWorkflowBuilder {
    fn build(&self, request: &GenerationRequest) -> Result<Value, CoreError> {
        let seed = request.effective_seed();
        match request.input_image.as_deref() {
            None => Ok(text_to_image(request, seed)),
            Some(image) if image.trim().is_empty() => Err(CoreError::Validation(
                "Input image name must not be blank".to_string(),
            )),
            Some(image) => Ok(image_edit(request, image, seed)),
        }
    }
}

fn text_to_image(req: &GenerationRequest, seed: u64) -> Value {
    let negative = if req.negative_prompt.trim().is_empty() {
        DEFAULT_NEGATIVE_PROMPT
    } else {
        req.negative_prompt.as_str()
    };

    json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": seed,
                "steps": req.steps,
                "cfg": req.cfg,
                "sampler_name": SAMPLER,
                "scheduler": SCHEDULER,
                "denoise": 1,
                "model": ["66", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["58", 0]
            }
        },
        "6": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": req.prompt, "clip": ["38", 0] }
        },
        "7": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": negative, "clip": ["38", 0] }
        },
        "8": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["3", 0], "vae": ["39", 0] }
        },
        "37": {
            "class_type": "UNETLoader",
            "inputs": { "unet_name": TEXT_TO_IMAGE_UNET, "weight_dtype": "default" }
        },
        "38": {
            "class_type": "CLIPLoader",
            "inputs": { "clip_name": CLIP_MODEL, "type": "qwen_image", "device": "default" }
        },
        "39": {
            "class_type": "VAELoader",
            "inputs": { "vae_name": VAE_MODEL }
        },
        "58": {
            "class_type": "EmptySD3LatentImage",
            "inputs": { "width": req.width, "height": req.height, "batch_size": req.batch_size }
        },
        SAVE_IMAGE_NODE: {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": "ComfyUI", "images": ["8", 0] }
        },
        "66": {
            "class_type": "ModelSamplingAuraFlow",
            "inputs": { "shift": 3, "model": ["73", 0] }
        },
        "73": {
            "class_type": "LoraLoaderModelOnly",
            "inputs": { "lora_name": TEXT_TO_IMAGE_LORA, "strength_model": 1, "model": ["37", 0] }
        }
    })
}

fn image_edit(req: &GenerationRequest, image: &str, seed: u64) -> Value {
    json!({
        SAVE_IMAGE_NODE: {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": "ComfyUI", "images": ["115:8", 0] }
        },
        "78": {
            "class_type": "LoadImage",
            "inputs": { "image": image }
        },
        "115:3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": seed,
                "steps": req.steps,
                "cfg": req.cfg,
                "sampler_name": SAMPLER,
                "scheduler": SCHEDULER,
                "denoise": IMAGE_EDIT_DENOISE,
                "model": ["115:75", 0],
                "positive": ["115:111", 0],
                "negative": ["115:110", 0],
                "latent_image": ["115:112", 0]
            }
        },
        "115:8": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["115:3", 0], "vae": ["115:39", 0] }
        },
        "115:37": {
            "class_type": "UNETLoader",
            "inputs": { "unet_name": IMAGE_EDIT_UNET, "weight_dtype": "default" }
        },
        "115:38": {
            "class_type": "CLIPLoader",
            "inputs": { "clip_name": CLIP_MODEL, "type": "qwen_image", "device": "default" }
        },
        "115:39": {
            "class_type": "VAELoader",
            "inputs": { "vae_name": VAE_MODEL }
        },
        "115:66": {
            "class_type": "ModelSamplingAuraFlow",
            "inputs": { "shift": 3, "model": ["115:89", 0] }
        },
        "115:75": {
            "class_type": "CFGNorm",
            "inputs": { "strength": 1, "model": ["115:66", 0] }
        },
        "115:88": {
            "class_type": "VAEEncode",
            "inputs": { "pixels": ["115:93", 0], "vae": ["115:39", 0] }
        },
        "115:89": {
            "class_type": "LoraLoaderModelOnly",
            "inputs": { "lora_name": IMAGE_EDIT_LORA, "strength_model": 1, "model": ["115:37", 0] }
        },
        "115:93": {
            "class_type": "ImageScaleToTotalPixels",
            "inputs": { "upscale_method": "lanczos", "megapixels": 1, "image": ["78", 0] }
        },
        "115:110": {
            "class_type": "TextEncodeQwenImageEditPlus",
            "inputs": {
                "prompt": req.negative_prompt,
                "clip": ["115:38", 0],
                "vae": ["115:39", 0],
                "image1": ["115:93", 0]
            }
        },
        "115:111": {
            "class_type": "TextEncodeQwenImageEditPlus",
            "inputs": {
                "prompt": req.prompt,
                "clip": ["115:38", 0],
                "vae": ["115:39", 0],
                "image1": ["115:93", 0]
            }
        },
        "115:112": {
            "class_type": "EmptySD3LatentImage",
            "inputs": { "width": req.width, "height": req.height, "batch_size": req.batch_size }
        },
        "115:116": {
            "class_type": "PreviewImage",
            "inputs": { "images": ["115:8", 0] }
        }
    })
}
