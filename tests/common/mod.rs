#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use civhelp::catalog::ModelType;
use civhelp::{HelperContext, Settings};

/// Settings for a model tree under `root`, talking to `api_base`, with no
/// waits between requests or retries
pub fn test_settings(root: &Path, api_base: &str) -> Settings {
    let mut settings = Settings::with_root(root);
    settings.civitai.api_base = api_base.to_string();
    settings.network.retry_unit_ms = 0;
    settings.network.max_retries = 2;
    settings.network.request_delay_ms = 0;
    settings.network.timeout_secs = 10;
    settings
}

pub fn test_context(root: &Path, api_base: &str) -> HelperContext {
    HelperContext::new(test_settings(root, api_base)).unwrap()
}

/// Writes a model file into the folder of `model_type`, creating the folder
pub fn write_model(ctx: &HelperContext, model_type: ModelType, name: &str, data: &[u8]) -> PathBuf {
    let folder = ctx.folders.folder(model_type);
    fs::create_dir_all(folder).unwrap();
    let path = folder.join(name);
    fs::write(&path, data).unwrap();
    path
}

/// A minimal safetensors file: 8-byte header length, JSON header, tensor data
pub fn safetensors_bytes(header: &str, data: &[u8]) -> Vec<u8> {
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(data);
    bytes
}

pub const HELLO_WORLD_SHA256: &str =
    "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
