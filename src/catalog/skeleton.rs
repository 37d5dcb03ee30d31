use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::model_type::ModelType;
use crate::error::Result;
use crate::safetensors::{is_safetensors_file, SafetensorsReader};

static ITERATION_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+_").unwrap());

/// Empty primary-sidecar record for models unknown to the remote service
pub fn metadata_skeleton() -> Value {
    json!({
        "id": "",
        "modelId": "",
        "name": "",
        "trainedWords": [],
        "baseModel": "Unknown",
        "description": "",
        "model": {
            "name": "",
            "type": "",
            "nsfw": "",
            "poi": ""
        },
        "files": [
            {
                "name": "",
                "sizeKB": 0,
                "type": "Model",
                "hashes": {
                    "AutoV2": "",
                    "SHA256": ""
                }
            }
        ],
        "tags": [],
        "downloadUrl": "",
        "skeleton_file": true
    })
}

/// Fills the skeleton with what can be learned locally: file name, size,
/// digests and, for safetensors files, the training captions recorded in
/// `ss_tag_frequency`.
pub fn skeleton_info(model_path: &Path, sha256: &str, model_type: ModelType) -> Result<Value> {
    let mut info = metadata_skeleton();

    let filename = model_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let size_kb = std::fs::metadata(model_path)?.len() / 1024;
    let auto_v2: String = sha256.chars().take(10).collect();

    info["model"]["name"] = json!(filename);
    info["model"]["type"] = json!(model_type.key());

    let file = &mut info["files"][0];
    file["name"] = json!(filename);
    file["sizeKB"] = json!(size_kb);
    file["hashes"]["SHA256"] = json!(sha256);
    file["hashes"]["AutoV2"] = json!(auto_v2);

    let (trained_words, tags) = training_captions(model_path);
    info["trainedWords"] = json!(trained_words);
    info["tags"] = json!(tags);

    Ok(info)
}

/// Concept names and caption tags from kohya-style training metadata.
/// Concepts are stored as `<repeats>_<word>`; the prefix is dropped.
fn training_captions(model_path: &Path) -> (Vec<String>, Vec<String>) {
    let mut trained_words = Vec::new();
    let mut tags = Vec::new();

    if !is_safetensors_file(model_path) {
        return (trained_words, tags);
    }
    let reader = match SafetensorsReader::new(model_path) {
        Ok(reader) => reader,
        Err(e) => {
            debug!("No readable metadata in {}: {}", model_path.display(), e);
            return (trained_words, tags);
        }
    };
    let Some(Value::Object(frequency)) = reader.get_metadata_json("ss_tag_frequency") else {
        return (trained_words, tags);
    };

    for (concept, captions) in frequency {
        trained_words.push(ITERATION_PREFIX.replace(&concept, "").into_owned());

        if let Value::Object(captions) = captions {
            for tag in captions.keys() {
                let tag = tag.replace(',', "");
                let tag = tag.trim();
                if !tag.is_empty() {
                    tags.push(tag.to_string());
                }
            }
        }
    }

    (trained_words, tags)
}
