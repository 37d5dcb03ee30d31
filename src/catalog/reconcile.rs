use std::path::Path;

use reqwest::Url;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::html::trim_html;
use super::metadata::{
    extension_block, load_json, metadata_needed_for, verify_overwrite_eligibility, write_json,
    SidecarKind,
};
use super::model_type::ModelType;
use super::paths::{host_path, info_path, next_example_image_path};
use crate::civitai::{ModelVersion, VersionImage};
use crate::context::HelperContext;
use crate::download::DownloadJob;
use crate::error::{Error, Result};

/// What a reconcile pass changed on disk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub info_written: bool,
    pub host_written: bool,
    pub examples_downloaded: usize,
}

/// Merges remote metadata into a model's sidecars.
///
/// Descriptions are reduced to text when `clean_html` is set, a provenance
/// block is stamped, example images are fetched when enabled, then the
/// primary sidecar and, when the feature flag allows, the host sidecar are
/// written.
///
/// Without `refetch_old` the primary sidecar is always written and an
/// existing host sidecar is left alone. With `refetch_old` an existing
/// primary sidecar recording a different remote id fails with
/// `VersionMismatch` before anything is written.
pub async fn process_model_info(
    ctx: &HelperContext,
    model_path: &Path,
    mut model_info: Value,
    model_type: ModelType,
    refetch_old: bool,
) -> Result<ReconcileOutcome> {
    let metadata = &ctx.settings.metadata;
    let info_file = info_path(model_path);
    let host_file = host_path(model_path);
    let existing = load_json(&info_file);
    if existing.is_none() {
        debug!("No existing model info for {}", model_path.display());
    }

    let Some(record) = model_info.as_object_mut() else {
        return Err(Error::InvalidFormat("model info is not a JSON object".to_string()));
    };

    let parent = record
        .entry("model")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(parent) = parent.as_object_mut() {
        clean_description(parent, metadata.clean_html);
    }
    clean_description(record, metadata.clean_html);

    let skeleton = record
        .get("skeleton_file")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let extensions = extension_block(record.get("extensions"), skeleton);
    record.insert("extensions".to_string(), extensions);

    let mut outcome = ReconcileOutcome::default();
    if metadata.download_examples {
        outcome.examples_downloaded =
            download_examples(ctx, model_path, record, existing.as_ref()).await;
    }
    let updated = outcome.examples_downloaded > 0;

    if refetch_old {
        let eligible = verify_overwrite_eligibility(&info_file, SidecarKind::Info, &model_info)
            .inspect_err(|e| warn!("{}, aborting", e))?;
        let needed = metadata_needed_for(&info_file, SidecarKind::Info, true) || updated;
        if eligible && needed {
            write_json(&info_file, &model_info)?;
            outcome.info_written = true;
        }
    } else {
        write_json(&info_file, &model_info)?;
        outcome.info_written = true;
    }
    if outcome.info_written {
        info!("Write model civitai info to file: {}", info_file.display());
    }

    if !metadata.write_host_metadata {
        return Ok(outcome);
    }
    // Never replace a host sidecar the user may have edited
    if !metadata_needed_for(&host_file, SidecarKind::Host, refetch_old) {
        debug!("Metadata not needed for: {}", host_file.display());
        return Ok(outcome);
    }

    let host_data = host_metadata(&model_info, model_type);
    let eligible = !refetch_old
        || verify_overwrite_eligibility(&host_file, SidecarKind::Host, &host_data)?;
    if eligible {
        write_json(&host_file, &host_data)?;
        info!("Write model webui info to file: {}", host_file.display());
        outcome.host_written = true;
    }

    Ok(outcome)
}

fn clean_description(record: &mut Map<String, Value>, clean_html: bool) {
    let description = match record.get("description") {
        Some(Value::String(description)) if clean_html && !description.is_empty() => {
            trim_html(description)
        }
        Some(Value::String(description)) => description.clone(),
        Some(Value::Null) | None => String::new(),
        Some(_) => return,
    };
    record.insert("description".to_string(), Value::String(description));
}

/// Saves allowed example images beside the model and records each as
/// `local_file`. Images already saved on a previous pass are reused.
async fn download_examples(
    ctx: &HelperContext,
    model_path: &Path,
    record: &mut Map<String, Value>,
    existing: Option<&Value>,
) -> usize {
    let ladder = &ctx.settings.nsfw;
    let ceiling = &ctx.settings.metadata.nsfw_ceiling;
    let mut downloaded = 0;

    let Some(Value::Array(images)) = record.get_mut("images") else {
        return 0;
    };

    for image in images.iter_mut() {
        let parsed: VersionImage = serde_json::from_value(image.clone()).unwrap_or_default();
        let Some(url) = parsed.url.as_deref().filter(|url| !url.is_empty()) else {
            continue;
        };
        if !ladder.allows(ceiling, Some(parsed.rating(ladder))) {
            debug!("Skip NSFW example image {}", url);
            continue;
        }

        if let Some(local) = existing.and_then(|existing| local_image(existing, url)) {
            image["local_file"] = json!(local);
            continue;
        }

        let ext = Url::parse(url)
            .ok()
            .and_then(|parsed| {
                Path::new(parsed.path())
                    .extension()
                    .map(|ext| format!(".{}", ext.to_string_lossy()))
            })
            .unwrap_or_default();
        let mut out_path = next_example_image_path(model_path).into_os_string();
        out_path.push(ext);

        let result = ctx.downloader.run(DownloadJob::to_path(url, &out_path)).await;
        if !result.success {
            warn!("Failed to download model image {}: {}", url, result.message);
            continue;
        }

        image["local_file"] = json!(Path::new(&out_path).to_string_lossy());
        downloaded += 1;
    }

    downloaded
}

/// Local copy of `url` recorded in an earlier sidecar
fn local_image(existing: &Value, url: &str) -> Option<String> {
    existing
        .get("images")?
        .as_array()?
        .iter()
        .find(|image| image.get("url").and_then(Value::as_str) == Some(url))?
        .get("local_file")?
        .as_str()
        .map(str::to_string)
}

/// Host-app projection of a primary sidecar record
pub fn host_metadata(model_info: &Value, model_type: ModelType) -> Value {
    let version = ModelVersion::from_value(model_info).unwrap_or_default();
    let mut data = Map::new();

    let description = model_info
        .get("model")
        .and_then(|parent| parent.get("description"))
        .cloned()
        .unwrap_or_else(|| json!(""));
    data.insert("description".to_string(), description);

    match model_info.get("description") {
        None | Some(Value::Null) => {}
        Some(notes) => {
            data.insert("notes".to_string(), notes.clone());
        }
    }

    data.insert("sd version".to_string(), json!(sd_version(&version.base_model)));

    if let Some(vae) = version.files.iter().filter(|f| f.kind == "VAE").last() {
        data.insert("vae".to_string(), json!(vae.name));
    }

    if let Some(first) = version.trained_words.first().filter(|w| !w.is_empty()) {
        let separator = if first.contains(',') { " || " } else { ", " };
        data.insert(
            "activation text".to_string(),
            json!(version.trained_words.join(separator)),
        );
    }

    if model_type.has_weight() {
        data.insert("preferred weight".to_string(), json!(0));
    }

    let skeleton = model_info
        .get("skeleton_file")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    data.insert(
        "extensions".to_string(),
        extension_block(model_info.get("extensions"), skeleton),
    );

    Value::Object(data)
}

/// Host base-model tag from the 4th character of `baseModel`
/// ("SD 1.5" → SD1, "SD 2.1" → SD2, "SDXL 1.0" → SDXL)
fn sd_version(base_model: &str) -> &'static str {
    match base_model.chars().nth(3) {
        Some('1') => "SD1",
        Some('2') => "SD2",
        Some('L') => "SDXL",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sd_version_reads_fourth_character() {
        assert_eq!(sd_version("SD 1.5"), "SD1");
        assert_eq!(sd_version("SD 2.1 768"), "SD2");
        assert_eq!(sd_version("SDXL 1.0"), "SDXL");
        assert_eq!(sd_version("Pony"), "Unknown");
        assert_eq!(sd_version(""), "Unknown");
    }

    #[test]
    fn host_projection_derives_fields() {
        let info = json!({
            "id": 123,
            "baseModel": "SDXL 1.0",
            "description": "version notes",
            "trainedWords": ["a, b", "c"],
            "files": [{"name": "v.pt", "type": "VAE"}, {"name": "m.safetensors", "type": "Model"}],
            "model": {"description": "parent text"}
        });

        let host = host_metadata(&info, ModelType::Lora);
        assert_eq!(host["description"], "parent text");
        assert_eq!(host["notes"], "version notes");
        assert_eq!(host["sd version"], "SDXL");
        assert_eq!(host["vae"], "v.pt");
        assert_eq!(host["activation text"], "a, b || c");
        assert_eq!(host["preferred weight"], 0);

        let checkpoint = host_metadata(&json!({"trainedWords": ["x", "y"]}), ModelType::Checkpoint);
        assert_eq!(checkpoint["activation text"], "x, y");
        assert!(checkpoint.get("preferred weight").is_none());
        assert!(checkpoint.get("notes").is_none());
    }

    #[test]
    fn local_images_match_by_url() {
        let existing = json!({"images": [{"url": "u1", "local_file": "/m/a.example.0.png"}, {"url": "u2"}]});
        assert_eq!(local_image(&existing, "u1"), Some("/m/a.example.0.png".to_string()));
        assert_eq!(local_image(&existing, "u2"), None);
    }
}
