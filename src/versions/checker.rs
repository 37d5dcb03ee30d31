use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::catalog::{
    info_path, is_model_file, load_json, search_local_model_info_by_version_id, walk_models,
    ModelType,
};
use crate::civitai::{id_of, RemoteModel};
use crate::context::HelperContext;
use crate::error::Result;

/// A newer remote version of a local model
#[derive(Debug, Clone)]
pub struct NewVersionInfo {
    pub model_path: PathBuf,
    pub model_id: String,
    pub model_name: String,
    pub version_id: String,
    pub version_name: String,
    pub description: String,
    /// Absent when the remote offers no direct download
    pub download_url: Option<String>,
    /// First preview image of the new version
    pub img_url: Option<String>,
    pub model_type: ModelType,
}

/// Compares the version recorded next to `model_path` with the newest
/// version of its parent model on the remote service.
///
/// Returns `None` when the sidecar is missing or lacks ids, when the remote
/// has nothing newer, or when the newer version already sits in the same
/// directory under another file name.
pub async fn check_for_new_version(
    ctx: &HelperContext,
    model_path: &Path,
    model_type: ModelType,
) -> Result<Option<NewVersionInfo>> {
    if !is_model_file(model_path) {
        debug!("Not a model file: {}", model_path.display());
        return Ok(None);
    }

    let Some(new_version) = newest_remote_version(ctx, model_path, model_type).await? else {
        return Ok(None);
    };

    let folder = model_path.parent().unwrap_or(model_path);
    if let Some(existing) = search_local_model_info_by_version_id(folder, &new_version.version_id) {
        debug!(
            "New version {} is already downloaded as {}",
            new_version.version_id,
            existing.display()
        );
        return Ok(None);
    }

    info!(
        "Found new version for {}: {} ({})",
        model_path.display(),
        new_version.version_name,
        new_version.version_id
    );
    Ok(Some(new_version))
}

async fn newest_remote_version(
    ctx: &HelperContext,
    model_path: &Path,
    model_type: ModelType,
) -> Result<Option<NewVersionInfo>> {
    let info_file = info_path(model_path);
    let Some(local) = load_json(&info_file) else {
        debug!("No usable sidecar for {}", model_path.display());
        return Ok(None);
    };

    let model_id = id_of(&local, "modelId");
    let local_version_id = id_of(&local, "id");
    if model_id.is_empty() || local_version_id.is_empty() {
        debug!("Sidecar of {} records no remote ids", model_path.display());
        return Ok(None);
    }

    let remote = ctx.civitai.model_by_id(&model_id).await;
    ctx.pause().await;
    let Some(remote) = remote? else {
        return Ok(None);
    };
    let remote = RemoteModel::from_value(&remote)?;

    let Some(latest) = remote.model_versions.into_iter().next() else {
        debug!("Model {} has no versions", model_id);
        return Ok(None);
    };
    if latest.id.is_empty() || latest.id == local_version_id {
        return Ok(None);
    }

    let img_url = latest
        .images
        .first()
        .and_then(|image| image.url.clone())
        .filter(|url| !url.is_empty());

    Ok(Some(NewVersionInfo {
        model_path: model_path.to_path_buf(),
        model_id,
        model_name: remote.name,
        version_id: latest.id,
        version_name: latest.name,
        description: latest.description.unwrap_or_default(),
        download_url: latest.download_url.filter(|url| !url.is_empty()),
        img_url,
        model_type,
    }))
}

/// Runs [`check_for_new_version`] over every model of `types`, reporting
/// each new version once even when several local files point at it.
///
/// Per-model failures are logged and skipped.
pub async fn check_models_new_version(
    ctx: &HelperContext,
    types: &[ModelType],
) -> Vec<NewVersionInfo> {
    let models = walk_models(&ctx.folders, types);
    info!("Checking {} models for new versions", models.len());

    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for (model_path, model_type) in models {
        match check_for_new_version(ctx, &model_path, model_type).await {
            Ok(Some(new_version)) => {
                if seen.insert(new_version.version_id.clone()) {
                    found.push(new_version);
                } else {
                    debug!("Version {} already reported", new_version.version_id);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Checking {} for updates failed: {}", model_path.display(), e),
        }
    }

    info!("Found {} new versions", found.len());
    found
}
