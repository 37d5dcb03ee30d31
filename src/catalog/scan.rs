use std::path::{Path, PathBuf};

use async_stream::stream;
use futures::Stream;
use serde_json::Value;
use tracing::{error, info, warn};

use super::lookup::{find_model_by_name, search_local_model_info_by_version_id, walk_models};
use super::metadata::metadata_needed;
use super::model_type::ModelType;
use super::preview::{download_preview, PreviewOutcome};
use super::reconcile::{process_model_info, ReconcileOutcome};
use super::skeleton::skeleton_info;
use crate::civitai::{model_id_from_url, ModelVersion, VersionFile};
use crate::context::HelperContext;
use crate::download::{BatchItem, DownloadEvent, DownloadJob, DownloadOutcome, DuplicatePolicy};
use crate::error::{Error, Result};
use crate::hash::{cache_key, HashEvent, HashMode};

/// Element of a catalog scan's lazy event sequence
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Human-readable step, such as which model is being processed
    Status(String),
    /// Hashing progress of the current model
    Progress { ratio: f32, message: String },
    /// The scan moved on to the `index`-th model (1-based)
    Model { index: usize, total: usize, path: PathBuf },
    /// Terminal element
    Finished(ScanSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub total: usize,
    pub message: String,
}

/// Attaches remote metadata to every model of `types` that needs it.
///
/// Per model: hash, look the digest up remotely, fall back to skeleton
/// metadata when the remote has no record, reconcile the sidecars, then
/// fetch a preview. Remote requests are spaced by the configured delay.
pub fn scan_models<'a>(
    ctx: &'a HelperContext,
    types: Vec<ModelType>,
    refetch_old: bool,
) -> impl Stream<Item = ScanEvent> + 'a {
    stream! {
        if types.is_empty() {
            let message = "Model Types is None, can not scan.".to_string();
            warn!("{}", message);
            yield ScanEvent::Finished(ScanSummary { scanned: 0, total: 0, message });
            return;
        }

        info!("Start scan_model for {:?}", types);
        let models = walk_models(&ctx.folders, &types);
        let total = models.len();
        let write_host = ctx.settings.metadata.write_host_metadata;
        let mut scanned = 0;

        for (index, (model_path, model_type)) in models.into_iter().enumerate() {
            yield ScanEvent::Model { index: index + 1, total, path: model_path.clone() };

            let filename = model_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            if metadata_needed(&model_path, refetch_old, write_host) {
                yield ScanEvent::Status(format!("Creating model info for: {}", filename));

                let mut digest = None;
                let key = cache_key(model_type.hash_namespace(), &model_path);
                for await event in ctx.hashes.hash(model_path.clone(), Some(key), HashMode::Full) {
                    match event {
                        Ok(HashEvent::Progress { ratio, message }) => {
                            yield ScanEvent::Progress { ratio, message };
                        }
                        Ok(HashEvent::Digest(sha256)) => digest = Some(Ok(sha256)),
                        Err(e) => digest = Some(Err(e)),
                    }
                }

                let sha256 = match digest {
                    Some(Ok(sha256)) => sha256,
                    Some(Err(Error::HashingDisabled)) => {
                        let message = Error::HashingDisabled.to_string();
                        error!("{}", message);
                        yield ScanEvent::Finished(ScanSummary { scanned, total, message });
                        return;
                    }
                    other => {
                        let reason = match other {
                            Some(Err(e)) => e.to_string(),
                            _ => "no digest".to_string(),
                        };
                        let message = format!("failed generating SHA256 for model: {} ({})", filename, reason);
                        warn!("{}", message);
                        yield ScanEvent::Status(message);
                        ctx.pause().await;
                        continue;
                    }
                };

                yield ScanEvent::Status("Requesting model information from Civitai".to_string());
                let model_info = match ctx.civitai.version_by_hash(&sha256).await {
                    Ok(Some(info)) => info,
                    Ok(None) => {
                        info!("{} is not on the remote service, writing skeleton metadata", filename);
                        match skeleton_info(&model_path, &sha256, model_type) {
                            Ok(info) => info,
                            Err(e) => {
                                warn!("Failed to build skeleton metadata for {}: {}", filename, e);
                                ctx.pause().await;
                                continue;
                            }
                        }
                    }
                    Err(e) => {
                        let message = format!("Failed to get model info for {}: {}", filename, e);
                        warn!("{}", message);
                        yield ScanEvent::Status(message);
                        ctx.pause().await;
                        continue;
                    }
                };

                match process_model_info(ctx, &model_path, model_info, model_type, refetch_old).await {
                    Ok(_) => {}
                    Err(e) if e.is_version_mismatch() => {
                        yield ScanEvent::Status(format!("{}: {}", filename, e));
                    }
                    Err(e) => {
                        let message = format!("Failed to write metadata for {}: {}", filename, e);
                        warn!("{}", message);
                        yield ScanEvent::Status(message);
                        ctx.pause().await;
                        continue;
                    }
                }

                ctx.pause().await;
            } else {
                info!("Model metadata not needed for {}", filename);
            }

            scanned += 1;

            if let PreviewOutcome::Downloaded(path) = download_preview(ctx, &model_path, None).await {
                yield ScanEvent::Status(format!("Saved preview {}", path.display()));
            }
        }

        let message = format!("Done. Successfully scanned {} of {} models.", scanned, total);
        info!("{}", message);
        yield ScanEvent::Finished(ScanSummary { scanned, total, message });
    }
}

/// Attaches the newest remote version of a model to a named local file
pub async fn fetch_model_info(
    ctx: &HelperContext,
    model_type: ModelType,
    model_name: &str,
    model_url_or_id: &str,
) -> Result<(PathBuf, ReconcileOutcome)> {
    let model_id = model_id_from_url(model_url_or_id).ok_or_else(|| {
        Error::MissingInput(format!("failed to parse model id from url: {}", model_url_or_id))
    })?;

    let model_path = find_model_by_name(&ctx.folders, model_type, model_name)
        .ok_or_else(|| Error::MissingInput(format!("Could not get Model Path for {}", model_name)))?;

    let version = ctx
        .civitai
        .latest_version_by_model_id(&model_id)
        .await?
        .ok_or_else(|| Error::MissingInput(format!("Model {} has no version on the remote service", model_id)))?;

    let outcome = process_model_info(ctx, &model_path, version, model_type, false).await?;
    download_preview(ctx, &model_path, None).await;

    Ok((model_path, outcome))
}

/// A remote model version to download into the catalog
#[derive(Debug, Clone)]
pub struct VersionDownload {
    pub model_type: ModelType,
    /// Folder below the type's root; empty or `/` for the root itself
    pub subfolder: String,
    pub version_id: String,
    /// Base name for non-VAE files; the remote name is kept when `None`
    pub filename: Option<String>,
    /// Remote file types to fetch unless `download_all`
    pub file_types: Vec<String>,
    pub download_all: bool,
    pub duplicate: DuplicatePolicy,
    pub preferred_preview: Option<String>,
}

/// Name and destination of one remote file. Non-VAE files are renamed to
/// `<basename>.<remote ext>`; VAE files keep their name and go to the VAE
/// folder.
fn parse_file_info(file: &VersionFile, basename: Option<&str>) -> Option<(String, String)> {
    let url = file.download_url.clone().filter(|url| !url.is_empty())?;
    let name = match basename.filter(|b| !b.is_empty()) {
        Some(basename) if file.kind != "VAE" => {
            let ext = file.name.rsplit('.').next().unwrap_or_default();
            format!("{}.{}", basename, ext)
        }
        _ => file.name.clone(),
    };
    Some((url, name))
}

/// Downloads the files of a remote version, then writes its metadata and a
/// preview next to the primary file.
pub fn download_model_version<'a>(
    ctx: &'a HelperContext,
    request: VersionDownload,
) -> impl Stream<Item = DownloadEvent> + 'a {
    stream! {
        let root = ctx.folders.folder(request.model_type).to_path_buf();
        if !root.exists() {
            if let Err(e) = std::fs::create_dir_all(&root) {
                yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                    "Failed to create model folder {}: {}", root.display(), e
                )));
                return;
            }
        }

        let subfolder = request.subfolder.trim_start_matches(['/', '\\']);
        let folder = if subfolder.is_empty() { root.clone() } else { root.join(subfolder) };
        if !folder.is_dir() {
            yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                "Model folder is not a dir: {}", folder.display()
            )));
            return;
        }

        let version_info = match ctx.civitai.version_by_id(&request.version_id).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                    "Version {} was not found on the remote service", request.version_id
                )));
                return;
            }
            Err(e) => {
                yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                    "Failed to get version info: {}", e
                )));
                return;
            }
        };

        if let Some(existing) = search_local_model_info_by_version_id(&folder, &request.version_id) {
            let message = format!("This model version already exists at `{}`", existing.display());
            info!("{}", message);
            yield DownloadEvent::Finished(DownloadOutcome::failed(message));
            return;
        }

        let version = ModelVersion::from_value(&version_info).unwrap_or_default();
        let items = batch_items(ctx, &request, &version, &folder);
        if items.is_empty() {
            yield DownloadEvent::Finished(DownloadOutcome::failed("Failed to find a download url"));
            return;
        }

        let mut outcome = None;
        for await event in ctx.downloader.download_all(items) {
            match event {
                DownloadEvent::Finished(finished) => outcome = Some(finished),
                other => yield other,
            }
        }
        let Some(outcome) = outcome else {
            yield DownloadEvent::Finished(DownloadOutcome::failed("Download ended without a result"));
            return;
        };
        if !outcome.success {
            yield DownloadEvent::Finished(outcome);
            return;
        }

        if let Some(model_path) = outcome.path.as_deref() {
            finish_version_download(ctx, model_path, version_info, &request).await;
        }

        yield DownloadEvent::Finished(outcome);
    }
}

fn batch_items(
    ctx: &HelperContext,
    request: &VersionDownload,
    version: &ModelVersion,
    folder: &Path,
) -> Vec<BatchItem> {
    let headers = ctx.civitai.headers().clone();
    let basename = request.filename.as_deref();

    let mut items: Vec<BatchItem> = version
        .files
        .iter()
        .filter(|file| request.download_all || request.file_types.contains(&file.kind))
        .filter_map(|file| {
            let (url, name) = parse_file_info(file, basename)?;
            let target = if file.kind == "VAE" { ctx.folders.vae() } else { folder };
            Some(BatchItem {
                job: DownloadJob::to_folder(url, target, Some(name))
                    .with_duplicate(request.duplicate)
                    .with_headers(headers.clone()),
                primary: file.kind == "Model",
            })
        })
        .collect();

    if items.is_empty() {
        if let Some(url) = version.download_url.clone().filter(|url| !url.is_empty()) {
            // Without a file entry the remote name comes from Content-Disposition
            items.push(BatchItem {
                job: DownloadJob::to_folder(url, folder, None)
                    .with_duplicate(request.duplicate)
                    .with_headers(headers),
                primary: true,
            });
        }
    }

    items
}

async fn finish_version_download(
    ctx: &HelperContext,
    model_path: &Path,
    version_info: Value,
    request: &VersionDownload,
) {
    if let Err(e) = process_model_info(ctx, model_path, version_info, request.model_type, false).await {
        warn!("Failed to write metadata for {}: {}", model_path.display(), e);
    }
    download_preview(ctx, model_path, request.preferred_preview.as_deref()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, kind: &str, url: Option<&str>) -> VersionFile {
        VersionFile {
            name: name.to_string(),
            kind: kind.to_string(),
            download_url: url.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn renames_all_but_vae_files() {
        let model = file("remote.safetensors", "Model", Some("https://x/1"));
        assert_eq!(
            parse_file_info(&model, Some("mine")),
            Some(("https://x/1".to_string(), "mine.safetensors".to_string()))
        );

        let vae = file("vae.pt", "VAE", Some("https://x/2"));
        assert_eq!(parse_file_info(&vae, Some("mine")).unwrap().1, "vae.pt");
        assert_eq!(parse_file_info(&model, None).unwrap().1, "remote.safetensors");
        assert_eq!(parse_file_info(&file("a", "Model", None), None), None);
    }
}
