use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::{
    existing_preview, load_json, locate_model_from_partial, model_name_from_info, preview_files,
    relative_path, ModelType,
};
use crate::civitai::ModelVersion;
use crate::context::HelperContext;
use crate::error::{Error, Result};
use crate::hash::{cache_key, HashMode};

/// One model file taking part in a duplicate group
#[derive(Debug, Clone)]
pub struct DuplicateEntry {
    /// Sidecar name without `.civitai.info`
    pub model_name: String,
    /// Model name on the remote service
    pub civitai_name: String,
    pub description: String,
    pub model_path: PathBuf,
    /// Path below the type's folder, `/`-separated with a leading `/`
    pub subpath: String,
    pub model_type: ModelType,
    /// Uppercase SHA-256
    pub hash: String,
    /// Key the host UI uses to find the model card
    pub search_term: String,
    pub preview: Option<PathBuf>,
}

/// Files of one type sharing a digest
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub hash: String,
    pub entries: Vec<DuplicateEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    /// Groups of more than one file, per model type
    pub groups: BTreeMap<ModelType, Vec<DuplicateGroup>>,
}

impl DuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty)
    }

    pub fn group_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Search key of a model in the host UI: the subpath plus lowercase hash,
/// or for hypernetworks the subpath without its extension
pub fn make_search_term(model_type: ModelType, subpath: &str, sha256: &str) -> String {
    if model_type == ModelType::Hypernetwork {
        return match subpath.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => subpath.to_string(),
        };
    }
    format!("{} {}", subpath, sha256.to_lowercase())
}

fn subpath_of(model_path: &Path, folder: &Path) -> String {
    let relative = relative_path(model_path, folder);
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{}", joined)
    }
}

/// Buckets the models of `types` by content digest and reports every bucket
/// holding more than one file.
///
/// With `cached_hash` the SHA-256 recorded in each sidecar is trusted and
/// the hash engine only runs for sidecars lacking one. A LyCORIS file that
/// resolves to the same file as a LoRA entry with the same digest is left
/// out, so aliased folders do not report a file as its own duplicate.
pub async fn scan_for_duplicates(
    ctx: &HelperContext,
    types: &[ModelType],
    cached_hash: bool,
) -> Result<DuplicateReport> {
    if types.is_empty() {
        return Err(Error::MissingInput("Model Types is None. Will not scan.".to_string()));
    }
    info!("Start scan_for_dups for {:?}", types);

    let mut wanted: Vec<ModelType> = types.to_vec();
    wanted.sort();
    wanted.dedup();

    let mut buckets: BTreeMap<ModelType, BTreeMap<String, Vec<DuplicateEntry>>> = BTreeMap::new();

    for model_type in wanted {
        let folder = ctx.folders.folder(model_type).to_path_buf();
        let entries = scan_dir(ctx, &folder, model_type, cached_hash).await?;

        let mut by_hash: BTreeMap<String, Vec<DuplicateEntry>> = BTreeMap::new();
        for entry in entries {
            if model_type == ModelType::Lycoris {
                let loras = buckets.get(&ModelType::Lora);
                if is_lycoris_lora(&entry, loras) {
                    debug!("{} is the same file as a LoRA entry", entry.model_path.display());
                    continue;
                }
            }
            by_hash.entry(entry.hash.clone()).or_default().push(entry);
        }
        buckets.insert(model_type, by_hash);
    }

    let mut report = DuplicateReport::default();
    for (model_type, by_hash) in buckets {
        let groups = by_hash
            .into_iter()
            .filter(|(_, entries)| entries.len() > 1)
            .map(|(hash, entries)| DuplicateGroup { hash, entries })
            .collect();
        report.groups.insert(model_type, groups);
    }

    info!("Found {} duplicate groups", report.group_count());
    Ok(report)
}

fn is_lycoris_lora(
    lyco: &DuplicateEntry,
    loras: Option<&BTreeMap<String, Vec<DuplicateEntry>>>,
) -> bool {
    let Some(candidates) = loras.and_then(|loras| loras.get(&lyco.hash)) else {
        return false;
    };
    let Ok(lyco_path) = fs::canonicalize(&lyco.model_path) else {
        return false;
    };
    candidates
        .iter()
        .filter_map(|lora| fs::canonicalize(&lora.model_path).ok())
        .any(|lora_path| lora_path == lyco_path)
}

async fn scan_dir(
    ctx: &HelperContext,
    folder: &Path,
    model_type: ModelType,
    cached_hash: bool,
) -> Result<Vec<DuplicateEntry>> {
    debug!("Scanning path: {}", folder.display());

    let info_files: Vec<PathBuf> = WalkDir::new(folder)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| model_name_from_info(path).is_some())
        .collect();

    let mut entries = Vec::new();
    for info_file in info_files {
        match parse_metadata(ctx, folder, &info_file, model_type, cached_hash).await {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(Error::HashingDisabled) => return Err(Error::HashingDisabled),
            Err(e) => warn!("Error occurred on file `{}`: {}", info_file.display(), e),
        }
    }
    Ok(entries)
}

async fn parse_metadata(
    ctx: &HelperContext,
    folder: &Path,
    info_file: &Path,
    model_type: ModelType,
    cached_hash: bool,
) -> Result<Option<DuplicateEntry>> {
    let Some(model_name) = model_name_from_info(info_file) else {
        return Ok(None);
    };
    let Some(info) = load_json(info_file) else {
        return Ok(None);
    };
    let root = info_file.parent().unwrap_or(folder);
    let version = ModelVersion::from_value(&info)?;

    let Some(model_file) = version.files.first() else {
        debug!("No file entry in {}", info_file.display());
        return Ok(None);
    };
    let ext = model_file.name.rsplit('.').next().unwrap_or_default();

    let direct = root.join(format!("{}.{}", model_name, ext));
    let model_path = if direct.is_file() {
        direct
    } else {
        match locate_model_from_partial(root, &model_name) {
            Some(path) => path,
            None => {
                debug!("No model path found for {}", info_file.display());
                return Ok(None);
            }
        }
    };

    let recorded = model_file
        .hashes
        .sha256
        .as_deref()
        .filter(|sha| cached_hash && !sha.is_empty());
    let hash = match recorded {
        Some(sha) => sha.to_uppercase(),
        None => {
            if cached_hash {
                debug!("No sha256 hash in metadata for {}. Generating one.", model_path.display());
            }
            let key = cache_key(model_type.hash_namespace(), &model_path);
            ctx.hashes
                .hash_file(&model_path, Some(key), HashMode::Full)
                .await?
                .to_uppercase()
        }
    };

    let description = parent_description(&info)
        .or_else(|| info.get("description").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();
    let civitai_name = version.model.map(|m| m.name).unwrap_or_default();
    let subpath = subpath_of(&model_path, folder);
    let search_term = make_search_term(model_type, &subpath, &hash);
    let preview = existing_preview(&model_path).or_else(|| {
        preview_files(&model_path, true)
            .into_iter()
            .find(|candidate| candidate.is_file())
    });

    Ok(Some(DuplicateEntry {
        model_name,
        civitai_name,
        description,
        model_path,
        subpath,
        model_type,
        hash,
        search_term,
        preview,
    }))
}

fn parent_description(info: &Value) -> Option<String> {
    info.get("model")?
        .get("description")?
        .as_str()
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}
