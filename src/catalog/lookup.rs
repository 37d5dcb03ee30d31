use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::folders::ModelFolders;
use super::metadata::load_json;
use super::model_type::{is_model_file, ModelType};
use super::paths::{locate_model_from_partial, model_name_from_info};
use crate::civitai::id_of;

/// Model files of the requested types, walked recursively with symlinks
/// followed, in type order
pub fn walk_models(folders: &ModelFolders, types: &[ModelType]) -> Vec<(PathBuf, ModelType)> {
    let mut models = Vec::new();
    for (model_type, folder) in folders.iter() {
        if !types.contains(&model_type) {
            continue;
        }
        debug!("Scanning path: {}", folder.display());
        for entry in WalkDir::new(folder)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            let path = entry.path();
            if entry.file_type().is_file() && is_model_file(path) {
                models.push((path.to_path_buf(), model_type));
            }
        }
    }
    models
}

/// Finds a model by file name under the type's search folders
pub fn find_model_by_name(folders: &ModelFolders, model_type: ModelType, name: &str) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }
    folders
        .search_folders(model_type)
        .into_iter()
        .flat_map(|folder| {
            WalkDir::new(folder)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
        })
        .find(|entry| entry.file_type().is_file() && entry.file_name().to_string_lossy() == name)
        .map(|entry| entry.into_path())
}

/// Model in `folder` (not its subfolders) whose primary sidecar records
/// `version_id`
pub fn search_local_model_info_by_version_id(folder: &Path, version_id: &str) -> Option<PathBuf> {
    if version_id.is_empty() || !folder.is_dir() {
        return None;
    }

    let entries = fs::read_dir(folder).ok()?;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let path = entry.path();
        let Some(name) = model_name_from_info(&path) else {
            continue;
        };
        let Some(info) = load_json(&path) else {
            continue;
        };
        if id_of(&info, "id") == version_id {
            debug!("Version {} already present as {}", version_id, path.display());
            return Some(locate_model_from_partial(folder, &name).unwrap_or(path));
        }
    }
    None
}
