use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use super::model_type::MODEL_EXTENSIONS;

/// Suffix of the primary (remote metadata) sidecar
pub const INFO_SUFFIX: &str = ".civitai.info";
/// Suffix of the host-app sidecar
pub const HOST_SUFFIX: &str = ".json";
/// Preview image extensions the host recognises
pub const PREVIEW_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

/// Model path without its extension
pub fn base_path(model_path: &Path) -> PathBuf {
    model_path.with_extension("")
}

fn with_suffix(model_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base_path(model_path).as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<base>.civitai.info`
pub fn info_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, INFO_SUFFIX)
}

/// `<base>.json`
pub fn host_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, HOST_SUFFIX)
}

/// Where a downloaded preview is stored
pub fn preview_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, ".preview.png")
}

/// Preview files the host would display for a model. With `all`, plain
/// `<base>.<ext>` images are included too.
pub fn preview_files(model_path: &Path, all: bool) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for ext in PREVIEW_EXTENSIONS {
        if all {
            candidates.push(with_suffix(model_path, &format!(".{}", ext)));
        }
        candidates.push(with_suffix(model_path, &format!(".preview.{}", ext)));
    }
    candidates
}

/// First preview file present on disk
pub fn existing_preview(model_path: &Path) -> Option<PathBuf> {
    preview_files(model_path, false)
        .into_iter()
        .find(|candidate| candidate.is_file())
}

/// Finds `<root>/<name>.<ext>` for any model extension; used when a sidecar's
/// recorded extension does not match the file on disk
pub fn locate_model_from_partial(root: &Path, name: &str) -> Option<PathBuf> {
    MODEL_EXTENSIONS
        .iter()
        .map(|ext| root.join(format!("{}.{}", name, ext)))
        .find(|candidate| candidate.is_file())
}

/// Model name of a primary sidecar file name (`foo.civitai.info` → `foo`)
pub fn model_name_from_info(info_file: &Path) -> Option<String> {
    let file_name = info_file.file_name()?.to_string_lossy();
    file_name
        .strip_suffix(INFO_SUFFIX)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// First free `<base>.example.<i>` stem, with no extension yet
pub fn next_example_image_path(model_path: &Path) -> PathBuf {
    let base = base_path(model_path);
    let parent = base.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let taken: Vec<String> = fs::read_dir(&parent)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();

    let mut i = 0;
    loop {
        let prefix = format!("{}.example.{}.", stem, i);
        if !taken.iter().any(|name| name.starts_with(&prefix)) {
            return parent.join(format!("{}.example.{}", stem, i));
        }
        i += 1;
    }
}

/// `item` relative to `parent`, or `item` unchanged when it is elsewhere
pub fn relative_path(item: &Path, parent: &Path) -> PathBuf {
    item.strip_prefix(parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| item.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn sidecars_replace_the_extension() {
        let model = Path::new("/m/Lora/foo.v2.safetensors");
        assert_eq!(info_path(model), PathBuf::from("/m/Lora/foo.v2.civitai.info"));
        assert_eq!(host_path(model), PathBuf::from("/m/Lora/foo.v2.json"));
        assert_eq!(preview_path(model), PathBuf::from("/m/Lora/foo.v2.preview.png"));
        assert_eq!(preview_files(model, true).len(), 10);
    }

    #[test]
    fn info_names_strip_suffix() {
        assert_eq!(
            model_name_from_info(Path::new("x/foo.civitai.info")),
            Some("foo".to_string())
        );
        assert_eq!(model_name_from_info(Path::new("x/foo.info")), None);
    }

    #[test]
    fn partial_lookup_tries_each_extension() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("foo.ckpt"), b"x").unwrap();
        assert_eq!(
            locate_model_from_partial(dir.path(), "foo"),
            Some(dir.path().join("foo.ckpt"))
        );
        assert_eq!(locate_model_from_partial(dir.path(), "bar"), None);
    }

    #[test]
    fn example_paths_skip_taken_indices() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("foo.safetensors");
        std::fs::write(dir.path().join("foo.example.0.jpeg"), b"x").unwrap();
        assert_eq!(next_example_image_path(&model), dir.path().join("foo.example.1"));
    }
}
