mod folders;
mod html;
mod lookup;
mod metadata;
mod model_type;
mod paths;
mod preview;
mod reconcile;
mod scan;
mod skeleton;

// Re-export from folders
pub use folders::ModelFolders;
// Re-export from html
pub use html::trim_html;
// Re-export from lookup
pub use lookup::{find_model_by_name, search_local_model_info_by_version_id, walk_models};
// Re-export from metadata
pub use metadata::{
    extension_block, load_json, metadata_needed, metadata_needed_for, metadata_version,
    newer_version, verify_overwrite_eligibility, write_json, SidecarKind, COMPAT_VERSION_HOST,
    COMPAT_VERSION_INFO, METADATA_VERSION, PROVENANCE_KEY,
};
// Re-export from model_type
pub use model_type::{is_model_file, ModelType, MODEL_EXTENSIONS};
// Re-export from paths
pub use paths::{
    base_path, existing_preview, host_path, info_path, locate_model_from_partial,
    model_name_from_info, next_example_image_path, preview_files,
    preview_path, relative_path, INFO_SUFFIX,
};
// Re-export from preview
pub use preview::{download_preview, preview_candidates, PreviewOutcome};
// Re-export from reconcile
pub use reconcile::{host_metadata, process_model_info, ReconcileOutcome};
// Re-export from scan
pub use scan::{
    download_model_version, fetch_model_info, scan_models, ScanEvent, ScanSummary,
    VersionDownload,
};
// Re-export from skeleton
pub use skeleton::{metadata_skeleton, skeleton_info};
