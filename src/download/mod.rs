mod batch;
mod downloader;
mod progress;
mod types;

// Re-export from batch
pub use batch::BatchItem;
// Re-export from downloader
pub use downloader::{apply_duplicate_policy, parse_content_disposition, temp_path, Downloader, DL_EXT};
// Re-export from progress
pub use progress::{human_readable_filesize, visualize_progress};
// Re-export from types
pub use types::{
    Destination, DownloadEvent, DownloadJob, DownloadOutcome, DownloadProgress, DuplicatePolicy,
};
