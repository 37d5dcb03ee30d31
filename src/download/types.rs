use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use reqwest::header::HeaderMap;

use super::progress::visualize_progress;

/// What to do when the resolved destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail without touching the existing file
    #[default]
    Skip,
    /// Replace the existing file
    Overwrite,
    /// Save under `<base>_<n><ext>` with the smallest free `n >= 2`
    Rename,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(DuplicatePolicy::Skip),
            "overwrite" => Ok(DuplicatePolicy::Overwrite),
            "rename" | "rename new" => Ok(DuplicatePolicy::Rename),
            other => Err(format!(
                "Unknown duplicate policy '{}'. Expected skip, overwrite or rename",
                other
            )),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DuplicatePolicy::Skip => "skip",
            DuplicatePolicy::Overwrite => "overwrite",
            DuplicatePolicy::Rename => "rename",
        };
        write!(f, "{}", name)
    }
}

/// Where a download should land
#[derive(Debug, Clone)]
pub enum Destination {
    /// Exact target path
    Path(PathBuf),
    /// A folder plus an optional filename. Without a filename the name is
    /// taken from the response's `Content-Disposition` header.
    Folder {
        folder: PathBuf,
        filename: Option<String>,
    },
}

/// One file to fetch
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    pub destination: Destination,
    pub duplicate: DuplicatePolicy,
    pub headers: HeaderMap,
}

impl DownloadJob {
    pub fn to_path<P: AsRef<Path>>(url: impl Into<String>, path: P) -> Self {
        Self {
            url: url.into(),
            destination: Destination::Path(path.as_ref().to_path_buf()),
            duplicate: DuplicatePolicy::default(),
            headers: HeaderMap::new(),
        }
    }

    pub fn to_folder<P: AsRef<Path>>(
        url: impl Into<String>,
        folder: P,
        filename: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            destination: Destination::Folder {
                folder: folder.as_ref().to_path_buf(),
                filename,
            },
            duplicate: DuplicatePolicy::default(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_duplicate(mut self, duplicate: DuplicatePolicy) -> Self {
        self.duplicate = duplicate;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Rate-limited progress snapshot of one transfer
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    /// 0 to 100; stays 0 when the total is unknown
    pub percent: u8,
    /// Bytes present in the temp file, including resumed bytes
    pub downloaded: u64,
    /// Expected size from `Content-Length`, 0 when unknown
    pub total: u64,
    /// Throughput of this session in bytes per second
    pub speed: u64,
}

impl DownloadProgress {
    pub fn ratio(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.downloaded as f64 / self.total as f64).min(1.0) as f32
        }
    }

    pub fn text(&self) -> String {
        visualize_progress(self.percent, self.downloaded, self.total, self.speed)
    }
}

/// Terminal result of a download or batch
#[derive(Debug, Clone, Default)]
pub struct DownloadOutcome {
    pub success: bool,
    /// Final file path on success
    pub path: Option<PathBuf>,
    /// Human-readable summary or failure reason
    pub message: String,
    /// Non-fatal problem, such as a size mismatch
    pub warning: Option<String>,
    /// Per-file failures of a partially successful batch
    pub additional_failures: Vec<String>,
}

impl DownloadOutcome {
    pub fn succeeded(path: PathBuf) -> Self {
        Self {
            success: true,
            message: format!("File Downloaded to: {}", path.display()),
            path: Some(path),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Element of a download's lazy event sequence. A sequence always ends with
/// exactly one `Finished`.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// A batch moved on to its `index`-th file (1-based)
    FileStarted { index: usize, total: usize, url: String },
    Progress(DownloadProgress),
    Finished(DownloadOutcome),
}
