use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_stream::stream;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use super::cache::{HashCache, HashRecord, SECTION_ADDNET, SECTION_HASHES};
use crate::config::HashingConfig;
use crate::error::{Error, Result};
use crate::safetensors::read_header_len;

/// Bytes read per hashing step
pub const BLOCK_SIZE: usize = 1 << 20;

/// Which bytes of a file participate in the digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashMode {
    /// Every byte
    #[default]
    Full,
    /// Skip the 8-byte length prefix and the JSON header of a safetensors
    /// file; only tensor data is hashed
    SafetensorsOffset,
}

impl HashMode {
    /// Cache section holding digests of this mode
    pub fn cache_section(&self) -> &'static str {
        match self {
            HashMode::Full => SECTION_HASHES,
            HashMode::SafetensorsOffset => SECTION_ADDNET,
        }
    }
}

/// Element of a hashing sequence; a successful sequence ends with `Digest`
#[derive(Debug, Clone, PartialEq)]
pub enum HashEvent {
    Progress { ratio: f32, message: String },
    /// Lowercase hex SHA-256
    Digest(String),
}

/// Cache key for a model file: `<namespace>/<file name without extension>`
pub fn cache_key(namespace: &str, path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", namespace, stem)
}

/// Streams SHA-256 digests of model files, consulting the shared cache first.
#[derive(Clone)]
pub struct HashEngine {
    enabled: bool,
    cache: Arc<HashCache>,
}

impl HashEngine {
    pub fn new(config: &HashingConfig) -> Self {
        Self {
            enabled: config.enabled,
            cache: Arc::new(HashCache::load(&config.cache_file)),
        }
    }

    pub fn with_cache(enabled: bool, cache: Arc<HashCache>) -> Self {
        Self { enabled, cache }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cache(&self) -> &HashCache {
        &self.cache
    }

    /// Hashes `path`, yielding a progress ratio per block and then the digest.
    ///
    /// With a cache `key`, an entry recorded at the file's current mtime is
    /// returned without reading the file, and a fresh digest is stored and
    /// persisted. A disabled engine fails with `HashingDisabled`.
    pub fn hash(
        &self,
        path: PathBuf,
        key: Option<String>,
        mode: HashMode,
    ) -> impl Stream<Item = Result<HashEvent>> + '_ {
        stream! {
            if !self.enabled {
                yield Err(Error::HashingDisabled);
                return;
            }

            let mtime = match modified_secs(&path).await {
                Ok(mtime) => mtime,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            if let Some(key) = &key {
                if let Some(digest) = self.cache.get(mode.cache_section(), key, mtime) {
                    debug!("Hash cache hit for {}", key);
                    yield Ok(HashEvent::Digest(digest));
                    return;
                }
            }

            let (mut file, offset, size) = match open_for_hashing(&path, mode).await {
                Ok(opened) => opened,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            info!("Calculating sha256 for {}", path.display());

            let mut hasher = Sha256::new();
            let mut buffer = vec![0u8; BLOCK_SIZE];
            let mut position = offset;

            loop {
                let read = match file.read(&mut buffer).await {
                    Ok(0) => break,
                    Ok(read) => read,
                    Err(e) => {
                        yield Err(Error::Io(e));
                        return;
                    }
                };
                hasher.update(&buffer[..read]);
                position += read as u64;

                let ratio = if size > offset {
                    ((position - offset) as f64 / (size - offset) as f64).min(1.0) as f32
                } else {
                    1.0
                };
                yield Ok(HashEvent::Progress {
                    ratio,
                    message: format!("Hashing {}: {:.0}%", name, ratio * 100.0),
                });
            }

            let digest = format!("{:x}", hasher.finalize());
            debug!("sha256 of {}: {}", path.display(), digest);

            if let Some(key) = &key {
                self.cache.insert(
                    mode.cache_section(),
                    key,
                    HashRecord { mtime, sha256: digest.clone() },
                );
                if let Err(e) = self.cache.persist() {
                    warn!("Failed to persist hash cache: {}", e);
                }
            }

            yield Ok(HashEvent::Digest(digest));
        }
    }

    /// Drains `hash` and returns the digest
    pub async fn hash_file(&self, path: &Path, key: Option<String>, mode: HashMode) -> Result<String> {
        let stream = self.hash(path.to_path_buf(), key, mode);
        futures::pin_mut!(stream);

        while let Some(event) = stream.next().await {
            if let HashEvent::Digest(digest) = event? {
                return Ok(digest);
            }
        }
        Err(Error::InvalidFormat(format!(
            "Hashing {} ended without a digest",
            path.display()
        )))
    }
}

async fn modified_secs(path: &Path) -> Result<f64> {
    let modified = fs::metadata(path).await?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}

/// Opens `path` positioned at the first hashed byte; returns the file, that
/// offset and the file size.
async fn open_for_hashing(path: &Path, mode: HashMode) -> Result<(File, u64, u64)> {
    let mut file = File::open(path).await?;
    let size = file.metadata().await?.len();

    let offset = match mode {
        HashMode::Full => 0,
        HashMode::SafetensorsOffset => {
            let mut prefix = [0u8; 8];
            file.read_exact(&mut prefix).await?;
            let header_len = read_header_len(&mut &prefix[..])?;
            let offset = header_len.saturating_add(8);
            if offset > size {
                return Err(Error::InvalidFormat(format!(
                    "{}: header length {} exceeds file size {}",
                    path.display(),
                    header_len,
                    size
                )));
            }
            file.seek(SeekFrom::Start(offset)).await?;
            offset
        }
    };

    Ok((file, offset, size))
}
