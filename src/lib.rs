//! Model download, hashing and metadata core for an image-generation host.
//!
//! Everything hangs off a [`HelperContext`]: build one from [`Settings`],
//! then drive catalog scans, version downloads, duplicate scans and update
//! checks through it. Long-running operations return lazy event streams.

pub mod catalog;
pub mod civitai;
pub mod config;
pub mod context;
pub mod download;
pub mod duplicates;
pub mod error;
pub mod hash;
pub mod http;
pub mod safetensors;
pub mod versions;

pub use config::Settings;
pub use context::HelperContext;
pub use error::{Error, Result};
