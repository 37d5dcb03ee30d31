mod client;
mod types;
mod url;

// Re-export from client
pub use client::CivitaiClient;
// Re-export from types
pub use types::{
    id_of, FileHashes, ModelVersion, ParentModel, RemoteModel, VersionFile, VersionImage,
    FILE_TYPES,
};
// Re-export from url
pub use url::{image_url, model_id_from_url};
