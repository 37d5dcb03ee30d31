use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::NsfwLadder;

/// File types fetched by a default (not "download all") version download
pub const FILE_TYPES: [&str; 4] = ["Model", "Training Data", "Config", "VAE"];

/// Remote ids arrive as numbers, or as "" in skeleton records. Both become strings.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Stringified id of a JSON field, empty when absent or null
pub fn id_of(value: &Value, field: &str) -> String {
    match value.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// A model version as returned by `model-versions/*` and stored in the
/// primary sidecar
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelVersion {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub model_id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub base_model: String,
    pub description: Option<String>,
    pub download_url: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub trained_words: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub files: Vec<VersionFile>,
    #[serde(deserialize_with = "nullable")]
    pub images: Vec<VersionImage>,
    /// Parent model summary; enriched by the client with parent metadata
    pub model: Option<ParentModel>,
}

impl ModelVersion {
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }

    /// The file entry marked `Model`, else the first entry
    pub fn primary_file(&self) -> Option<&VersionFile> {
        self.files
            .iter()
            .find(|f| f.kind == "Model")
            .or_else(|| self.files.first())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VersionFile {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
    #[serde(rename = "sizeKB")]
    pub size_kb: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub hashes: FileHashes,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileHashes {
    #[serde(rename = "SHA256")]
    pub sha256: Option<String>,
    #[serde(rename = "AutoV2")]
    pub auto_v2: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VersionImage {
    pub url: Option<String>,
    /// `image` or `video`
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Numeric level on current payloads, a level name on some older ones
    pub nsfw_level: Option<Value>,
    pub width: Option<u64>,
    /// Set locally once the image was saved as an example
    pub local_file: Option<String>,
}

impl VersionImage {
    /// Maturity rating on the ladder. Unrated images get the ladder's
    /// `unrated` value.
    pub fn rating(&self, ladder: &NsfwLadder) -> u32 {
        match &self.nsfw_level {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(ladder.unrated),
            Some(Value::String(name)) => ladder.value_of(name).unwrap_or(ladder.unrated),
            _ => ladder.unrated,
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind.as_deref() == Some("image")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParentModel {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub tags: Vec<String>,
}

/// A model as returned by `models/<id>`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RemoteModel {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub tags: Vec<String>,
    /// Newest first
    #[serde(deserialize_with = "nullable")]
    pub model_versions: Vec<ModelVersion>,
}

impl RemoteModel {
    pub fn from_value(value: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(value.clone())
    }
}
