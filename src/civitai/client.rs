use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::types::id_of;
use crate::config::{CivitaiConfig, NetworkConfig};
use crate::error::{Error, Result};
use crate::http::{auth_headers, Fetcher};

/// Parent-model fields copied into a version record under `model`
const PARENT_FIELDS: [&str; 6] = [
    "description",
    "tags",
    "allowNoCredit",
    "allowCommercialUse",
    "allowDerivatives",
    "allowDifferentLicense",
];

/// Read-only client for the model-sharing service's REST API.
///
/// Every lookup returns `Ok(None)` when the remote answers 404, which
/// callers treat as "not on the remote service".
#[derive(Debug, Clone)]
pub struct CivitaiClient {
    fetcher: Fetcher,
    api_base: String,
    model_page: String,
    headers: HeaderMap,
    delay: Duration,
}

impl CivitaiClient {
    pub fn new(fetcher: Fetcher, civitai: &CivitaiConfig, network: &NetworkConfig) -> Self {
        Self {
            fetcher,
            api_base: civitai.api_base.clone(),
            model_page: civitai.model_page.clone(),
            headers: auth_headers(network.api_key.as_deref()),
            delay: network.request_delay(),
        }
    }

    /// Headers sent with every request, including authorization
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Public page of a model
    pub fn model_page_url(&self, model_id: &str) -> String {
        format!("{}{}", self.model_page, model_id)
    }

    /// Sleeps for the configured inter-request delay
    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    async fn get_json(&self, url: &str) -> Result<Option<Value>> {
        debug!("Requesting Civitai: {}", url);
        match self.fetcher.get(url, Some(&self.headers)).await {
            Ok(response) => {
                let text = response.text().await?;
                match serde_json::from_str(&text) {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        warn!("Parse response json failed for {}: {}", url, e);
                        Err(Error::InvalidFormat(format!("Response from {} is not JSON: {}", url, e)))
                    }
                }
            }
            Err(e) if e.is_not_found() => {
                debug!("{} is not on the remote service", url);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Version record for a file's SHA-256, with parent metadata appended
    pub async fn version_by_hash(&self, sha256: &str) -> Result<Option<Value>> {
        if sha256.is_empty() {
            return Err(Error::MissingInput("hash is empty".to_string()));
        }
        info!("Request model info from civitai by hash {}", sha256);

        let url = format!("{}model-versions/by-hash/{}", self.api_base, sha256);
        match self.get_json(&url).await? {
            Some(mut version) => {
                self.append_parent_model_metadata(&mut version).await?;
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }

    pub async fn model_by_id(&self, model_id: &str) -> Result<Option<Value>> {
        if model_id.is_empty() {
            return Err(Error::MissingInput("model_id is empty".to_string()));
        }
        debug!("Request model info from civitai: {}", model_id);
        self.get_json(&format!("{}models/{}", self.api_base, model_id)).await
    }

    /// Version record by version id, with parent metadata appended
    pub async fn version_by_id(&self, version_id: &str) -> Result<Option<Value>> {
        if version_id.is_empty() {
            return Err(Error::MissingInput("version_id is empty".to_string()));
        }
        debug!("Request version info from civitai: {}", version_id);

        let url = format!("{}model-versions/{}", self.api_base, version_id);
        match self.get_json(&url).await? {
            Some(mut version) => {
                self.append_parent_model_metadata(&mut version).await?;
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }

    /// Newest version of a model
    pub async fn latest_version_by_model_id(&self, model_id: &str) -> Result<Option<Value>> {
        let Some(model) = self.model_by_id(model_id).await? else {
            warn!("Failed to get model info by id: {}", model_id);
            return Ok(None);
        };

        let version_id = model
            .get("modelVersions")
            .and_then(Value::as_array)
            .and_then(|versions| versions.first())
            .map(|version| id_of(version, "id"))
            .unwrap_or_default();
        if version_id.is_empty() {
            warn!("Model {} has no usable versions", model_id);
            return Ok(None);
        }

        self.pause().await;
        self.version_by_id(&version_id).await
    }

    /// Copies description, tags, permission flags and creator of the
    /// parent model into a version record.
    ///
    /// Archived models can serve a version while the parent 404s; the
    /// fields are then filled with empty values.
    pub async fn append_parent_model_metadata(&self, version: &mut Value) -> Result<()> {
        let model_id = id_of(version, "modelId");
        let parent = if model_id.is_empty() {
            None
        } else {
            debug!("Fetching parent model information");
            self.pause().await;
            self.model_by_id(&model_id).await?
        };
        let parent = parent.unwrap_or_else(|| Value::Object(Map::new()));

        let Some(record) = version.as_object_mut() else {
            return Err(Error::InvalidFormat("version record is not a JSON object".to_string()));
        };

        record.insert(
            "creator".to_string(),
            parent.get("creator").cloned().unwrap_or_else(|| Value::Object(Map::new())),
        );

        let model = record
            .entry("model")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(model) = model.as_object_mut() {
            for field in PARENT_FIELDS {
                model.insert(
                    field.to_string(),
                    parent.get(field).cloned().unwrap_or_else(|| Value::String(String::new())),
                );
            }
        }

        Ok(())
    }
}
