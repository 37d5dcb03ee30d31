use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::model_type::ModelType;
use crate::config::ModelsConfig;

/// Resolved model-type to folder mapping. Read-only once built; a settings
/// change builds a new one.
#[derive(Debug, Clone)]
pub struct ModelFolders {
    folders: BTreeMap<ModelType, PathBuf>,
    vae: PathBuf,
}

impl ModelFolders {
    pub fn from_config(models: &ModelsConfig) -> Self {
        let lora = models.resolve(&models.lora);
        let lycoris = if models.lyco_to_lora {
            lora.clone()
        } else {
            models.resolve(&models.lycoris)
        };

        let folders = BTreeMap::from([
            (ModelType::Checkpoint, models.resolve(&models.checkpoint)),
            (ModelType::TextualInversion, models.resolve(&models.embeddings)),
            (ModelType::Hypernetwork, models.resolve(&models.hypernetworks)),
            (ModelType::Lora, lora),
            (ModelType::Lycoris, lycoris),
        ]);

        for (model_type, folder) in &folders {
            debug!("Model folder for {}: {}", model_type, folder.display());
        }

        Self {
            folders,
            vae: models.resolve(&models.vae),
        }
    }

    pub fn folder(&self, model_type: ModelType) -> &Path {
        // Every variant is inserted in from_config
        self.folders
            .get(&model_type)
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new("."))
    }

    pub fn vae(&self) -> &Path {
        &self.vae
    }

    /// Folders searched for models of `model_type`. LoRA lookups include
    /// the LyCORIS folder since the host loads both from either place.
    pub fn search_folders(&self, model_type: ModelType) -> Vec<&Path> {
        let mut folders = vec![self.folder(model_type)];
        if model_type == ModelType::Lora {
            let lycoris = self.folder(ModelType::Lycoris);
            if !folders.contains(&lycoris) {
                folders.push(lycoris);
            }
        }
        folders
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelType, &Path)> {
        self.folders.iter().map(|(t, p)| (*t, p.as_path()))
    }
}
