use std::time::Duration;

use tracing::info;

use crate::catalog::ModelFolders;
use crate::civitai::CivitaiClient;
use crate::config::Settings;
use crate::download::Downloader;
use crate::error::Result;
use crate::hash::HashEngine;
use crate::http::Fetcher;

/// Everything a catalog operation needs: the settings, the resolved model
/// folders and the shared network and hashing services.
///
/// Built once at startup and passed by reference. A settings change goes
/// through [`HelperContext::reconfigure`], which replaces the whole context.
pub struct HelperContext {
    pub settings: Settings,
    pub folders: ModelFolders,
    pub fetcher: Fetcher,
    pub downloader: Downloader,
    pub civitai: CivitaiClient,
    pub hashes: HashEngine,
}

impl HelperContext {
    pub fn new(settings: Settings) -> Result<Self> {
        let fetcher = Fetcher::new(&settings.network)?;
        let folders = ModelFolders::from_config(&settings.models);
        let civitai = CivitaiClient::new(fetcher.clone(), &settings.civitai, &settings.network);
        let hashes = HashEngine::new(&settings.hashing);

        info!(
            "Helper context ready (root: {}, hashing: {})",
            settings.models.root.display(),
            if hashes.is_enabled() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            downloader: Downloader::new(fetcher.clone()),
            fetcher,
            folders,
            civitai,
            hashes,
            settings,
        })
    }

    /// Rebuilds the context from new settings
    pub fn reconfigure(&mut self, settings: Settings) -> Result<()> {
        *self = Self::new(settings)?;
        info!("Helper context reconfigured");
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        self.settings.network.request_delay()
    }

    /// Sleeps between consecutive remote requests
    pub async fn pause(&self) {
        self.civitai.pause().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelType;
    use std::path::Path;

    #[test]
    fn reconfigure_replaces_folders() {
        let mut ctx = HelperContext::new(Settings::with_root("/first")).unwrap();
        assert_eq!(
            ctx.folders.folder(ModelType::Lora),
            Path::new("/first/models/Lora")
        );

        ctx.reconfigure(Settings::with_root("/second")).unwrap();
        assert_eq!(
            ctx.folders.folder(ModelType::Lora),
            Path::new("/second/models/Lora")
        );
    }
}
