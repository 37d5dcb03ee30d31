// Declare the display submodule
mod display;

// Declare the command handlers
mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use civhelp::catalog::ModelType;
use civhelp::download::DuplicatePolicy;
use civhelp::HelperContext;

#[derive(Parser)]
#[command(name = "civhelp", version, about = "Download, hash and catalog model files")]
pub struct Cli {
    /// Directory holding default.toml (and optionally local.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Clone)]
pub struct TypesArgs {
    /// Model types to process (ckp, ti, hyper, lora, lycoris); all when omitted
    #[arg(short, long = "types", value_delimiter = ',')]
    pub types: Vec<ModelType>,
}

impl TypesArgs {
    pub fn resolve(&self) -> Vec<ModelType> {
        if self.types.is_empty() {
            ModelType::ALL.to_vec()
        } else {
            self.types.clone()
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Attach remote metadata and previews to local models
    Scan {
        #[command(flatten)]
        types: TypesArgs,
        /// Refresh sidecars written by an older metadata schema
        #[arg(long)]
        refetch_old: bool,
    },
    /// Download a single URL
    Download {
        url: String,
        /// Target folder; the file name comes from the server unless given
        #[arg(long)]
        folder: PathBuf,
        #[arg(long)]
        filename: Option<String>,
        /// skip, overwrite or rename
        #[arg(long, default_value_t = DuplicatePolicy::Skip)]
        duplicate: DuplicatePolicy,
    },
    /// Download a remote model version into the catalog
    DownloadVersion {
        version_id: String,
        #[arg(long = "type")]
        model_type: ModelType,
        /// Folder below the type's root
        #[arg(long, default_value = "")]
        subfolder: String,
        /// Base name for the downloaded files
        #[arg(long)]
        filename: Option<String>,
        /// Download every file of the version, not just the usual types
        #[arg(long)]
        all: bool,
        #[arg(long, default_value_t = DuplicatePolicy::Skip)]
        duplicate: DuplicatePolicy,
        /// Preview image URL to try before the version's images
        #[arg(long)]
        preview: Option<String>,
    },
    /// Attach metadata of a remote model to a named local file
    FetchInfo {
        #[arg(long = "type")]
        model_type: ModelType,
        /// File name of the local model
        #[arg(long)]
        name: String,
        /// Model page URL or numeric model id
        model: String,
    },
    /// Group local models by content hash
    Duplicates {
        #[command(flatten)]
        types: TypesArgs,
        /// Hash every file instead of trusting recorded digests
        #[arg(long)]
        rehash: bool,
    },
    /// Look for newer remote versions of local models
    CheckUpdates {
        #[command(flatten)]
        types: TypesArgs,
    },
    /// Print the SHA-256 of a file
    Hash {
        path: PathBuf,
        /// Hash only the tensor data of a safetensors file
        #[arg(long)]
        addnet: bool,
        /// Model type used to key the hash cache
        #[arg(long = "type")]
        model_type: Option<ModelType>,
    },
}

pub async fn run(ctx: &HelperContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Scan { types, refetch_old } => {
            commands::handle_scan(ctx, types.resolve(), refetch_old).await
        }
        Command::Download { url, folder, filename, duplicate } => {
            commands::handle_download(ctx, url, folder, filename, duplicate).await
        }
        Command::DownloadVersion {
            version_id,
            model_type,
            subfolder,
            filename,
            all,
            duplicate,
            preview,
        } => {
            let request = civhelp::catalog::VersionDownload {
                model_type,
                subfolder,
                version_id,
                filename,
                file_types: civhelp::civitai::FILE_TYPES.iter().map(|t| t.to_string()).collect(),
                download_all: all,
                duplicate,
                preferred_preview: preview,
            };
            commands::handle_download_version(ctx, request).await
        }
        Command::FetchInfo { model_type, name, model } => {
            commands::handle_fetch_info(ctx, model_type, &name, &model).await
        }
        Command::Duplicates { types, rehash } => {
            commands::handle_duplicates(ctx, types.resolve(), !rehash).await
        }
        Command::CheckUpdates { types } => commands::handle_check_updates(ctx, types.resolve()).await,
        Command::Hash { path, addnet, model_type } => {
            commands::handle_hash(ctx, path, addnet, model_type).await
        }
    }
}
