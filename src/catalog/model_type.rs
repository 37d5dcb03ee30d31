use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;

/// Extensions recognised as model files, lowercase and without the dot
pub const MODEL_EXTENSIONS: [&str; 4] = ["bin", "pt", "safetensors", "ckpt"];

/// Closed set of model categories, each living in its own folder tree.
///
/// Declaration order is the scan order; LoRA sorts before LyCORIS so the
/// duplicate scanner sees LoRA entries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelType {
    Checkpoint,
    TextualInversion,
    Hypernetwork,
    Lora,
    Lycoris,
}

impl ModelType {
    pub const ALL: [ModelType; 5] = [
        ModelType::Checkpoint,
        ModelType::TextualInversion,
        ModelType::Hypernetwork,
        ModelType::Lora,
        ModelType::Lycoris,
    ];

    /// Short key used on the command line and in reports
    pub fn key(&self) -> &'static str {
        match self {
            ModelType::Checkpoint => "ckp",
            ModelType::TextualInversion => "ti",
            ModelType::Hypernetwork => "hyper",
            ModelType::Lora => "lora",
            ModelType::Lycoris => "lycoris",
        }
    }

    /// Namespace of this type's entries in the hash cache
    pub fn hash_namespace(&self) -> &'static str {
        match self {
            ModelType::Checkpoint => "checkpoint",
            ModelType::TextualInversion => "textual_inversion",
            ModelType::Hypernetwork => "hypernet",
            ModelType::Lora => "lora",
            ModelType::Lycoris => "lycoris",
        }
    }

    /// Maps the remote service's model `type` field
    pub fn from_civitai(kind: &str) -> Option<Self> {
        match kind {
            "Checkpoint" => Some(ModelType::Checkpoint),
            "TextualInversion" => Some(ModelType::TextualInversion),
            "Hypernetwork" => Some(ModelType::Hypernetwork),
            "LORA" | "DoRA" => Some(ModelType::Lora),
            "LoCon" | "LyCORIS" => Some(ModelType::Lycoris),
            _ => None,
        }
    }

    /// Types whose host sidecar carries a preferred weight
    pub fn has_weight(&self) -> bool {
        matches!(self, ModelType::Lora | ModelType::Lycoris)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ckp" | "checkpoint" => Ok(ModelType::Checkpoint),
            "ti" | "embedding" | "textual_inversion" => Ok(ModelType::TextualInversion),
            "hyper" | "hypernetwork" => Ok(ModelType::Hypernetwork),
            "lora" => Ok(ModelType::Lora),
            "lycoris" | "lyco" => Ok(ModelType::Lycoris),
            _ => Err(Error::UnknownModelType(s.to_string())),
        }
    }
}

/// Whether `path` carries one of the model extensions
pub fn is_model_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_ascii_lowercase();
            MODEL_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lora_scans_before_lycoris() {
        assert!(ModelType::Lora < ModelType::Lycoris);
        assert_eq!(ModelType::ALL.last(), Some(&ModelType::Lycoris));
    }

    #[test]
    fn parses_keys_and_remote_types() {
        assert_eq!("ckp".parse::<ModelType>().unwrap(), ModelType::Checkpoint);
        assert_eq!("LoRA".parse::<ModelType>().unwrap(), ModelType::Lora);
        assert!("vae".parse::<ModelType>().is_err());
        assert_eq!(ModelType::from_civitai("LoCon"), Some(ModelType::Lycoris));
        assert_eq!(ModelType::from_civitai("DoRA"), Some(ModelType::Lora));
        assert_eq!(ModelType::from_civitai("Poses"), None);
    }

    #[test]
    fn recognises_model_extensions() {
        assert!(is_model_file(Path::new("a/b.safetensors")));
        assert!(is_model_file(Path::new("a/b.CKPT")));
        assert!(!is_model_file(Path::new("a/b.civitai.info")));
        assert!(!is_model_file(Path::new("a/b")));
    }
}
