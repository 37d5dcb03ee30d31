mod checker;

// Re-export from checker
pub use checker::{check_for_new_version, check_models_new_version, NewVersionInfo};
