use crate::infrastructure::config::{ensure_default_configs, load_config, LoadedConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "conservatory.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
    pub config: LoadedConfig,
}

/// Creates `config/` and `state/`, writes missing default configs and applies the schema.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_config(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        database_path,
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_layout_and_is_repeatable() {
        let root = std::env::temp_dir().join(format!(
            "conservatory-bootstrap-tests-{}",
            std::process::id()
        ));
        let first = bootstrap_workspace(&root).expect("first bootstrap");
        assert!(first.config_dir.join("app.json").exists());
        assert!(first.config_dir.join("scheduling.json").exists());
        assert!(first.database_path.exists());

        let second = bootstrap_workspace(&root).expect("second bootstrap");
        assert_eq!(second.database_path, first.database_path);
        assert_eq!(second.config, first.config);
        let _ = fs::remove_dir_all(&root);
    }
}
