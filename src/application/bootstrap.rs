use crate::infrastructure::config::{AppConfig, config_path, ensure_default_configs, load_config};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

const WORKSPACE_DIR_NAME: &str = "worktimer";
const DATABASE_FILE_NAME: &str = "worktimer.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_path: PathBuf,
    pub database_path: PathBuf,
    pub config: AppConfig,
}

pub fn default_workspace_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(WORKSPACE_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from(".").join(WORKSPACE_DIR_NAME))
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let database_path = state_dir.join(DATABASE_FILE_NAME);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_config(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_path: config_path(&config_dir),
        database_path,
        config,
    })
}
