use crate::infrastructure::config::{ensure_default_configs, load_app_config, AppConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

pub const WORKSPACE_ENV: &str = "POMODORO_WORKSPACE";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub database_path: PathBuf,
    pub logs_dir: PathBuf,
    pub config: AppConfig,
}

pub fn resolve_workspace_root() -> Result<PathBuf, InfraError> {
    match std::env::var_os(WORKSPACE_ENV).filter(|value| !value.is_empty()) {
        Some(root) => Ok(PathBuf::from(root)),
        None => Ok(std::env::current_dir()?),
    }
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("pomodoro.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = load_app_config(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        database_path,
        logs_dir,
        config,
    })
}
