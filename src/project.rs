// Project configuration (ssy.yaml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::CliError;

pub const DEFAULT_CONFIG_FILENAME: &str = "ssy.yaml";

/// Root structure of ssy.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProjectConfig {
    /// Default image name for `ssy push`
    pub image: Option<String>,

    #[serde(default)]
    pub build: BuildConfig,

    /// Predictor reference, e.g. `predict.py:Predictor`
    pub predict: Option<String>,

    /// Trainer reference, e.g. `train.py:train`
    pub train: Option<String>,

    #[serde(default)]
    pub concurrency: Option<ConcurrencyConfig>,
}

/// Build section of ssy.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub gpu: bool,

    pub python_version: Option<String>,

    #[serde(default)]
    pub python_packages: Vec<String>,

    pub python_requirements: Option<String>,

    #[serde(default)]
    pub system_packages: Vec<String>,

    /// Extra build steps; either plain commands or `{command, mounts}` maps
    #[serde(default)]
    pub run: Vec<serde_yaml::Value>,

    pub cuda: Option<String>,

    /// Enable fast (differential) push, same as `--x-fast`
    #[serde(default)]
    pub fast: bool,

    pub cog_runtime: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConcurrencyConfig {
    pub max: Option<u32>,
}

/// A parsed project file and the directory it was found in
#[derive(Debug, Clone)]
pub struct Project {
    pub config: ProjectConfig,
    pub dir: PathBuf,
}

/// Search `start_dir` and its parents for `filename` and parse it.
pub fn load_project(filename: &str, start_dir: &Path) -> Result<Project, CliError> {
    let path = find_config_file(filename, start_dir).ok_or_else(|| {
        CliError::config(format!(
            "{} not found in {} (or in any parent directories)",
            filename,
            start_dir.display()
        ))
    })?;

    info!("Loading project config from {}", path.display());
    let config = parse_project_config(&path)?;
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| start_dir.to_path_buf());

    Ok(Project { config, dir })
}

fn find_config_file(filename: &str, start_dir: &Path) -> Option<PathBuf> {
    let candidate = Path::new(filename);
    if candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    start_dir
        .ancestors()
        .map(|dir| dir.join(filename))
        .find(|path| path.is_file())
}

fn parse_project_config(path: &Path) -> Result<ProjectConfig, CliError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::config(format!("Failed to read {}: {}", path.display(), e))
    })?;

    // Deserialize and collect any unused fields
    let mut unused_fields = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(&content);
    let config: ProjectConfig = serde_ignored::deserialize(deserializer, |field| {
        unused_fields.push(field.to_string());
    })
    .map_err(|e| CliError::config(format!("Failed to parse {}: {}", path.display(), e)))?;

    for field in &unused_fields {
        warn!(
            "Unknown configuration field in {}: {}",
            path.display(),
            field
        );
    }

    debug!("Parsed project config: {:?}", config);
    Ok(config)
}
