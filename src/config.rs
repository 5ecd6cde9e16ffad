//! Configuration for scenesmith paths and tunables.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SCENESMITH_HOME)
//! 2. Config file (.scenesmith/config.yaml)
//! 3. Defaults (~/.scenesmith)
//!
//! Config file discovery:
//! - Searches current directory and parents for .scenesmith/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::budget::JobBudget;
use crate::layout::LayoutConfig;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub collaborators: Option<CollaboratorConfig>,
    #[serde(default)]
    pub layout: Option<LayoutConfig>,
    #[serde(default)]
    pub budget: Option<JobBudget>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to config file)
    pub home: Option<String>,
}

/// Commands for the three external collaborators.
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorConfig {
    pub generator_command: Option<String>,
    pub renderer_command: Option<String>,
    pub evaluator_command: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to scenesmith home (job state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Collaborator commands
    pub generator_command: String,
    pub renderer_command: String,
    pub evaluator_command: String,
    /// Layout geometry settings
    pub layout: LayoutConfig,
    /// Budget limits
    pub budget: JobBudget,
}

fn default_generator_command() -> String {
    "scenesmith-generate".to_string()
}

fn default_renderer_command() -> String {
    "manim".to_string()
}

fn default_evaluator_command() -> String {
    "scenesmith-evaluate".to_string()
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".scenesmith").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".scenesmith");

    let config_file = find_config_file();

    let (home, collaborators, layout, budget) = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        let home = if let Ok(env_home) = std::env::var("SCENESMITH_HOME") {
            PathBuf::from(env_home)
        } else if let Some(ref home_path) = config.paths.home {
            // home is relative to the .scenesmith/ directory
            let config_dir = config_path.parent().unwrap_or(Path::new("."));
            resolve_path(config_dir, home_path)
        } else {
            default_home.clone()
        };

        (
            home,
            config.collaborators,
            config.layout.unwrap_or_default(),
            config.budget.unwrap_or_default(),
        )
    } else {
        let home = std::env::var("SCENESMITH_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home.clone());

        (home, None, LayoutConfig::default(), JobBudget::default())
    };

    let generator_command = collaborators
        .as_ref()
        .and_then(|c| c.generator_command.clone())
        .unwrap_or_else(default_generator_command);
    let renderer_command = collaborators
        .as_ref()
        .and_then(|c| c.renderer_command.clone())
        .unwrap_or_else(default_renderer_command);
    let evaluator_command = collaborators
        .as_ref()
        .and_then(|c| c.evaluator_command.clone())
        .unwrap_or_else(default_evaluator_command);

    Ok(ResolvedConfig {
        home,
        config_file,
        generator_command,
        renderer_command,
        evaluator_command,
        layout,
        budget,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the scenesmith home directory (job state).
pub fn scenesmith_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

/// Get the jobs directory ($SCENESMITH_HOME/jobs)
pub fn jobs_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("jobs"))
}

/// Get the render work directory ($SCENESMITH_HOME/work)
pub fn work_dir() -> Result<PathBuf> {
    Ok(config()?.home.join("work"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(".scenesmith");
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            "version: \"1\"\ncollaborators:\n  renderer_command: /usr/local/bin/manim\nbudget:\n  max_total_attempts: 10"
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(
            config.collaborators.unwrap().renderer_command.as_deref(),
            Some("/usr/local/bin/manim")
        );
        assert_eq!(config.budget.unwrap().max_total_attempts, 10);
    }

    #[test]
    fn test_layout_defaults_survive_partial_config() {
        let yaml = "version: \"1\"\nlayout:\n  safe_margin_fraction: 0.1\n";
        let config: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        let layout = config.layout.unwrap();

        assert_eq!(layout.safe_margin_fraction, 0.1);
        assert_eq!(layout.frame_width, 14.0);
        assert_eq!(layout.frame_height, 8.0);
    }

    #[test]
    fn test_resolve_path_absolute_passthrough() {
        let base = Path::new("/tmp");
        assert_eq!(
            resolve_path(base, "/var/data"),
            PathBuf::from("/var/data")
        );
    }
}
