use std::path::Path;
use tokio::fs;
use tracing::debug;

use super::RunConfig;
use crate::error::{AdaptiveError, ErrorCode, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Guess the format from the file extension, defaulting to YAML
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

pub fn parse_run_config(content: &str, format: ConfigFormat) -> Result<RunConfig> {
    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };
    Ok(config)
}

pub async fn load_run_config(path: &Path) -> Result<RunConfig> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        let code = if e.kind() == std::io::ErrorKind::NotFound {
            ErrorCode::CONFIG_NOT_FOUND
        } else {
            ErrorCode::CONFIG_GENERIC
        };
        AdaptiveError::config_with_code(
            code,
            format!("cannot read run file {}", path.display()),
        )
        .with_source(e)
    })?;

    let format = ConfigFormat::from_path(path);
    debug!("Loading run file {} as {:?}", path.display(), format);
    parse_run_config(&content, format).map_err(|e| e.with_context(path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ExecutionType;
    use tempfile::TempDir;

    const TOML: &str = r#"
execution = "parallel"
base_seed = 42
min_splits = 6
max_splits = 30
n_per_iteration = 3
pipeline = { model = "gbm", fairness = "reweighing" }

[metric]
source = "evaluation"
name = "equal_opportunity"

[stability]
strategy = "sd_relative"
window = 5

[stability.threshold]
kind = "relative"
value = 0.1

[evaluator]
program = "python"
args = ["run_split.py"]
timeout = "10m"

[backend]
kind = "local"
workers = 3

[batch_policy]
max_retries = 1
"#;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("run.TOML")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("run.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("run.yml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("run")), ConfigFormat::Yaml);
    }

    #[tokio::test]
    async fn test_load_toml_run_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.toml");
        std::fs::write(&path, TOML).unwrap();

        let config = load_run_config(&path).await.unwrap();
        assert_eq!(config.execution, ExecutionType::Parallel);
        assert_eq!(config.base_seed, 42);
        assert_eq!(config.pipeline["model"], "gbm");
        assert_eq!(
            config.evaluator.timeout,
            Some(std::time::Duration::from_secs(600))
        );
        assert_eq!(config.batch_policy.max_retries, 1);
        assert!(config.into_controller_config().is_ok());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = load_run_config(Path::new("/nonexistent/run.yaml"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_NOT_FOUND);
    }

    #[test]
    fn test_invalid_yaml_keeps_code() {
        let err = parse_run_config("min_splits: [", ConfigFormat::Yaml).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_INVALID_YAML);
    }
}
