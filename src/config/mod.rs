pub mod types;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use types::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Load the application config; `None` means built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&text)?)
        }
        None => Ok(Config::default()),
    }
}

/// Resolve the config path: the explicit `--config` argument, then
/// `configs/application.yaml` in the working directory, then
/// `~/.config/logloom/config.yml`, then `/etc/logloom/config.yml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local_config = PathBuf::from("configs/application.yaml");
    if local_config.exists() {
        return Some(local_config);
    }

    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/logloom/config.yml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/logloom/config.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.first_pass.read_chunk_lines, 5000);
        assert_eq!(cfg.first_pass.micro_batch_size, 15);
        assert_eq!(cfg.first_pass.buffer.size_threshold, 100);
        assert_eq!(cfg.first_pass.committee.backend, "stub");
        assert_eq!(cfg.second_pass.flush_lines, 2000);
        assert_eq!(cfg.safety.dynamic_budget_ms, 500);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            "first_pass:\n  micro_batch_size: 25\n  buffer:\n    size_threshold: 7\ncatalog:\n  path: /tmp/custom.duckdb"
        )
        .unwrap();

        let cfg = load_config(Some(f.path())).unwrap();
        assert_eq!(cfg.first_pass.micro_batch_size, 25);
        assert_eq!(cfg.first_pass.buffer.size_threshold, 7);
        // Untouched knobs keep their defaults.
        assert_eq!(cfg.first_pass.read_chunk_lines, 5000);
        assert_eq!(cfg.first_pass.buffer.max_per_micro_batch, 15);
        assert_eq!(
            cfg.catalog.path,
            std::path::PathBuf::from("/tmp/custom.duckdb")
        );
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "first_pass: [not, a, mapping]").unwrap();
        assert!(load_config(Some(f.path())).is_err());
    }
}
