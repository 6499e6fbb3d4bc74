//! Configuration loading for Responder
//!
//! Provides utilities for locating and loading configuration files from the
//! Responder config directory (~/.config/responder/).

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Name of the config directory under the platform config root
const APP_DIR: &str = "responder";

/// Get the Responder config directory (~/.config/responder/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Get the path to a config file within the Responder config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Check if a config file exists in the Responder config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Load and parse a JSON config file from the Responder config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load a JSON config file if it exists, otherwise return `T::default()`
pub fn load_json_or_default<T: DeserializeOwned + Default>(filename: &str) -> Result<T> {
    if config_exists(filename) {
        load_json(filename)
    } else {
        Ok(T::default())
    }
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = read_text_file(path)?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Read a text file (e.g. a reply template) from an arbitrary path
pub fn read_text_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with("responder"));
    }

    #[test]
    fn test_config_path() {
        let path = config_path("jmap.json").unwrap();
        assert!(path.ends_with("responder/jmap.json"));
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "name": "pigeonhole" }}"#).unwrap();

        let sample: Sample = load_json_file(file.path()).unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "pigeonhole".to_string(),
                count: 0
            }
        );
    }

    #[test]
    fn test_load_json_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = load_json_file::<Sample>(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_file() {
        let err = read_text_file(Path::new("/nonexistent/responder/reply.html")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/responder/reply.html"));
    }
}
