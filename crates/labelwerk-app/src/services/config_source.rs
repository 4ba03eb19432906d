// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Locating and loading the pipeline configuration.

use std::path::{Path, PathBuf};

use labelwerk_core::config::PipelineConfig;
use labelwerk_core::error::Result;
use tracing::info;

use super::data_dir::data_dir;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "LABELWERK_CONFIG";

const CONFIG_FILE_NAME: &str = "config.json";

/// Where the configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Environment(PathBuf),
    DataDir(PathBuf),
    Defaults,
}

/// Load the configuration for this process.
///
/// A file named by `LABELWERK_CONFIG` must exist and parse. Otherwise
/// `<data dir>/config.json` is used when present, else built-in defaults.
pub fn load() -> Result<(PipelineConfig, ConfigOrigin)> {
    let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    load_from(explicit.as_deref(), &data_dir().join(CONFIG_FILE_NAME))
}

fn load_from(explicit: Option<&Path>, fallback: &Path) -> Result<(PipelineConfig, ConfigOrigin)> {
    if let Some(path) = explicit {
        let config = PipelineConfig::from_file(path)?;
        info!(path = %path.display(), "configuration loaded from {CONFIG_ENV}");
        return Ok((config, ConfigOrigin::Environment(path.to_path_buf())));
    }
    if fallback.is_file() {
        let config = PipelineConfig::from_file(fallback)?;
        info!(path = %fallback.display(), "configuration loaded");
        return Ok((config, ConfigOrigin::DataDir(fallback.to_path_buf())));
    }
    info!("no configuration file, using defaults");
    Ok((PipelineConfig::default(), ConfigOrigin::Defaults))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_is_required_to_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.json");
        assert!(load_from(Some(&missing), &dir.path().join("config.json")).is_err());
    }

    #[test]
    fn data_dir_file_is_used_when_present() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let json = serde_json::json!({ "watch_dir": "/srv/labels", "max_concurrent": 4 });
        std::fs::write(&path, json.to_string()).expect("write config");

        let (config, origin) = load_from(None, &path).expect("load");
        assert_eq!(origin, ConfigOrigin::DataDir(path));
        assert_eq!(config.watch_dir, PathBuf::from("/srv/labels"));
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn defaults_without_any_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (config, origin) = load_from(None, &dir.path().join("config.json")).expect("load");
        assert_eq!(origin, ConfigOrigin::Defaults);
        assert_eq!(config.dpi, 203);
    }
}
