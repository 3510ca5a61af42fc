// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration loading and priority management.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::SshfanError;

use super::types::Config;
use super::utils::{expand_path, expand_tilde};

/// Name of the per-project configuration file in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "sshfan.yaml";

impl Config {
    /// Load configuration from a file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| format!("Failed to read configuration file at {}", expanded_path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse YAML configuration file at {}", expanded_path.display()))
    }

    /// Parse configuration text and expand paths.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content)?;
        if let Some(dir) = config.defaults.output_dir.as_deref() {
            config.defaults.output_dir = Some(expand_path(dir));
        }
        Ok(config)
    }

    /// Load configuration with priority order:
    /// 1. Explicit --config path (must exist)
    /// 2. `sshfan.yaml` in the current directory
    /// 3. The platform config directory (`$XDG_CONFIG_HOME/sshfan/config.yaml` on Linux)
    /// 4. `~/.config/sshfan/config.yaml`
    pub async fn load_with_priority(cli_config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_config_path {
            let expanded = expand_tilde(path);
            if !expanded.is_file() {
                return Err(SshfanError::environment(format!(
                    "configuration file {} does not exist",
                    expanded.display()
                ))
                .into());
            }
            tracing::debug!("Using explicitly specified config file: {:?}", expanded);
            return Self::load(&expanded).await;
        }

        for candidate in Self::standard_locations() {
            if candidate.is_file() {
                tracing::debug!("Found config at {:?}", candidate);
                return Self::load(&candidate).await;
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Candidate configuration files, highest priority first.
    pub fn standard_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dirs) = ProjectDirs::from("", "", "sshfan") {
            locations.push(dirs.config_dir().join("config.yaml"));
        }
        let home_config = expand_tilde(Path::new("~/.config/sshfan/config.yaml"));
        if !locations.contains(&home_config) {
            locations.push(home_config);
        }
        locations
    }
}
