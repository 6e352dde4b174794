use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::commands::CommandSpec;
use crate::platform::PlatformSet;

pub const DEFAULT_CONFIG_FILE: &str = "shipwright.yaml";

/// Top level packaging configuration.
///
/// `fetch`, `build` and `prune` are required; they are optional here so that
/// a missing section is reported by validation rather than as a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub prepare: Option<PrepareConfig>,
    #[serde(default)]
    pub fetch: Option<FetchConfig>,
    #[serde(default)]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub prune: Option<PruneConfig>,
    #[serde(default)]
    pub add_launcher: Option<AddLauncherConfig>,
    #[serde(default)]
    pub zip: Option<ZipConfig>,
    #[serde(default)]
    pub debian: Option<DebianConfig>,
    #[serde(default)]
    pub dmg: Option<DmgConfig>,
    #[serde(default)]
    pub nsis: Option<NsisConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse configuration: {}", path.display()))
    }

    /// Parse a YAML (or JSON) document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub temp_directory: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub commands: Option<Vec<CommandSpec>>,
    /// Directory, relative to the temp directory, produced by `commands`.
    #[serde(default)]
    pub source_directory: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub package_manager: Option<String>,
    #[serde(default)]
    pub script_name: Option<String>,
    #[serde(default)]
    pub commands: Option<Vec<CommandSpec>>,
    #[serde(default)]
    pub post_build: Option<Vec<CommandSpec>>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub application_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub prune_empty_directories: bool,
    #[serde(default)]
    pub post_prune: Option<Vec<CommandSpec>>,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            skip: false,
            patterns: Vec::new(),
            prune_empty_directories: true,
            post_prune: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLauncherConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub platform: Option<PlatformSet>,
    /// File name of the launcher; defaults to the application name.
    #[serde(default)]
    pub name: Option<String>,
    /// Command run from the application directory, e.g. `node dist/index.js`.
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub platform: Option<PlatformSet>,
    #[serde(default)]
    pub pre_pack: Option<Vec<CommandSpec>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebianConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub platform: Option<PlatformSet>,
    #[serde(default)]
    pub pre_pack: Option<Vec<CommandSpec>>,
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub maintainer: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub depends: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmgConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub platform: Option<PlatformSet>,
    #[serde(default)]
    pub pre_pack: Option<Vec<CommandSpec>>,
    #[serde(default)]
    pub cf_bundle_display_name: Option<String>,
    #[serde(default)]
    pub cf_bundle_development_region: Option<String>,
    #[serde(default)]
    pub cf_bundle_executable: Option<String>,
    #[serde(default)]
    pub cf_bundle_identifier: Option<String>,
    #[serde(default)]
    pub cf_bundle_name: Option<String>,
    #[serde(default)]
    pub cf_bundle_short_version_string: Option<String>,
    #[serde(default)]
    pub cf_bundle_version: Option<String>,
    #[serde(default)]
    pub ns_human_readable_copyright: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NsisConfig {
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub platform: Option<PlatformSet>,
    #[serde(default)]
    pub pre_pack: Option<Vec<CommandSpec>>,
    #[serde(default)]
    pub app_title: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub install_directory: Option<String>,
}

fn default_true() -> bool {
    true
}
