use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ShipError, ShipResult};
use crate::pipeline::RunContext;
use crate::platform::{Platform, PlatformSet, applies_to};
use crate::variables::Variables;

pub mod build;
pub mod debian;
pub mod dmg;
pub mod fetch;
pub mod launcher;
pub mod nsis;
pub mod prepare;
pub mod prune;
pub mod zip;

pub use build::BuildStage;
pub use debian::DebianStage;
pub use dmg::DmgStage;
pub use fetch::FetchStage;
pub use launcher::AddLauncherStage;
pub use nsis::NsisStage;
pub use prepare::PrepareStage;
pub use prune::PruneStage;
pub use zip::ZipStage;

pub const APPLICATION_NAME: &str = "buildStep.applicationName";
pub const APPLICATION_VERSION: &str = "buildStep.applicationVersion";

/// Every stage the pipeline knows about, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Prepare,
    Fetch,
    Build,
    Prune,
    AddLauncher,
    Zip,
    Debian,
    DiskImage,
    Installer,
}

impl StageKind {
    pub const ORDER: [StageKind; 9] = [
        StageKind::Prepare,
        StageKind::Fetch,
        StageKind::Build,
        StageKind::Prune,
        StageKind::AddLauncher,
        StageKind::Zip,
        StageKind::Debian,
        StageKind::DiskImage,
        StageKind::Installer,
    ];

    pub fn title(self) -> &'static str {
        match self {
            StageKind::Prepare => "Prepare",
            StageKind::Fetch => "Fetch",
            StageKind::Build => "Build",
            StageKind::Prune => "Prune",
            StageKind::AddLauncher => "Add Launcher",
            StageKind::Zip => "Zip",
            StageKind::Debian => "Debian",
            StageKind::DiskImage => "DMG",
            StageKind::Installer => "NSIS",
        }
    }

    /// Prefix of the variables the stage exports.
    pub fn namespace(self) -> &'static str {
        match self {
            StageKind::Prepare => "prepareStep",
            StageKind::Fetch => "fetchStep",
            StageKind::Build => "buildStep",
            StageKind::Prune => "pruneStep",
            StageKind::AddLauncher => "addLauncherStep",
            StageKind::Zip => "zipStep",
            StageKind::Debian => "debianStep",
            StageKind::DiskImage => "dmgStep",
            StageKind::Installer => "nsisStep",
        }
    }

    /// The only host a packaging format can be produced on, if restricted.
    pub fn native_platform(self) -> Option<Platform> {
        match self {
            StageKind::Debian => Some(Platform::Linux),
            StageKind::DiskImage => Some(Platform::Macos),
            StageKind::Installer => Some(Platform::Windows),
            _ => None,
        }
    }

    pub fn key(self, name: &str) -> String {
        format!("{}.{}", self.namespace(), name)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} step", self.title())
    }
}

/// Two-phase unit of packaging work.
///
/// `preflight_check` must not touch the filesystem beyond probing for tools.
/// `execute` reads upstream outputs from `vars` only; the pipeline merges
/// whatever `add_variables` exports once `execute` (or `adopt_existing`, for a
/// skipped stage) succeeds.
pub trait Stage {
    fn kind(&self) -> StageKind;

    /// `skip: true` from configuration.
    fn configured_skip(&self) -> bool;

    fn platform(&self) -> Option<&PlatformSet> {
        None
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()>;

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()>;

    /// Called instead of `execute` when the stage is skipped. Picks up what an
    /// earlier run left behind so `add_variables` can still export it. Must
    /// not modify anything.
    fn adopt_existing(&mut self, _ctx: &RunContext<'_>, _vars: &Variables) -> ShipResult<()> {
        Ok(())
    }

    /// Export this stage's outputs. Calling it again yields the same entries.
    fn add_variables(&self, vars: &mut Variables);

    fn skip_reason(&self, platform: Platform) -> Option<String> {
        if self.configured_skip() {
            Some("skipping".to_string())
        } else if !applies_to(self.platform(), platform) {
            Some(format!("skipping, not applicable on {platform}"))
        } else {
            None
        }
    }

    /// The shared environment plus this stage's own exports, for its
    /// post-processing commands.
    fn scoped_variables(&self, vars: &Variables) -> Variables {
        let mut scoped = vars.clone();
        self.add_variables(&mut scoped);
        scoped
    }
}

/// Closed set of stages held by the pipeline.
#[derive(Debug)]
pub enum PipelineStage {
    Prepare(PrepareStage),
    Fetch(FetchStage),
    Build(BuildStage),
    Prune(PruneStage),
    AddLauncher(AddLauncherStage),
    Zip(ZipStage),
    Debian(DebianStage),
    DiskImage(DmgStage),
    Installer(NsisStage),
}

impl PipelineStage {
    pub fn as_stage(&self) -> &dyn Stage {
        match self {
            PipelineStage::Prepare(stage) => stage,
            PipelineStage::Fetch(stage) => stage,
            PipelineStage::Build(stage) => stage,
            PipelineStage::Prune(stage) => stage,
            PipelineStage::AddLauncher(stage) => stage,
            PipelineStage::Zip(stage) => stage,
            PipelineStage::Debian(stage) => stage,
            PipelineStage::DiskImage(stage) => stage,
            PipelineStage::Installer(stage) => stage,
        }
    }

    pub fn as_stage_mut(&mut self) -> &mut dyn Stage {
        match self {
            PipelineStage::Prepare(stage) => stage,
            PipelineStage::Fetch(stage) => stage,
            PipelineStage::Build(stage) => stage,
            PipelineStage::Prune(stage) => stage,
            PipelineStage::AddLauncher(stage) => stage,
            PipelineStage::Zip(stage) => stage,
            PipelineStage::Debian(stage) => stage,
            PipelineStage::DiskImage(stage) => stage,
            PipelineStage::Installer(stage) => stage,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.as_stage().kind()
    }
}

/// Locate `program` on the search path and report it as a satisfied check.
pub fn require_tool(ctx: &RunContext<'_>, program: &str) -> ShipResult<PathBuf> {
    match ctx.runner.locate(program) {
        Some(path) => {
            ctx.logger.check_ok(&format!(
                "Found '{program}' command at: {}",
                path.display()
            ));
            Ok(path)
        }
        None => Err(ShipError::Precondition(format!(
            "Unable to locate the '{program}' command"
        ))),
    }
}

pub fn path_variable(vars: &Variables, key: &str) -> ShipResult<PathBuf> {
    vars.get(key).map(PathBuf::from)
}

/// Name and version discovered by the build stage.
pub fn application(vars: &Variables) -> ShipResult<(String, String)> {
    Ok((
        vars.get(APPLICATION_NAME)?.to_string(),
        vars.get(APPLICATION_VERSION)?.to_string(),
    ))
}

/// Form of an application name usable as a single path component.
///
/// A scoped package name loses its `@scope/` prefix, and any remaining path
/// separators become dashes.
pub fn file_name_for(name: &str) -> String {
    let unscoped = match name.strip_prefix('@') {
        Some(scoped) => scoped.split_once('/').map_or(scoped, |(_, rest)| rest),
        None => name,
    };
    unscoped.replace(['/', '\\'], "-")
}

/// Remove `path` if present and create it again, empty.
pub fn recreate_dir(path: &Path) -> ShipResult<()> {
    if path.symlink_metadata().is_ok() {
        crate::fsutil::remove_path(path)?;
    }
    fs::create_dir_all(path).map_err(|err| ShipError::io("Failed to create directory", path, err))
}

pub fn write_file(path: &Path, contents: &str) -> ShipResult<()> {
    fs::write(path, contents).map_err(|err| ShipError::io("Failed to write file", path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_listed_in_execution_order() {
        let mut sorted = StageKind::ORDER;
        sorted.sort();
        assert_eq!(sorted, StageKind::ORDER);
        assert_eq!(StageKind::ORDER[0], StageKind::Prepare);
        assert_eq!(StageKind::ORDER[8], StageKind::Installer);
    }

    #[test]
    fn namespaced_keys() {
        assert_eq!(StageKind::Prepare.key("tempDirectory"), "prepareStep.tempDirectory");
        assert_eq!(StageKind::Build.key("applicationName"), APPLICATION_NAME);
        assert_eq!(StageKind::DiskImage.to_string(), "DMG step");
    }

    #[test]
    fn only_native_formats_are_platform_bound() {
        assert_eq!(StageKind::Debian.native_platform(), Some(Platform::Linux));
        assert_eq!(StageKind::DiskImage.native_platform(), Some(Platform::Macos));
        assert_eq!(StageKind::Installer.native_platform(), Some(Platform::Windows));
        assert_eq!(StageKind::Zip.native_platform(), None);
    }

    #[test]
    fn scoped_names_become_single_path_components() {
        assert_eq!(file_name_for("@acme/demo"), "demo");
        assert_eq!(file_name_for("demo"), "demo");
        assert_eq!(file_name_for("tools/cli"), "tools-cli");
        assert_eq!(file_name_for("a\\b"), "a-b");
    }
}
