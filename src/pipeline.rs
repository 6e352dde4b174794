use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::{ShipError, ShipResult};
use crate::logger::Logger;
use crate::observability::MetricsCollector;
use crate::platform::Platform;
use crate::process::{CommandOutput, CommandRunner, Invocation};
use crate::stages::{
    AddLauncherStage, BuildStage, DebianStage, DmgStage, FetchStage, NsisStage, PipelineStage,
    PrepareStage, PruneStage, StageKind, ZipStage,
};
use crate::validation::validate_config;
use crate::variables::Variables;

/// Everything a stage needs from its surroundings for one call.
pub struct RunContext<'a> {
    pub platform: Platform,
    /// Directory relative configuration paths are resolved against.
    pub work_dir: &'a Path,
    pub runner: &'a dyn CommandRunner,
    pub logger: &'a dyn Logger,
    pub metrics: &'a MetricsCollector,
}

impl RunContext<'_> {
    /// Run `invocation` and fail unless it exits with status zero.
    ///
    /// The command line, status and captured output of a failure are logged.
    pub fn run_checked(&self, invocation: &Invocation) -> ShipResult<CommandOutput> {
        self.metrics.record_command();
        let output = match self.runner.run(invocation) {
            Ok(output) => output,
            Err(err) => {
                self.logger
                    .error(&format!("Unable to start command '{invocation}': {err}"));
                return Err(ShipError::Execution(format!(
                    "unable to start '{}': {err}",
                    invocation.program
                )));
            }
        };

        if !output.success() {
            self.logger.error(&format!(
                "Command '{invocation}' failed with {}",
                output.status_label()
            ));
            if !output.output.trim().is_empty() {
                self.logger
                    .error(&format!("Command reported: {}", output.output.trim_end()));
            }
            return Err(ShipError::Execution(format!(
                "command '{invocation}' failed with {}",
                output.status_label()
            )));
        }

        debug!(command = %invocation, output = output.output.as_str(), "Command finished");
        Ok(output)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Preflighted,
    Executed,
    Skipped,
    Failed,
}

impl StageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Preflighted => "preflighted",
            StageStatus::Executed => "executed",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        }
    }
}

type Activation = fn(&Config, Platform) -> bool;
type Constructor = fn(&Config) -> ShipResult<PipelineStage>;

/// Row of the stage table: when a stage takes part in a run and how to build it.
struct StageEntry {
    kind: StageKind,
    active: Activation,
    build: Constructor,
}

fn stage_table() -> [StageEntry; 9] {
    [
        StageEntry {
            kind: StageKind::Prepare,
            active: |_, _| true,
            build: |config| {
                Ok(PipelineStage::Prepare(PrepareStage::new(
                    config.prepare.clone().unwrap_or_default(),
                )))
            },
        },
        StageEntry {
            kind: StageKind::Fetch,
            active: |_, _| true,
            build: |config| {
                let section = required(config.fetch.as_ref(), "fetch")?;
                Ok(PipelineStage::Fetch(FetchStage::new(section.clone())?))
            },
        },
        StageEntry {
            kind: StageKind::Build,
            active: |_, _| true,
            build: |config| {
                let section = required(config.build.as_ref(), "build")?;
                Ok(PipelineStage::Build(BuildStage::new(section.clone())))
            },
        },
        StageEntry {
            kind: StageKind::Prune,
            active: |_, _| true,
            build: |config| {
                let section = required(config.prune.as_ref(), "prune")?;
                Ok(PipelineStage::Prune(PruneStage::new(section.clone())))
            },
        },
        StageEntry {
            kind: StageKind::AddLauncher,
            active: |config, _| config.add_launcher.is_some(),
            build: |config| {
                let section = required(config.add_launcher.as_ref(), "addLauncher")?;
                Ok(PipelineStage::AddLauncher(AddLauncherStage::new(
                    section.clone(),
                )))
            },
        },
        StageEntry {
            kind: StageKind::Zip,
            active: |config, _| config.zip.is_some(),
            build: |config| {
                let section = required(config.zip.as_ref(), "zip")?;
                Ok(PipelineStage::Zip(ZipStage::new(section.clone())))
            },
        },
        StageEntry {
            kind: StageKind::Debian,
            active: |config, platform| {
                config.debian.is_some() && native_to(StageKind::Debian, platform)
            },
            build: |config| {
                let section = required(config.debian.as_ref(), "debian")?;
                Ok(PipelineStage::Debian(DebianStage::new(section.clone())))
            },
        },
        StageEntry {
            kind: StageKind::DiskImage,
            active: |config, platform| {
                config.dmg.is_some() && native_to(StageKind::DiskImage, platform)
            },
            build: |config| {
                let section = required(config.dmg.as_ref(), "dmg")?;
                Ok(PipelineStage::DiskImage(DmgStage::new(section.clone())))
            },
        },
        StageEntry {
            kind: StageKind::Installer,
            active: |config, platform| {
                config.nsis.is_some() && native_to(StageKind::Installer, platform)
            },
            build: |config| {
                let section = required(config.nsis.as_ref(), "nsis")?;
                Ok(PipelineStage::Installer(NsisStage::new(section.clone())))
            },
        },
    ]
}

fn required<'a, T>(section: Option<&'a T>, name: &str) -> ShipResult<&'a T> {
    section.ok_or_else(|| {
        ShipError::Configuration(format!(
            "Configuration file doesn't have a '{name}' section"
        ))
    })
}

fn native_to(kind: StageKind, platform: Platform) -> bool {
    kind.native_platform().is_none_or(|native| native == platform)
}

/// Build the ordered list of stages taking part in a run on `platform`.
pub fn active_stages(config: &Config, platform: Platform) -> ShipResult<Vec<PipelineStage>> {
    let mut stages = Vec::new();
    for entry in stage_table() {
        if (entry.active)(config, platform) {
            stages.push((entry.build)(config)?);
        } else {
            debug!(stage = %entry.kind, "Stage not active for this configuration");
        }
    }
    Ok(stages)
}

/// Drives the stages of one packaging run.
pub struct Pipeline {
    stages: Vec<PipelineStage>,
    statuses: Vec<StageStatus>,
    variables: Variables,
    platform: Platform,
    original_dir: PathBuf,
    work_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
    logger: Arc<dyn Logger>,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_kinds())
            .field("statuses", &self.statuses)
            .field("platform", &self.platform)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl Pipeline {
    /// Validate `config` and instantiate the stages that apply to this host.
    pub fn new(
        config: &Config,
        runner: Arc<dyn CommandRunner>,
        logger: Arc<dyn Logger>,
    ) -> ShipResult<Self> {
        let platform = Platform::current();
        let report = validate_config(config, platform);
        for warning in &report.warnings {
            warn!("{warning}");
        }
        if !report.is_ok() {
            return Err(ShipError::Configuration(report.errors.join("; ")));
        }

        let original_dir = env::current_dir()
            .map_err(|err| ShipError::io("Failed to determine current directory", ".", err))?;
        let stages = active_stages(config, platform)?;
        let statuses = vec![StageStatus::Pending; stages.len()];

        Ok(Self {
            stages,
            statuses,
            variables: Variables::new(),
            platform,
            work_dir: original_dir.clone(),
            original_dir,
            runner,
            logger,
            metrics: MetricsCollector::new(),
        })
    }

    /// Resolve relative configuration paths against `dir` instead of the
    /// current directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(PipelineStage::kind).collect()
    }

    pub fn statuses(&self) -> Vec<(StageKind, StageStatus)> {
        self.stage_kinds()
            .into_iter()
            .zip(self.statuses.iter().copied())
            .collect()
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// Check every active stage in order, stopping at the first failure.
    #[instrument(skip(self), fields(platform = %self.platform))]
    pub fn preflight_check(&mut self) -> bool {
        self.logger.section("Preflight Check");
        if let Err(err) = self.check_skipped_stages() {
            self.logger.check_error(&err.to_string());
            return false;
        }
        let ctx = RunContext {
            platform: self.platform,
            work_dir: &self.work_dir,
            runner: self.runner.as_ref(),
            logger: self.logger.as_ref(),
            metrics: &self.metrics,
        };

        for (stage, status) in self.stages.iter().zip(self.statuses.iter_mut()) {
            let stage = stage.as_stage();
            if let Some(reason) = stage.skip_reason(ctx.platform) {
                ctx.logger.subsection(&format!("{} ({reason})", stage.kind()));
                *status = StageStatus::Skipped;
                continue;
            }
            ctx.logger.subsection(&stage.kind().to_string());
            match stage.preflight_check(&ctx) {
                Ok(()) => *status = StageStatus::Preflighted,
                Err(err) => {
                    ctx.logger.check_error(&err.to_string());
                    *status = StageStatus::Failed;
                    return false;
                }
            }
        }
        true
    }

    /// Run the preflight check again, then execute every active stage in
    /// order. The process working directory is reset before each stage.
    /// Completed stages are not rolled back when a later one fails.
    #[instrument(skip(self), fields(platform = %self.platform))]
    pub fn execute(&mut self) -> bool {
        self.metrics.start_run();
        let started = Instant::now();
        let succeeded = self.execute_stages();
        self.metrics.record_total_duration(started.elapsed());
        if let Err(err) = self.restore_working_directory() {
            self.logger.error(&err.to_string());
            return false;
        }
        succeeded
    }

    fn execute_stages(&mut self) -> bool {
        if !self.preflight_check() {
            return false;
        }

        self.logger.section("Packaging");
        self.variables = Variables::new();

        for index in 0..self.stages.len() {
            if let Err(err) = self.restore_working_directory() {
                self.logger.error(&err.to_string());
                return false;
            }

            let ctx = RunContext {
                platform: self.platform,
                work_dir: &self.work_dir,
                runner: self.runner.as_ref(),
                logger: self.logger.as_ref(),
                metrics: &self.metrics,
            };
            let stage = self.stages[index].as_stage_mut();
            let kind = stage.kind();
            let mut timer = self.metrics.start_stage(kind.title());

            let outcome = match stage.skip_reason(ctx.platform) {
                Some(reason) => {
                    ctx.logger.subsection(&format!("{kind} ({reason})"));
                    stage
                        .adopt_existing(&ctx, &self.variables)
                        .map(|()| StageStatus::Skipped)
                }
                None => {
                    ctx.logger.subsection(&kind.to_string());
                    stage
                        .execute(&ctx, &self.variables)
                        .map(|()| StageStatus::Executed)
                }
            };
            match outcome {
                Ok(status) => {
                    let mut exported = Variables::new();
                    stage.add_variables(&mut exported);
                    self.variables.merge(exported);
                    self.statuses[index] = status;
                    timer.finish(status.as_str());
                }
                Err(err) => {
                    ctx.logger.error(&format!("{} step failed: {err}", kind.title()));
                    self.statuses[index] = StageStatus::Failed;
                    timer.finish(StageStatus::Failed.as_str());
                    return false;
                }
            }
        }
        true
    }

    /// Prepare empties the temporary directory, so a skipped Fetch step can
    /// only reuse an earlier checkout when Prepare is skipped too.
    fn check_skipped_stages(&self) -> ShipResult<()> {
        let skipped = |kind: StageKind| {
            self.stages
                .iter()
                .any(|stage| stage.kind() == kind && stage.as_stage().configured_skip())
        };
        if skipped(StageKind::Fetch) && !skipped(StageKind::Prepare) {
            return Err(ShipError::Precondition(
                "The Fetch step is skipped but the Prepare step would empty the temporary \
                 directory holding the source; skip the Prepare step as well"
                    .into(),
            ));
        }
        Ok(())
    }

    fn restore_working_directory(&self) -> ShipResult<()> {
        let current = env::current_dir().ok();
        if current.as_deref() == Some(self.original_dir.as_path()) {
            return Ok(());
        }
        env::set_current_dir(&self.original_dir).map_err(|err| {
            ShipError::io(
                "Failed to restore working directory",
                &self.original_dir,
                err,
            )
        })
    }
}
