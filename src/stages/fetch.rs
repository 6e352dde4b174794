use std::path::PathBuf;

use crate::commands::CommandList;
use crate::config::FetchConfig;
use crate::error::{ShipError, ShipResult};
use crate::pipeline::RunContext;
use crate::process::Invocation;
use crate::stages::{Stage, StageKind, path_variable, require_tool};
use crate::variables::Variables;

const GIT_SOURCE_DIR: &str = "git_source";
const DEFAULT_COMMANDS_SOURCE_DIR: &str = "source";

#[derive(Debug)]
enum FetchMode {
    Git { url: String, branch: Option<String> },
    Commands(CommandList),
}

/// Puts the application source into the temporary directory.
#[derive(Debug)]
pub struct FetchStage {
    skip: bool,
    mode: FetchMode,
    source_name: String,
    source_directory: Option<PathBuf>,
}

impl FetchStage {
    pub fn new(config: FetchConfig) -> ShipResult<Self> {
        let mode = match (config.git_url, config.commands) {
            (Some(url), None) => FetchMode::Git {
                url,
                branch: config.git_branch,
            },
            (None, Some(commands)) => FetchMode::Commands(CommandList::new("commands", commands)),
            (None, None) => {
                return Err(ShipError::Configuration(
                    "Neither 'gitUrl' nor 'commands' were specified in the 'fetch' section".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ShipError::Configuration(
                    "Only one of 'gitUrl' or 'commands' may be specified in the 'fetch' section"
                        .into(),
                ));
            }
        };
        let source_name = match mode {
            FetchMode::Git { .. } => GIT_SOURCE_DIR.to_string(),
            FetchMode::Commands(_) => config
                .source_directory
                .unwrap_or_else(|| DEFAULT_COMMANDS_SOURCE_DIR.to_string()),
        };
        Ok(Self {
            skip: config.skip,
            mode,
            source_name,
            source_directory: None,
        })
    }
}

impl Stage for FetchStage {
    fn kind(&self) -> StageKind {
        StageKind::Fetch
    }

    fn configured_skip(&self) -> bool {
        self.skip
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        match &self.mode {
            FetchMode::Git { url, .. } => {
                ctx.logger.check_ok(&format!(
                    "Will fetch project from git repository at '{url}'"
                ));
                require_tool(ctx, "git")?;
                let version = ctx
                    .runner
                    .run(&Invocation::new("git", ["--version"], ctx.work_dir))
                    .map_err(|err| {
                        ShipError::Precondition(format!("Unable to run 'git --version': {err}"))
                    })?;
                if !version.success() {
                    return Err(ShipError::Precondition(format!(
                        "Unable to run 'git --version'. Command reported: {}",
                        version.output.trim()
                    )));
                }
                ctx.logger.check_ok(&format!(
                    "Found 'git' command version: {}",
                    version.output.trim()
                ));
            }
            FetchMode::Commands(commands) => {
                ctx.logger.check_ok("Will fetch project using commands");
                commands.preflight_check(ctx)?;
            }
        }
        Ok(())
    }

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let temp_directory = path_variable(vars, "prepareStep.tempDirectory")?;
        let source_directory = temp_directory.join(&self.source_name);

        match &self.mode {
            FetchMode::Git { url, branch } => {
                let mut args = vec!["clone".to_string(), "--depth".into(), "1".into()];
                if let Some(branch) = branch {
                    args.push("--branch".into());
                    args.push(branch.clone());
                }
                args.push(url.clone());
                args.push(self.source_name.clone());
                let clone = Invocation::new("git", args, &temp_directory);
                ctx.logger
                    .info(&format!("Cloning repository with command '{clone}'"));
                ctx.run_checked(&clone)?;
            }
            FetchMode::Commands(commands) => {
                commands.execute(ctx, vars, &temp_directory)?;
            }
        }

        if !source_directory.is_dir() {
            return Err(ShipError::Execution(format!(
                "Fetch did not produce the source directory '{}'",
                source_directory.display()
            )));
        }
        self.source_directory = Some(source_directory);
        Ok(())
    }

    fn adopt_existing(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let source_directory =
            path_variable(vars, "prepareStep.tempDirectory")?.join(&self.source_name);
        if !source_directory.is_dir() {
            return Err(ShipError::Execution(format!(
                "Source directory '{}' does not exist and the Fetch step is skipped",
                source_directory.display()
            )));
        }
        ctx.logger.info(&format!(
            "Reusing source directory '{}'",
            source_directory.display()
        ));
        self.source_directory = Some(source_directory);
        Ok(())
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some(path) = &self.source_directory {
            vars.set(
                self.kind().key("sourceDirectory"),
                path.to_string_lossy().into_owned(),
            );
        }
    }
}
