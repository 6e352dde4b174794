//! User supplied shell command lists attached to stage extension points.

use std::path::Path;

use serde::Deserialize;

use crate::error::{ShipError, ShipResult};
use crate::pipeline::RunContext;
use crate::platform::{Platform, PlatformSet, applies_to};
use crate::process::{Invocation, shell_program};
use crate::variables::{Variables, placeholders};

/// A command line, optionally restricted to some platforms.
///
/// ```yaml
/// postBuild:
///   - "npm run lint"
///   - platform: [linux, macos]
///     command: "chmod +x ${fetchStep.sourceDirectory}/run.sh"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Restricted {
        #[serde(default)]
        platform: Option<PlatformSet>,
        command: String,
    },
}

impl CommandSpec {
    pub fn command(&self) -> &str {
        match self {
            CommandSpec::Line(command) => command,
            CommandSpec::Restricted { command, .. } => command,
        }
    }

    pub fn platform(&self) -> Option<&PlatformSet> {
        match self {
            CommandSpec::Line(_) => None,
            CommandSpec::Restricted { platform, .. } => platform.as_ref(),
        }
    }

    pub fn applies_to(&self, platform: Platform) -> bool {
        applies_to(self.platform(), platform)
    }
}

impl From<&str> for CommandSpec {
    fn from(command: &str) -> Self {
        CommandSpec::Line(command.to_string())
    }
}

/// Problem found with a single entry while checking a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandIssue {
    Empty { index: usize },
    MalformedTemplate { index: usize, reason: String },
}

/// Ordered commands run one after the other; the first failure stops the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    label: String,
    commands: Vec<CommandSpec>,
}

impl CommandList {
    pub fn new(label: impl Into<String>, commands: Vec<CommandSpec>) -> Self {
        Self {
            label: label.into(),
            commands,
        }
    }

    pub fn from_config(label: &str, commands: Option<&Vec<CommandSpec>>) -> Self {
        Self::new(label, commands.cloned().unwrap_or_default())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Structural problems of entries that would run on `platform`.
    pub fn issues(&self, platform: Platform) -> Vec<CommandIssue> {
        self.commands
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.applies_to(platform))
            .filter_map(|(index, spec)| {
                let command = spec.command();
                if command.trim().is_empty() {
                    Some(CommandIssue::Empty { index })
                } else {
                    placeholders(command)
                        .err()
                        .map(|reason| CommandIssue::MalformedTemplate { index, reason })
                }
            })
            .collect()
    }

    /// Check every entry without running anything. All problems are reported
    /// before the result is returned.
    pub fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        if self.commands.is_empty() {
            return Ok(());
        }

        let mut applicable = 0usize;
        for (index, spec) in self.commands.iter().enumerate() {
            if spec.applies_to(ctx.platform) {
                applicable += 1;
            } else {
                ctx.logger.info(&format!(
                    "{} command #{} only runs on {}; not applicable on {}",
                    self.label,
                    index + 1,
                    spec.platform().map(ToString::to_string).unwrap_or_default(),
                    ctx.platform
                ));
            }
        }

        let issues = self.issues(ctx.platform);
        for issue in &issues {
            match issue {
                CommandIssue::Empty { index } => ctx
                    .logger
                    .check_error(&format!("{} command #{} is empty", self.label, index + 1)),
                CommandIssue::MalformedTemplate { index, reason } => ctx.logger.check_error(
                    &format!("{} command #{} is malformed: {reason}", self.label, index + 1),
                ),
            }
        }
        if !issues.is_empty() {
            return Err(ShipError::Precondition(format!(
                "'{}' contains {} invalid command(s)",
                self.label,
                issues.len()
            )));
        }

        if applicable > 0 {
            let (shell, _) = shell_program(ctx.platform);
            if ctx.runner.locate(shell).is_none() {
                return Err(ShipError::Precondition(format!(
                    "Unable to locate '{shell}' needed to run '{}' commands",
                    self.label
                )));
            }
            ctx.logger.check_ok(&format!(
                "{} applicable '{}' command(s) look valid",
                applicable, self.label
            ));
        }
        Ok(())
    }

    /// Substitute and run each applicable command in `cwd`, stopping at the
    /// first one that cannot start or exits non-zero.
    pub fn execute(&self, ctx: &RunContext<'_>, vars: &Variables, cwd: &Path) -> ShipResult<()> {
        for spec in self.commands.iter().filter(|spec| spec.applies_to(ctx.platform)) {
            let line = vars.substitute(spec.command()).inspect_err(|err| {
                ctx.logger.error(&format!(
                    "Unable to expand {} command '{}': {err}",
                    self.label,
                    spec.command()
                ));
            })?;
            ctx.logger
                .info(&format!("Running {} command '{line}'", self.label));
            ctx.run_checked(&Invocation::shell(&line, cwd, ctx.platform))?;
        }
        Ok(())
    }
}
