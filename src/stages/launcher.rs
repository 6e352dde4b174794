use std::path::{Path, PathBuf};

use crate::config::AddLauncherConfig;
use crate::error::{ShipError, ShipResult};
use crate::pipeline::RunContext;
use crate::platform::{Platform, PlatformSet};
use crate::stages::{
    APPLICATION_NAME, Stage, StageKind, file_name_for, path_variable, write_file,
};
use crate::variables::Variables;

const DEFAULT_LAUNCH_COMMAND: &str = "node .";

/// Writes a small start script into the application directory.
#[derive(Debug)]
pub struct AddLauncherStage {
    config: AddLauncherConfig,
    launcher_path: Option<PathBuf>,
}

impl AddLauncherStage {
    pub fn new(config: AddLauncherConfig) -> Self {
        Self {
            config,
            launcher_path: None,
        }
    }

    fn command(&self) -> &str {
        self.config
            .command
            .as_deref()
            .unwrap_or(DEFAULT_LAUNCH_COMMAND)
    }
}

/// File name and contents of the launcher for `platform`.
pub fn launcher_script(platform: Platform, name: &str, command: &str) -> (String, String) {
    match platform {
        Platform::Windows => (
            format!("{name}.cmd"),
            format!("@echo off\r\ncd /d \"%~dp0\"\r\n{command} %*\r\n"),
        ),
        Platform::Macos | Platform::Linux => (
            name.to_string(),
            format!(
                "#!/bin/sh\nAPP_DIR=\"$(cd \"$(dirname \"$0\")\" && pwd)\"\ncd \"$APP_DIR\" && exec {command} \"$@\"\n"
            ),
        ),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> ShipResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|err| ShipError::io("Failed to mark launcher executable", path, err))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> ShipResult<()> {
    Ok(())
}

impl Stage for AddLauncherStage {
    fn kind(&self) -> StageKind {
        StageKind::AddLauncher
    }

    fn configured_skip(&self) -> bool {
        self.config.skip
    }

    fn platform(&self) -> Option<&PlatformSet> {
        self.config.platform.as_ref()
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        if self.command().trim().is_empty() {
            return Err(ShipError::Precondition(
                "'command' in the 'addLauncher' section is empty".into(),
            ));
        }
        if let Some(name) = &self.config.name
            && (name.trim().is_empty() || name.contains(['/', '\\']))
        {
            return Err(ShipError::Precondition(format!(
                "Launcher name '{name}' must be a plain file name"
            )));
        }
        ctx.logger
            .check_ok(&format!("Launcher will run '{}'", self.command()));
        Ok(())
    }

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let source = path_variable(vars, "fetchStep.sourceDirectory")?;
        let name = match &self.config.name {
            Some(name) => name.clone(),
            None => file_name_for(vars.get(APPLICATION_NAME)?),
        };

        let (file_name, contents) = launcher_script(ctx.platform, &name, self.command());
        let path = source.join(file_name);
        ctx.logger
            .info(&format!("Writing launcher '{}'", path.display()));
        write_file(&path, &contents)?;
        make_executable(&path)?;
        self.launcher_path = Some(path);
        Ok(())
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some(path) = &self.launcher_path {
            vars.set(
                self.kind().key("launcherPath"),
                path.to_string_lossy().into_owned(),
            );
        }
    }
}
