use std::path::PathBuf;

use crate::config::PrepareConfig;
use crate::error::{ShipError, ShipResult};
use crate::pipeline::RunContext;
use crate::process::resolve_path;
use crate::stages::{Stage, StageKind, recreate_dir};
use crate::variables::Variables;

const DEFAULT_TEMP_DIRECTORY: &str = "ship-tmp";

/// Creates the scratch directory every later stage works inside.
#[derive(Debug)]
pub struct PrepareStage {
    config: PrepareConfig,
    temp_directory: Option<PathBuf>,
}

impl PrepareStage {
    pub fn new(config: PrepareConfig) -> Self {
        Self {
            config,
            temp_directory: None,
        }
    }

    fn resolve(&self, ctx: &RunContext<'_>) -> PathBuf {
        let configured = self
            .config
            .temp_directory
            .as_deref()
            .unwrap_or(DEFAULT_TEMP_DIRECTORY);
        resolve_path(ctx.work_dir, configured)
    }
}

impl Stage for PrepareStage {
    fn kind(&self) -> StageKind {
        StageKind::Prepare
    }

    fn configured_skip(&self) -> bool {
        self.config.skip
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        let path = self.resolve(ctx);
        if path.exists() && !path.is_dir() {
            return Err(ShipError::Precondition(format!(
                "Temporary directory '{}' exists but is not a directory",
                path.display()
            )));
        }
        ctx.logger.check_ok(&format!(
            "Using temporary directory '{}'",
            path.display()
        ));
        Ok(())
    }

    fn execute(&mut self, ctx: &RunContext<'_>, _vars: &Variables) -> ShipResult<()> {
        let path = self.resolve(ctx);
        ctx.logger
            .info(&format!("Creating temporary directory '{}'", path.display()));
        recreate_dir(&path)?;
        self.temp_directory = Some(path);
        Ok(())
    }

    fn adopt_existing(&mut self, ctx: &RunContext<'_>, _vars: &Variables) -> ShipResult<()> {
        let path = self.resolve(ctx);
        if !path.is_dir() {
            return Err(ShipError::Execution(format!(
                "Temporary directory '{}' does not exist and the Prepare step is skipped",
                path.display()
            )));
        }
        ctx.logger
            .info(&format!("Reusing temporary directory '{}'", path.display()));
        self.temp_directory = Some(path);
        Ok(())
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some(path) = &self.temp_directory {
            vars.set(
                self.kind().key("tempDirectory"),
                path.to_string_lossy().into_owned(),
            );
        }
    }
}
