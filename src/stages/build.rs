use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::commands::CommandList;
use crate::config::BuildConfig;
use crate::error::{ShipError, ShipResult};
use crate::pipeline::RunContext;
use crate::process::Invocation;
use crate::stages::{
    APPLICATION_NAME, APPLICATION_VERSION, Stage, StageKind, path_variable, require_tool,
};
use crate::variables::Variables;

const DEFAULT_PACKAGE_MANAGER: &str = "npm";
const DEFAULT_SCRIPT_NAME: &str = "build";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

/// Builds the fetched source and discovers the application name and version.
#[derive(Debug)]
pub struct BuildStage {
    config: BuildConfig,
    commands: Option<CommandList>,
    post_build: CommandList,
    application: Option<(String, String)>,
}

impl BuildStage {
    pub fn new(config: BuildConfig) -> Self {
        let commands = config
            .commands
            .clone()
            .map(|commands| CommandList::new("commands", commands));
        let post_build = CommandList::from_config("postBuild", config.post_build.as_ref());
        Self {
            config,
            commands,
            post_build,
            application: None,
        }
    }

    fn package_manager(&self) -> &str {
        self.config
            .package_manager
            .as_deref()
            .unwrap_or(DEFAULT_PACKAGE_MANAGER)
    }

    fn script_name(&self) -> &str {
        self.config
            .script_name
            .as_deref()
            .unwrap_or(DEFAULT_SCRIPT_NAME)
    }

    fn discover_application(&self, source: &Path) -> ShipResult<(String, String)> {
        if let (Some(name), Some(version)) = (
            &self.config.application_name,
            &self.config.application_version,
        ) {
            return Ok((name.clone(), version.clone()));
        }

        let manifest_path = source.join("package.json");
        let content = fs::read_to_string(&manifest_path)
            .map_err(|err| ShipError::io("Failed to read package manifest", &manifest_path, err))?;
        let manifest: PackageManifest = serde_json::from_str(&content).map_err(|err| {
            ShipError::Execution(format!(
                "Failed to parse '{}': {err}",
                manifest_path.display()
            ))
        })?;

        let name = self
            .config
            .application_name
            .clone()
            .or(manifest.product_name)
            .or(manifest.name)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                ShipError::Execution(format!(
                    "'{}' does not declare an application name",
                    manifest_path.display()
                ))
            })?;
        let version = self
            .config
            .application_version
            .clone()
            .or(manifest.version)
            .filter(|version| !version.trim().is_empty())
            .ok_or_else(|| {
                ShipError::Execution(format!(
                    "'{}' does not declare a version",
                    manifest_path.display()
                ))
            })?;
        Ok((name, version))
    }
}

impl Stage for BuildStage {
    fn kind(&self) -> StageKind {
        StageKind::Build
    }

    fn configured_skip(&self) -> bool {
        self.config.skip
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        match &self.commands {
            Some(commands) => {
                ctx.logger.check_ok("Will build project using commands");
                commands.preflight_check(ctx)?;
            }
            None => {
                ctx.logger.check_ok(&format!(
                    "Will build project with '{} run {}'",
                    self.package_manager(),
                    self.script_name()
                ));
                require_tool(ctx, self.package_manager())?;
            }
        }
        self.post_build.preflight_check(ctx)
    }

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let source = path_variable(vars, "fetchStep.sourceDirectory")?;

        match &self.commands {
            Some(commands) => commands.execute(ctx, vars, &source)?,
            None => {
                let package_manager = self.package_manager();
                for args in [vec!["install"], vec!["run", self.script_name()]] {
                    let invocation = Invocation::new(package_manager, args, &source);
                    ctx.logger.info(&format!("Running '{invocation}'"));
                    ctx.run_checked(&invocation)?;
                }
            }
        }

        let (name, version) = self.discover_application(&source)?;
        ctx.logger
            .info(&format!("Built application '{name}' version {version}"));
        self.application = Some((name, version));

        let scoped = self.scoped_variables(vars);
        self.post_build.execute(ctx, &scoped, &source)
    }

    fn adopt_existing(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let source = path_variable(vars, "fetchStep.sourceDirectory")?;
        let (name, version) = self.discover_application(&source)?;
        ctx.logger
            .info(&format!("Using existing build of '{name}' version {version}"));
        self.application = Some((name, version));
        Ok(())
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some((name, version)) = &self.application {
            vars.set(APPLICATION_NAME, name.clone());
            vars.set(APPLICATION_VERSION, version.clone());
        }
    }
}
