use std::fs;
use std::path::PathBuf;

use crate::checksum::write_checksum_file;
use crate::commands::CommandList;
use crate::config::DebianConfig;
use crate::error::{ShipError, ShipResult};
use crate::fsutil::copy_dir_recursive;
use crate::pipeline::RunContext;
use crate::platform::PlatformSet;
use crate::process::Invocation;
use crate::stages::{
    Stage, StageKind, application, file_name_for, path_variable, recreate_dir, require_tool,
    write_file,
};
use crate::variables::Variables;

const DEBIAN_SOURCE_DIR: &str = "debian_source";

/// Fields written to `DEBIAN/control`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFile {
    pub package: String,
    pub version: String,
    pub architecture: String,
    pub maintainer: String,
    pub description: String,
    pub section: String,
    pub priority: String,
    pub depends: Vec<String>,
}

impl ControlFile {
    pub fn render(&self) -> String {
        let mut out = format!(
            "Package: {}\nVersion: {}\nSection: {}\nPriority: {}\nArchitecture: {}\nMaintainer: {}\n",
            self.package, self.version, self.section, self.priority, self.architecture, self.maintainer
        );
        if !self.depends.is_empty() {
            out.push_str(&format!("Depends: {}\n", self.depends.join(", ")));
        }
        // Continuation lines of a multi-line description start with a space;
        // blank lines are written as " .".
        let mut lines = self.description.lines();
        out.push_str(&format!("Description: {}\n", lines.next().unwrap_or_default()));
        for line in lines {
            if line.trim().is_empty() {
                out.push_str(" .\n");
            } else {
                out.push_str(&format!(" {line}\n"));
            }
        }
        out
    }
}

/// Debian package names: lowercase letters, digits and `+-.`, starting with
/// an alphanumeric character, at least two characters long.
pub fn is_valid_package_name(name: &str) -> bool {
    name.len() >= 2
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
}

/// Debian architecture name of the host.
pub fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "i386",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        _ => "all",
    }
}

#[derive(Debug)]
struct DebianOutputs {
    source_directory: PathBuf,
    deb_file: PathBuf,
    sha256: Option<String>,
}

/// Produces a `.deb` package with `dpkg-deb`.
#[derive(Debug)]
pub struct DebianStage {
    config: DebianConfig,
    pre_pack: CommandList,
    outputs: Option<DebianOutputs>,
}

impl DebianStage {
    pub fn new(config: DebianConfig) -> Self {
        let pre_pack = CommandList::from_config("prePack", config.pre_pack.as_ref());
        Self {
            config,
            pre_pack,
            outputs: None,
        }
    }

    fn control_file(&self, name: &str, version: &str) -> ControlFile {
        ControlFile {
            package: self
                .config
                .package_name
                .clone()
                .unwrap_or_else(|| file_name_for(name).to_lowercase().replace([' ', '_'], "-")),
            version: version.to_string(),
            architecture: self
                .config
                .architecture
                .clone()
                .unwrap_or_else(|| host_architecture().to_string()),
            maintainer: self
                .config
                .maintainer
                .clone()
                .unwrap_or_else(|| "Unknown <unknown@localhost>".to_string()),
            description: self.config.description.clone().unwrap_or_else(|| name.to_string()),
            section: self.config.section.clone().unwrap_or_else(|| "utils".to_string()),
            priority: self
                .config
                .priority
                .clone()
                .unwrap_or_else(|| "optional".to_string()),
            depends: self.config.depends.clone(),
        }
    }
}

impl Stage for DebianStage {
    fn kind(&self) -> StageKind {
        StageKind::Debian
    }

    fn configured_skip(&self) -> bool {
        self.config.skip
    }

    fn platform(&self) -> Option<&PlatformSet> {
        self.config.platform.as_ref()
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        require_tool(ctx, "dpkg-deb")?;
        if let Some(name) = &self.config.package_name
            && !is_valid_package_name(name)
        {
            return Err(ShipError::Precondition(format!(
                "'{name}' is not a valid Debian package name"
            )));
        }
        self.pre_pack.preflight_check(ctx)
    }

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let temp = path_variable(vars, "prepareStep.tempDirectory")?;
        let source = path_variable(vars, "fetchStep.sourceDirectory")?;
        let (name, version) = application(vars)?;

        let control = self.control_file(&name, &version);
        if !is_valid_package_name(&control.package) {
            return Err(ShipError::Execution(format!(
                "'{}' is not a valid Debian package name; set 'packageName'",
                control.package
            )));
        }

        let staging = temp.join(DEBIAN_SOURCE_DIR);
        recreate_dir(&staging)?;
        let install_dir = staging.join("opt").join(&control.package);
        ctx.logger
            .info(&format!("Copying source to '{}'", install_dir.display()));
        copy_dir_recursive(&source, &install_dir)?;

        let debian_dir = staging.join("DEBIAN");
        fs::create_dir_all(&debian_dir)
            .map_err(|err| ShipError::io("Failed to create directory", &debian_dir, err))?;
        write_file(&debian_dir.join("control"), &control.render())?;

        let deb_file = temp.join(format!(
            "{}_{}_{}.deb",
            control.package, control.version, control.architecture
        ));
        self.outputs = Some(DebianOutputs {
            source_directory: staging.clone(),
            deb_file: deb_file.clone(),
            sha256: None,
        });

        let scoped = self.scoped_variables(vars);
        self.pre_pack.execute(ctx, &scoped, &staging)?;

        let build = Invocation::new(
            "dpkg-deb",
            [
                "--root-owner-group".to_string(),
                "--build".to_string(),
                staging.to_string_lossy().into_owned(),
                deb_file.to_string_lossy().into_owned(),
            ],
            &temp,
        );
        ctx.logger.info(&format!("Building package with '{build}'"));
        ctx.run_checked(&build)?;

        let (digest, _) = write_checksum_file(&deb_file)?;
        ctx.logger
            .info(&format!("Created Debian package '{}'", deb_file.display()));
        if let Some(outputs) = self.outputs.as_mut() {
            outputs.sha256 = Some(digest);
        }
        Ok(())
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some(outputs) = &self.outputs {
            vars.set(
                self.kind().key("debianSourceDirectory"),
                outputs.source_directory.to_string_lossy().into_owned(),
            );
            vars.set(
                self.kind().key("debFile"),
                outputs.deb_file.to_string_lossy().into_owned(),
            );
            if let Some(digest) = &outputs.sha256 {
                vars.set(self.kind().key("sha256"), digest.clone());
            }
        }
    }
}
