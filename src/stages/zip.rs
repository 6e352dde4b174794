use std::path::PathBuf;

use crate::checksum::write_checksum_file;
use crate::commands::CommandList;
use crate::config::ZipConfig;
use crate::error::ShipResult;
use crate::fsutil::copy_dir_recursive;
use crate::pipeline::RunContext;
use crate::platform::{Platform, PlatformSet};
use crate::process::Invocation;
use crate::stages::{
    Stage, StageKind, application, file_name_for, path_variable, recreate_dir, require_tool,
};
use crate::variables::Variables;

const ZIP_SOURCE_DIR: &str = "zip_source";

#[derive(Debug, Default)]
struct ZipOutputs {
    source_directory: PathBuf,
    zip_file: PathBuf,
    sha256: String,
}

/// Packs the application directory into a zip archive.
#[derive(Debug)]
pub struct ZipStage {
    config: ZipConfig,
    pre_pack: CommandList,
    outputs: Option<ZipOutputs>,
}

impl ZipStage {
    pub fn new(config: ZipConfig) -> Self {
        let pre_pack = CommandList::from_config("prePack", config.pre_pack.as_ref());
        Self {
            config,
            pre_pack,
            outputs: None,
        }
    }
}

fn archiver(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "tar",
        Platform::Macos | Platform::Linux => "zip",
    }
}

/// Archiver invocation for `platform`; `dir_name` is relative to `cwd`.
fn archive_invocation(platform: Platform, zip_file: &str, dir_name: &str, cwd: PathBuf) -> Invocation {
    let args = match platform {
        Platform::Windows => vec!["-a", "-c", "-f", zip_file, dir_name],
        Platform::Macos | Platform::Linux => vec!["-r", "-q", zip_file, dir_name],
    };
    Invocation::new(archiver(platform), args, cwd)
}

impl Stage for ZipStage {
    fn kind(&self) -> StageKind {
        StageKind::Zip
    }

    fn configured_skip(&self) -> bool {
        self.config.skip
    }

    fn platform(&self) -> Option<&PlatformSet> {
        self.config.platform.as_ref()
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        require_tool(ctx, archiver(ctx.platform))?;
        self.pre_pack.preflight_check(ctx)
    }

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let temp = path_variable(vars, "prepareStep.tempDirectory")?;
        let source = path_variable(vars, "fetchStep.sourceDirectory")?;
        let (name, version) = application(vars)?;
        let name = file_name_for(&name);

        let zip_root = temp.join(ZIP_SOURCE_DIR);
        let dir_name = format!("{name}-{version}");
        let staging = zip_root.join(&dir_name);
        recreate_dir(&zip_root)?;
        ctx.logger
            .info(&format!("Copying source to '{}'", staging.display()));
        copy_dir_recursive(&source, &staging)?;

        let zip_file = temp.join(format!("{name}-{version}-{}.zip", ctx.platform));
        self.outputs = Some(ZipOutputs {
            source_directory: staging.clone(),
            zip_file: zip_file.clone(),
            sha256: String::new(),
        });

        let scoped = self.scoped_variables(vars);
        self.pre_pack.execute(ctx, &scoped, &staging)?;

        let archive = archive_invocation(
            ctx.platform,
            &zip_file.to_string_lossy(),
            &dir_name,
            zip_root,
        );
        ctx.logger.info(&format!("Creating archive with '{archive}'"));
        ctx.run_checked(&archive)?;

        let (digest, _) = write_checksum_file(&zip_file)?;
        ctx.logger.info(&format!(
            "Created zip file '{}' (sha256 {digest})",
            zip_file.display()
        ));
        if let Some(outputs) = self.outputs.as_mut() {
            outputs.sha256 = digest;
        }
        Ok(())
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some(outputs) = &self.outputs {
            vars.set(
                self.kind().key("zipSourceDirectory"),
                outputs.source_directory.to_string_lossy().into_owned(),
            );
            vars.set(
                self.kind().key("zipFile"),
                outputs.zip_file.to_string_lossy().into_owned(),
            );
            if !outputs.sha256.is_empty() {
                vars.set(self.kind().key("sha256"), outputs.sha256.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archiver_depends_on_platform() {
        let unix = archive_invocation(Platform::Linux, "/t/a.zip", "a-1", PathBuf::from("/t"));
        assert_eq!(unix.command_line(), "zip -r -q /t/a.zip a-1");
        let windows = archive_invocation(Platform::Windows, "a.zip", "a-1", PathBuf::from("C:/t"));
        assert_eq!(windows.program, "tar");
        assert_eq!(windows.args, vec!["-a", "-c", "-f", "a.zip", "a-1"]);
    }
}
