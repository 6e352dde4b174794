use std::path::{Path, PathBuf};

use crate::checksum::write_checksum_file;
use crate::commands::CommandList;
use crate::config::NsisConfig;
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

const NSIS_SOURCE_DIR: &str = "nsis_source";
const INSTALLER_SCRIPT: &str = "installer.nsi";
const LAUNCHER_PATH: &str = "addLauncherStep.launcherPath";

/// Values substituted into the generated installer script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerScript {
    /// Directory the application is staged in; also keys the registry entry.
    pub name: String,
    pub title: String,
    pub version: String,
    pub publisher: String,
    pub install_directory: String,
    pub output_file: String,
    /// Launcher file inside the install directory the Start menu entry opens.
    pub launcher: Option<String>,
}

/// Quote a value for use inside an NSIS double-quoted string.
fn nsis_quote(value: &str) -> String {
    value.replace('"', "$\\\"")
}

/// Like [`nsis_quote`], but `$` is literal rather than a variable reference.
fn nsis_literal(value: &str) -> String {
    nsis_quote(&value.replace('$', "$$"))
}

impl InstallerScript {
    pub fn render(&self) -> String {
        let name = nsis_literal(&self.name);
        let title = nsis_literal(&self.title);
        let version = nsis_literal(&self.version);
        let publisher = nsis_literal(&self.publisher);
        let uninstall_key = format!(
            "Software\\Microsoft\\Windows\\CurrentVersion\\Uninstall\\{name}"
        );
        let (create_shortcut, delete_shortcut) = match &self.launcher {
            Some(launcher) => {
                let shortcut = nsis_literal(&file_name_for(&self.title));
                (
                    format!(
                        "\n  CreateShortCut \"$SMPROGRAMS\\{shortcut}.lnk\" \"$INSTDIR\\{}\"",
                        nsis_literal(launcher)
                    ),
                    format!("\n  Delete \"$SMPROGRAMS\\{shortcut}.lnk\""),
                )
            }
            None => (String::new(), String::new()),
        };
        format!(
            r#"Unicode true
!include "MUI2.nsh"

Name "{title}"
OutFile "{output}"
InstallDir "{install_dir}"
RequestExecutionLevel admin

!insertmacro MUI_PAGE_DIRECTORY
!insertmacro MUI_PAGE_INSTFILES
!insertmacro MUI_UNPAGE_CONFIRM
!insertmacro MUI_UNPAGE_INSTFILES
!insertmacro MUI_LANGUAGE "English"

Section "Install"
  SetOutPath "$INSTDIR"
  File /r "{name}\*.*"
  WriteUninstaller "$INSTDIR\uninstall.exe"{create_shortcut}
  WriteRegStr HKLM "{uninstall_key}" "DisplayName" "{title}"
  WriteRegStr HKLM "{uninstall_key}" "DisplayVersion" "{version}"
  WriteRegStr HKLM "{uninstall_key}" "Publisher" "{publisher}"
  WriteRegStr HKLM "{uninstall_key}" "UninstallString" "$INSTDIR\uninstall.exe"
SectionEnd

Section "Uninstall"{delete_shortcut}
  RMDir /r "$INSTDIR"
  DeleteRegKey HKLM "{uninstall_key}"
SectionEnd
"#,
            output = nsis_literal(&self.output_file),
            install_dir = nsis_quote(&self.install_directory),
        )
    }
}

#[derive(Debug)]
struct NsisOutputs {
    source_directory: PathBuf,
    installer_script: PathBuf,
    installer_file: PathBuf,
    sha256: Option<String>,
}

/// Produces a Windows installer with `makensis`.
#[derive(Debug)]
pub struct NsisStage {
    config: NsisConfig,
    pre_pack: CommandList,
    outputs: Option<NsisOutputs>,
}

impl NsisStage {
    pub fn new(config: NsisConfig) -> Self {
        let pre_pack = CommandList::from_config("prePack", config.pre_pack.as_ref());
        Self {
            config,
            pre_pack,
            outputs: None,
        }
    }

    fn script(
        &self,
        name: &str,
        version: &str,
        output_file: &str,
        launcher: Option<String>,
    ) -> InstallerScript {
        let dir_name = file_name_for(name);
        InstallerScript {
            title: self.config.app_title.clone().unwrap_or_else(|| name.to_string()),
            version: version.to_string(),
            publisher: self.config.publisher.clone().unwrap_or_default(),
            install_directory: self
                .config
                .install_directory
                .clone()
                .unwrap_or_else(|| format!("$PROGRAMFILES64\\{dir_name}")),
            output_file: output_file.to_string(),
            launcher,
            name: dir_name,
        }
    }
}

impl Stage for NsisStage {
    fn kind(&self) -> StageKind {
        StageKind::Installer
    }

    fn configured_skip(&self) -> bool {
        self.config.skip
    }

    fn platform(&self) -> Option<&PlatformSet> {
        self.config.platform.as_ref()
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        require_tool(ctx, "makensis")?;
        self.pre_pack.preflight_check(ctx)
    }

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let temp = path_variable(vars, "prepareStep.tempDirectory")?;
        let source = path_variable(vars, "fetchStep.sourceDirectory")?;
        let (name, version) = application(vars)?;

        let launcher = vars
            .get(LAUNCHER_PATH)
            .ok()
            .and_then(|path| Path::new(path).file_name())
            .map(|file| file.to_string_lossy().into_owned());
        let dir_name = file_name_for(&name);

        let staging = temp.join(NSIS_SOURCE_DIR);
        recreate_dir(&staging)?;
        let app_dir = staging.join(&dir_name);
        ctx.logger
            .info(&format!("Copying source to '{}'", app_dir.display()));
        copy_dir_recursive(&source, &app_dir)?;

        let installer_file = temp.join(format!("{dir_name}-setup-{version}.exe"));
        let script_path = staging.join(INSTALLER_SCRIPT);
        let script = self.script(
            &name,
            &version,
            &installer_file.to_string_lossy(),
            launcher,
        );
        write_file(&script_path, &script.render())?;

        // prePack commands may amend the generated script.
        self.outputs = Some(NsisOutputs {
            source_directory: staging.clone(),
            installer_script: script_path.clone(),
            installer_file: installer_file.clone(),
            sha256: None,
        });

        let scoped = self.scoped_variables(vars);
        self.pre_pack.execute(ctx, &scoped, &staging)?;

        let compile = Invocation::new("makensis", [INSTALLER_SCRIPT], &staging);
        ctx.logger.info(&format!("Compiling installer with '{compile}'"));
        ctx.run_checked(&compile)?;

        if !installer_file.is_file() {
            return Err(ShipError::Execution(format!(
                "makensis did not produce '{}'",
                installer_file.display()
            )));
        }
        let (digest, _) = write_checksum_file(&installer_file)?;
        ctx.logger
            .info(&format!("Created installer '{}'", installer_file.display()));
        if let Some(outputs) = self.outputs.as_mut() {
            outputs.sha256 = Some(digest);
        }
        Ok(())
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some(outputs) = &self.outputs {
            vars.set(
                self.kind().key("nsisSourceDirectory"),
                outputs.source_directory.to_string_lossy().into_owned(),
            );
            vars.set(
                self.kind().key("installerScript"),
                outputs.installer_script.to_string_lossy().into_owned(),
            );
            vars.set(
                self.kind().key("installerFile"),
                outputs.installer_file.to_string_lossy().into_owned(),
            );
            if let Some(digest) = &outputs.sha256 {
                vars.set(self.kind().key("sha256"), digest.clone());
            }
        }
    }
}
