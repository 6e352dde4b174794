use std::fs;
use std::path::{Path, PathBuf};

use crate::checksum::write_checksum_file;
use crate::commands::CommandList;
use crate::config::DmgConfig;
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

const DMG_SOURCE_DIR: &str = "dmg_source";

/// Escape the five XML special characters.
pub fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug)]
struct DmgOutputs {
    source_directory: PathBuf,
    dmg_file: PathBuf,
    sha256: Option<String>,
}

/// Produces a macOS disk image holding an `.app` bundle.
#[derive(Debug)]
pub struct DmgStage {
    config: DmgConfig,
    pre_pack: CommandList,
    outputs: Option<DmgOutputs>,
}

impl DmgStage {
    pub fn new(config: DmgConfig) -> Self {
        let pre_pack = CommandList::from_config("prePack", config.pre_pack.as_ref());
        Self {
            config,
            pre_pack,
            outputs: None,
        }
    }

    /// `Info.plist` for the bundle, falling back to the application identity.
    /// `executable` names the bundle's main file and must be path safe.
    pub fn info_plist(&self, title: &str, executable: &str, version: &str) -> String {
        let or = |value: &Option<String>, fallback: &str| {
            xml_escape(value.as_deref().unwrap_or(fallback))
        };
        let entries = [
            ("CFBundleDisplayName", or(&self.config.cf_bundle_display_name, title)),
            (
                "CFBundleDevelopmentRegion",
                or(&self.config.cf_bundle_development_region, "en"),
            ),
            ("CFBundleExecutable", or(&self.config.cf_bundle_executable, executable)),
            ("CFBundleIdentifier", or(&self.config.cf_bundle_identifier, title)),
            ("CFBundleInfoDictionaryVersion", "6.0".to_string()),
            ("CFBundleName", or(&self.config.cf_bundle_name, title)),
            ("CFBundlePackageType", "APPL".to_string()),
            (
                "CFBundleShortVersionString",
                or(&self.config.cf_bundle_short_version_string, version),
            ),
            ("CFBundleVersion", or(&self.config.cf_bundle_version, version)),
            ("LSMinimumSystemVersion", "10.15".to_string()),
            (
                "NSHumanReadableCopyright",
                or(&self.config.ns_human_readable_copyright, ""),
            ),
            ("NSHighResolutionCapable", "True".to_string()),
        ];

        let mut plist = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
             <plist version=\"1.0\">\n    <dict>\n",
        );
        for (key, value) in entries {
            plist.push_str(&format!(
                "        <key>{key}</key>\n        <string>{value}</string>\n"
            ));
        }
        plist.push_str(
            "        <key>CFBundleSupportedPlatforms</key>\n        <array>\n            <string>MacOSX</string>\n        </array>\n",
        );
        plist.push_str("    </dict>\n</plist>\n");
        plist
    }
}

#[cfg(unix)]
fn link_applications(staging: &Path) -> ShipResult<()> {
    let link = staging.join("Applications");
    std::os::unix::fs::symlink("/Applications", &link)
        .map_err(|err| ShipError::io("Failed to create Applications link", &link, err))
}

#[cfg(not(unix))]
fn link_applications(_staging: &Path) -> ShipResult<()> {
    Ok(())
}

impl Stage for DmgStage {
    fn kind(&self) -> StageKind {
        StageKind::DiskImage
    }

    fn configured_skip(&self) -> bool {
        self.config.skip
    }

    fn platform(&self) -> Option<&PlatformSet> {
        self.config.platform.as_ref()
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        require_tool(ctx, "hdiutil")?;
        self.pre_pack.preflight_check(ctx)
    }

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let temp = path_variable(vars, "prepareStep.tempDirectory")?;
        let source = path_variable(vars, "fetchStep.sourceDirectory")?;
        let (title, version) = application(vars)?;
        let file_name = file_name_for(&title);

        let staging = temp.join(DMG_SOURCE_DIR);
        recreate_dir(&staging)?;
        let contents = staging.join(format!("{file_name}.app")).join("Contents");
        let resources = contents.join("Resources");
        ctx.logger
            .info(&format!("Copying source to '{}'", resources.display()));
        copy_dir_recursive(&source, &resources)?;
        write_file(
            &contents.join("Info.plist"),
            &self.info_plist(&title, &file_name, &version),
        )?;
        link_applications(&staging)?;

        let dmg_file = temp.join(format!("{file_name}_{version}.dmg"));
        self.outputs = Some(DmgOutputs {
            source_directory: staging.clone(),
            dmg_file: dmg_file.clone(),
            sha256: None,
        });

        let scoped = self.scoped_variables(vars);
        self.pre_pack.execute(ctx, &scoped, &staging)?;

        let create = Invocation::new(
            "hdiutil",
            [
                "create".to_string(),
                "-volname".to_string(),
                title.clone(),
                "-srcfolder".to_string(),
                staging.to_string_lossy().into_owned(),
                "-ov".to_string(),
                "-format".to_string(),
                "UDZO".to_string(),
                dmg_file.to_string_lossy().into_owned(),
            ],
            &temp,
        );
        ctx.logger.info(&format!("Creating disk image with '{create}'"));
        ctx.run_checked(&create)?;

        if !dmg_file.is_file() {
            return Err(ShipError::Execution(format!(
                "hdiutil did not produce '{}'",
                dmg_file.display()
            )));
        }
        let (digest, _) = write_checksum_file(&dmg_file)?;
        ctx.logger
            .info(&format!("Created DMG file '{}'", dmg_file.display()));
        if let Some(outputs) = self.outputs.as_mut() {
            outputs.sha256 = Some(digest);
        }
        Ok(())
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some(outputs) = &self.outputs {
            vars.set(
                self.kind().key("dmgSourceDirectory"),
                outputs.source_directory.to_string_lossy().into_owned(),
            );
            vars.set(
                self.kind().key("dmgFile"),
                outputs.dmg_file.to_string_lossy().into_owned(),
            );
            if let Some(digest) = &outputs.sha256 {
                vars.set(self.kind().key("sha256"), digest.clone());
            }
        }
    }
}
