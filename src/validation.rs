use serde::Serialize;

use crate::commands::{CommandIssue, CommandList, CommandSpec};
use crate::config::Config;
use crate::platform::{Platform, PlatformSet};
use crate::stages::StageKind;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Check a configuration for the host `platform` before any stage is built.
pub fn validate_config(config: &Config, platform: Platform) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.fetch.is_none() {
        report
            .errors
            .push("Configuration file doesn't have a 'fetch' section".into());
    }
    if config.build.is_none() {
        report
            .errors
            .push("Configuration file doesn't have a 'build' section".into());
    }
    if config.prune.is_none() {
        report
            .errors
            .push("Configuration file doesn't have a 'prune' section".into());
    }

    if let Some(fetch) = &config.fetch {
        match (&fetch.git_url, &fetch.commands) {
            (None, None) => report.errors.push(
                "Neither 'gitUrl' nor 'commands' were specified in the 'fetch' section".into(),
            ),
            (Some(_), Some(_)) => report.errors.push(
                "Only one of 'gitUrl' or 'commands' may be specified in the 'fetch' section"
                    .into(),
            ),
            (Some(url), None) if url.trim().is_empty() => report
                .errors
                .push("'gitUrl' in the 'fetch' section is empty".into()),
            _ => {}
        }
        report.merge(validate_commands(StageKind::Fetch, "commands", fetch.commands.as_ref()));
    }

    if let Some(build) = &config.build {
        report.merge(validate_commands(StageKind::Build, "commands", build.commands.as_ref()));
        report.merge(validate_commands(StageKind::Build, "postBuild", build.post_build.as_ref()));
    }

    if let Some(prune) = &config.prune {
        for (idx, pattern) in prune.patterns.iter().enumerate() {
            if let Err(err) = glob::Pattern::new(pattern) {
                report.errors.push(format!(
                    "Prune pattern {} ('{}') is not a valid glob: {}",
                    idx + 1,
                    pattern,
                    err
                ));
            }
        }
        report.merge(validate_commands(StageKind::Prune, "postPrune", prune.post_prune.as_ref()));
    }

    if let Some(launcher) = &config.add_launcher {
        report.merge(validate_restriction(StageKind::AddLauncher, launcher.platform.as_ref(), platform));
    }
    if let Some(zip) = &config.zip {
        report.merge(validate_restriction(StageKind::Zip, zip.platform.as_ref(), platform));
        report.merge(validate_commands(StageKind::Zip, "prePack", zip.pre_pack.as_ref()));
    }
    if let Some(debian) = &config.debian {
        report.merge(validate_packaging(StageKind::Debian, debian.platform.as_ref(), platform));
        report.merge(validate_commands(StageKind::Debian, "prePack", debian.pre_pack.as_ref()));
    }
    if let Some(dmg) = &config.dmg {
        report.merge(validate_packaging(StageKind::DiskImage, dmg.platform.as_ref(), platform));
        report.merge(validate_commands(StageKind::DiskImage, "prePack", dmg.pre_pack.as_ref()));
    }
    if let Some(nsis) = &config.nsis {
        report.merge(validate_packaging(StageKind::Installer, nsis.platform.as_ref(), platform));
        report.merge(validate_commands(StageKind::Installer, "prePack", nsis.pre_pack.as_ref()));
    }

    report
}

fn validate_commands(
    kind: StageKind,
    label: &str,
    commands: Option<&Vec<CommandSpec>>,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    let list = CommandList::from_config(label, commands);
    // Structural problems are reported regardless of which platform they target.
    let mut seen = Vec::new();
    for platform in Platform::ALL {
        for issue in list.issues(platform) {
            if seen.contains(&issue) {
                continue;
            }
            let message = match &issue {
                CommandIssue::Empty { index } => {
                    format!("{} '{}' command #{} is empty", kind.title(), label, index + 1)
                }
                CommandIssue::MalformedTemplate { index, reason } => format!(
                    "{} '{}' command #{} is malformed: {}",
                    kind.title(),
                    label,
                    index + 1,
                    reason
                ),
            };
            report.errors.push(message);
            seen.push(issue);
        }
    }
    report
}

fn validate_restriction(
    kind: StageKind,
    restriction: Option<&PlatformSet>,
    platform: Platform,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    if let Some(set) = restriction
        && !set.contains(platform)
    {
        report.warnings.push(format!(
            "{} is restricted to {} and will be skipped on {}",
            kind.title(),
            set,
            platform
        ));
    }
    report
}

fn validate_packaging(
    kind: StageKind,
    restriction: Option<&PlatformSet>,
    platform: Platform,
) -> ValidationReport {
    match kind.native_platform() {
        Some(native) if native != platform => ValidationReport {
            errors: Vec::new(),
            warnings: vec![format!(
                "{} packages can only be built on {}; the stage is omitted on {}",
                kind.title(),
                native,
                platform
            )],
        },
        _ => validate_restriction(kind, restriction, platform),
    }
}
