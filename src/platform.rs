use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;

/// Operating system family a package is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Macos,
    Linux,
    Windows,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Macos, Platform::Linux, Platform::Windows];

    /// Platform of the host running the tool. Fixed for the whole process.
    pub const fn current() -> Platform {
        if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Macos => "macos",
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One or more platforms, written in configuration either as a single name
/// (`platform: linux`) or a list (`platform: [linux, macos]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "PlatformSpec")]
pub struct PlatformSet(BTreeSet<Platform>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PlatformSpec {
    One(Platform),
    Many(Vec<Platform>),
}

impl From<PlatformSpec> for PlatformSet {
    fn from(spec: PlatformSpec) -> Self {
        match spec {
            PlatformSpec::One(platform) => PlatformSet::only(platform),
            PlatformSpec::Many(platforms) => PlatformSet(platforms.into_iter().collect()),
        }
    }
}

impl PlatformSet {
    pub fn only(platform: Platform) -> Self {
        PlatformSet(BTreeSet::from([platform]))
    }

    pub fn contains(&self, platform: Platform) -> bool {
        self.0.contains(&platform)
    }

    pub fn iter(&self) -> impl Iterator<Item = Platform> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Platform> for PlatformSet {
    fn from_iter<I: IntoIterator<Item = Platform>>(iter: I) -> Self {
        PlatformSet(iter.into_iter().collect())
    }
}

impl fmt::Display for PlatformSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(Platform::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

/// `None` means "every platform".
pub fn applies_to(restriction: Option<&PlatformSet>, platform: Platform) -> bool {
    restriction.is_none_or(|set| set.contains(platform))
}
