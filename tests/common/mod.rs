#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use shipwright::config::Config;
use shipwright::platform::Platform;
use shipwright::process::{CommandOutput, CommandRunner, Invocation};

/// Records every invocation instead of starting processes.
///
/// `git clone` creates the checkout directory with a `package.json`, and the
/// packaging tools create the file they were asked to produce, so a whole run
/// can complete against a temporary directory.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    failures: Vec<(String, i32)>,
    unstartable: Vec<String>,
    missing_tools: BTreeSet<String>,
    manifest: Option<String>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            manifest: Some(r#"{"name":"demo","version":"1.2.3"}"#.to_string()),
            ..Self::default()
        }
    }

    /// Invocations whose command line contains `needle` exit with `code`.
    pub fn fail_on(mut self, needle: &str, code: i32) -> Self {
        self.failures.push((needle.to_string(), code));
        self
    }

    /// Invocations whose command line contains `needle` cannot be started.
    pub fn refuse_to_start(mut self, needle: &str) -> Self {
        self.unstartable.push(needle.to_string());
        self
    }

    pub fn without_tool(mut self, program: &str) -> Self {
        self.missing_tools.insert(program.to_string());
        self
    }

    pub fn with_manifest(mut self, manifest: &str) -> Self {
        self.manifest = Some(manifest.to_string());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    /// Command lines handed to the shell by command lists.
    pub fn shell_lines(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.program == "sh" || inv.program == "cmd")
            .filter_map(|inv| inv.args.last().cloned())
            .collect()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.command_lines().iter().any(|line| line.contains(needle))
    }

    fn produce_outputs(&self, invocation: &Invocation) -> io::Result<()> {
        let args = &invocation.args;
        match invocation.program.as_str() {
            "git" if args.first().map(String::as_str) == Some("clone") => {
                if let Some(target) = args.last() {
                    let checkout = invocation.cwd.join(target);
                    fs::create_dir_all(&checkout)?;
                    if let Some(manifest) = &self.manifest {
                        fs::write(checkout.join("package.json"), manifest)?;
                    }
                }
            }
            "zip" => touch(&invocation.cwd.join(&args[2]))?,
            "tar" => touch(&invocation.cwd.join(&args[3]))?,
            "dpkg-deb" | "hdiutil" => {
                if let Some(out) = args.last() {
                    touch(Path::new(out))?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn touch(path: &Path) -> io::Result<()> {
    fs::write(path, b"artifact")
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let line = invocation.command_line();

        if self.unstartable.iter().any(|needle| line.contains(needle)) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "program not found"));
        }
        if let Some((_, code)) = self.failures.iter().find(|(needle, _)| line.contains(needle)) {
            return Ok(CommandOutput {
                code: Some(*code),
                output: format!("{line}: simulated failure\n"),
            });
        }

        self.produce_outputs(invocation)?;
        let output = if line == "git --version" {
            "git version 2.43.0\n".to_string()
        } else {
            String::new()
        };
        Ok(CommandOutput {
            code: Some(0),
            output,
        })
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        if self.missing_tools.contains(program) {
            None
        } else {
            Some(PathBuf::from("/usr/bin").join(program))
        }
    }
}

/// Some platform other than the host.
pub fn foreign_platform() -> Platform {
    Platform::ALL
        .into_iter()
        .find(|platform| *platform != Platform::current())
        .unwrap()
}

/// Minimal git based configuration writing into `temp`.
pub fn git_config(temp: &Path, extra: &str) -> Config {
    let yaml = format!(
        r#"
prepare:
  tempDirectory: '{}'
fetch:
  gitUrl: "https://example.com/demo.git"
build: {{}}
prune:
  patterns: ["**/*.map"]
{extra}
"#,
        temp.join("ship-tmp").display()
    );
    Config::from_yaml(&yaml).unwrap()
}
