mod common;

use std::fs;
use std::sync::Arc;

use common::{ScriptedRunner, foreign_platform, git_config};
use shipwright::config::Config;
use shipwright::error::ShipError;
use shipwright::logger::{LogLevel, MemoryLogger};
use shipwright::pipeline::{Pipeline, StageStatus};
use shipwright::stages::StageKind;
use shipwright::stages::launcher::launcher_script;
use tempfile::tempdir;

fn pipeline(config: &Config, runner: &ScriptedRunner, logger: &MemoryLogger) -> Pipeline {
    Pipeline::new(config, Arc::new(runner.clone()), Arc::new(logger.clone())).unwrap()
}

fn status_of(pipeline: &Pipeline, kind: StageKind) -> Option<StageStatus> {
    pipeline
        .statuses()
        .into_iter()
        .find(|(stage, _)| *stage == kind)
        .map(|(_, status)| status)
}

#[test]
fn git_fetch_and_build_export_application_identity() {
    let temp = tempdir().unwrap();
    let config = git_config(temp.path(), "");
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    let vars = pipeline.variables();
    assert_eq!(vars.get("buildStep.applicationName").unwrap(), "demo");
    assert_eq!(vars.get("buildStep.applicationVersion").unwrap(), "1.2.3");
    let source = temp.path().join("ship-tmp").join("git_source");
    assert_eq!(
        vars.get("fetchStep.sourceDirectory").unwrap(),
        source.to_string_lossy()
    );
    assert_eq!(vars.get("pruneStep.removedCount").unwrap(), "0");

    let lines = runner.command_lines();
    assert!(lines.contains(&"git clone --depth 1 https://example.com/demo.git git_source".to_string()));
    assert!(lines.contains(&"npm install".to_string()));
    assert!(lines.contains(&"npm run build".to_string()));
    assert!(
        pipeline
            .statuses()
            .iter()
            .all(|(_, status)| *status == StageStatus::Executed)
    );

    let snapshot = pipeline.metrics().snapshot();
    assert!(snapshot.started_at.is_some());
    assert_eq!(snapshot.stages.len(), 4);
    assert_eq!(snapshot.commands_run, 3);
}

#[test]
fn failing_build_stops_the_run() {
    let temp = tempdir().unwrap();
    let config = git_config(
        temp.path(),
        "zip:\n  prePack: [\"echo packing\"]\n",
    );
    let runner = ScriptedRunner::new().fail_on("npm run build", 1);
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(!pipeline.execute());

    assert!(logger.contains(LogLevel::Error, "Build step failed"));
    assert!(logger.contains(LogLevel::Error, "exit status 1"));
    assert!(logger.contains(LogLevel::Error, "simulated failure"));
    assert!(!runner.ran("echo packing"));
    assert!(!runner.ran("zip "));

    assert_eq!(status_of(&pipeline, StageKind::Fetch), Some(StageStatus::Executed));
    assert_eq!(status_of(&pipeline, StageKind::Build), Some(StageStatus::Failed));
    assert_eq!(status_of(&pipeline, StageKind::Prune), Some(StageStatus::Preflighted));
    assert_eq!(status_of(&pipeline, StageKind::Zip), Some(StageStatus::Preflighted));
    assert!(pipeline.variables().get("buildStep.applicationName").is_err());
    // Earlier side effects stay in place.
    assert!(temp.path().join("ship-tmp/git_source/package.json").is_file());
}

#[test]
fn stage_restricted_to_another_platform_is_skipped() {
    let temp = tempdir().unwrap();
    let extra = format!(
        "zip:\n  platform: {}\n  prePack: [\"echo packing\"]\n",
        foreign_platform()
    );
    let config = git_config(temp.path(), &extra);
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.preflight_check());
    assert!(pipeline.execute());

    assert!(!runner.ran("echo packing"));
    assert_eq!(status_of(&pipeline, StageKind::Zip), Some(StageStatus::Skipped));
    assert!(logger.contains(LogLevel::Subsection, "Zip step (skipping, not applicable on"));
    assert!(pipeline.variables().get("zipStep.zipFile").is_err());
}

#[test]
fn preflight_has_no_side_effects() {
    let temp = tempdir().unwrap();
    let config = git_config(temp.path(), "zip: {}\n");
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.preflight_check());

    assert!(!temp.path().join("ship-tmp").exists());
    assert_eq!(runner.command_lines(), vec!["git --version".to_string()]);
    assert!(logger.contains(LogLevel::CheckOk, "Found 'git' command at"));
    assert!(logger.contains(LogLevel::CheckOk, "Found 'git' command version: git version 2.43.0"));
    assert!(logger.contains(LogLevel::CheckOk, "Found 'npm' command at"));
    assert!(
        pipeline
            .statuses()
            .iter()
            .all(|(_, status)| *status == StageStatus::Preflighted)
    );
}

#[test]
fn missing_tool_fails_preflight_before_execution() {
    let temp = tempdir().unwrap();
    let config = git_config(temp.path(), "");
    let runner = ScriptedRunner::new().without_tool("git");
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(!pipeline.execute());

    assert!(logger.contains(LogLevel::CheckError, "Unable to locate the 'git' command"));
    assert!(runner.invocations().is_empty());
    assert!(!temp.path().join("ship-tmp").exists());
    assert_eq!(status_of(&pipeline, StageKind::Fetch), Some(StageStatus::Failed));
    assert_eq!(status_of(&pipeline, StageKind::Build), Some(StageStatus::Pending));
}

#[test]
fn missing_mandatory_section_is_a_configuration_error() {
    let config = Config::from_yaml(
        r#"
fetch:
  gitUrl: "https://example.com/demo.git"
prune: {}
"#,
    )
    .unwrap();
    let err = Pipeline::new(
        &config,
        Arc::new(ScriptedRunner::new()),
        Arc::new(MemoryLogger::new()),
    )
    .unwrap_err();
    assert!(matches!(err, ShipError::Configuration(ref msg) if msg.contains("'build' section")));
}

#[test]
fn fetch_with_both_modes_is_rejected() {
    let config = Config::from_yaml(
        r#"
fetch:
  gitUrl: "https://example.com/demo.git"
  commands: ["cp -r ../app source"]
build: {}
prune: {}
"#,
    )
    .unwrap();
    let result = Pipeline::new(
        &config,
        Arc::new(ScriptedRunner::new()),
        Arc::new(MemoryLogger::new()),
    );
    assert!(matches!(result, Err(ShipError::Configuration(_))));
}

#[test]
fn later_commands_see_upstream_variables() {
    let temp = tempdir().unwrap();
    let mut config = git_config(temp.path(), "");
    config.prune.as_mut().unwrap().post_prune = Some(vec![
        "echo ${buildStep.applicationName}-${buildStep.applicationVersion} ${pruneStep.removedCount} $HOME ${HOME}"
            .into(),
    ]);
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    assert_eq!(
        runner.shell_lines(),
        vec!["echo demo-1.2.3 0 $HOME ${HOME}".to_string()]
    );
}

#[test]
fn unknown_variable_fails_the_stage() {
    let temp = tempdir().unwrap();
    let mut config = git_config(temp.path(), "");
    config.build.as_mut().unwrap().post_build = Some(vec!["echo ${zipStep.zipFile}".into()]);
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(!pipeline.execute());

    assert!(logger.contains(LogLevel::Error, "zipStep.zipFile"));
    assert!(runner.shell_lines().is_empty());
    assert_eq!(status_of(&pipeline, StageKind::Build), Some(StageStatus::Failed));
}

#[cfg(unix)]
#[test]
fn zip_stage_exports_archive_and_checksum() {
    let temp = tempdir().unwrap();
    let config = git_config(
        temp.path(),
        "zip:\n  prePack: [\"echo ${zipStep.zipSourceDirectory}\"]\n",
    );
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    let tmp = temp.path().join("ship-tmp");
    let staging = tmp.join("zip_source").join("demo-1.2.3");
    assert!(staging.join("package.json").is_file());
    assert_eq!(
        runner.shell_lines(),
        vec![format!("echo {}", staging.display())]
    );

    let vars = pipeline.variables();
    let zip_file = tmp.join(format!("demo-1.2.3-{}.zip", pipeline.platform()));
    assert_eq!(vars.get("zipStep.zipFile").unwrap(), zip_file.to_string_lossy());
    let digest = vars.get("zipStep.sha256").unwrap();
    assert_eq!(digest.len(), 64);
    let sidecar =
        fs::read_to_string(tmp.join(format!("demo-1.2.3-{}.zip.sha256", pipeline.platform())))
            .unwrap();
    assert!(sidecar.starts_with(digest));
}

#[test]
fn skipped_mandatory_stage_runs_nothing() {
    let temp = tempdir().unwrap();
    let mut config = git_config(temp.path(), "");
    config.build.as_mut().unwrap().skip = true;
    config.prune.as_mut().unwrap().skip = true;
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    assert!(!runner.ran("npm"));
    assert_eq!(status_of(&pipeline, StageKind::Build), Some(StageStatus::Skipped));
    assert!(logger.contains(LogLevel::Subsection, "Build step (skipping)"));
}

#[test]
fn skipped_build_still_exports_application_identity() {
    let temp = tempdir().unwrap();
    let mut config = git_config(temp.path(), "zip: {}\n");
    config.build.as_mut().unwrap().skip = true;
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    assert!(!runner.ran("npm"));
    let vars = pipeline.variables();
    assert_eq!(vars.get("buildStep.applicationName").unwrap(), "demo");
    assert_eq!(vars.get("buildStep.applicationVersion").unwrap(), "1.2.3");
    let zip_file = temp
        .path()
        .join("ship-tmp")
        .join(format!("demo-1.2.3-{}.zip", pipeline.platform()));
    assert!(zip_file.is_file());
    assert_eq!(status_of(&pipeline, StageKind::Build), Some(StageStatus::Skipped));
    assert_eq!(status_of(&pipeline, StageKind::Zip), Some(StageStatus::Executed));
}

#[test]
fn skipped_build_prefers_configured_identity() {
    let temp = tempdir().unwrap();
    let mut config = git_config(temp.path(), "");
    let build = config.build.as_mut().unwrap();
    build.skip = true;
    build.application_name = Some("tool".into());
    build.application_version = Some("0.9.0".into());
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    assert_eq!(pipeline.variables().get("buildStep.applicationName").unwrap(), "tool");
    assert_eq!(pipeline.variables().get("buildStep.applicationVersion").unwrap(), "0.9.0");
}

#[test]
fn skipped_prepare_reuses_existing_temp_directory() {
    let temp = tempdir().unwrap();
    let tmp = temp.path().join("ship-tmp");
    fs::create_dir_all(&tmp).unwrap();
    fs::write(tmp.join("keep.txt"), "from an earlier run").unwrap();
    let mut config = git_config(temp.path(), "");
    config.prepare.as_mut().unwrap().skip = true;
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    assert!(tmp.join("keep.txt").is_file());
    assert!(tmp.join("git_source/package.json").is_file());
    assert_eq!(
        pipeline.variables().get("prepareStep.tempDirectory").unwrap(),
        tmp.to_string_lossy()
    );
    assert_eq!(status_of(&pipeline, StageKind::Prepare), Some(StageStatus::Skipped));
}

#[test]
fn skipped_prepare_without_temp_directory_fails_before_fetching() {
    let temp = tempdir().unwrap();
    let mut config = git_config(temp.path(), "");
    config.prepare.as_mut().unwrap().skip = true;
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(!pipeline.execute());

    assert!(logger.contains(LogLevel::Error, "does not exist and the Prepare step is skipped"));
    assert!(!runner.ran("git clone"));
    assert!(!temp.path().join("ship-tmp").exists());
    assert_eq!(status_of(&pipeline, StageKind::Prepare), Some(StageStatus::Failed));
}

#[test]
fn skipped_fetch_reuses_existing_checkout() {
    let temp = tempdir().unwrap();
    let source = temp.path().join("ship-tmp").join("git_source");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("package.json"), r#"{"name":"cached","version":"3.0.0"}"#).unwrap();
    let mut config = git_config(temp.path(), "");
    config.prepare.as_mut().unwrap().skip = true;
    config.fetch.as_mut().unwrap().skip = true;
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    assert!(!runner.ran("git"));
    assert!(runner.ran("npm install"));
    let vars = pipeline.variables();
    assert_eq!(
        vars.get("fetchStep.sourceDirectory").unwrap(),
        source.to_string_lossy()
    );
    assert_eq!(vars.get("buildStep.applicationName").unwrap(), "cached");
}

#[test]
fn skipped_fetch_needs_skipped_prepare() {
    let temp = tempdir().unwrap();
    let mut config = git_config(temp.path(), "");
    config.fetch.as_mut().unwrap().skip = true;
    let runner = ScriptedRunner::new();
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(!pipeline.preflight_check());
    assert!(!pipeline.execute());

    assert!(logger.contains(LogLevel::CheckError, "skip the Prepare step as well"));
    assert!(runner.invocations().is_empty());
    assert!(!temp.path().join("ship-tmp").exists());
}

#[test]
fn scoped_package_name_is_packaged_under_its_plain_name() {
    let temp = tempdir().unwrap();
    let config = git_config(temp.path(), "addLauncher: {}\nzip: {}\n");
    let runner =
        ScriptedRunner::new().with_manifest(r#"{"name":"@acme/demo","version":"1.0.0"}"#);
    let logger = MemoryLogger::new();
    let mut pipeline = pipeline(&config, &runner, &logger);

    assert!(pipeline.execute());

    let tmp = temp.path().join("ship-tmp");
    let (launcher, _) = launcher_script(pipeline.platform(), "demo", "node .");
    assert!(tmp.join("git_source").join(&launcher).is_file());
    assert!(tmp.join("zip_source/demo-1.0.0/package.json").is_file());
    assert!(
        tmp.join(format!("demo-1.0.0-{}.zip", pipeline.platform()))
            .is_file()
    );
    assert_eq!(
        pipeline.variables().get("buildStep.applicationName").unwrap(),
        "@acme/demo"
    );
}
