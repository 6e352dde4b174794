use std::fs;

use shipwright::config::Config;
use shipwright::platform::Platform;
use shipwright::validation::validate_config;
use tempfile::tempdir;

#[test]
fn loads_yaml_configuration_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("shipwright.yaml");
    fs::write(
        &path,
        r#"
prepare:
  tempDirectory: build-tmp
fetch:
  gitUrl: https://github.com/example/demo.git
  gitBranch: release
build:
  packageManager: yarn
  postBuild:
    - "node scripts/licenses.js"
    - platform: [linux, macos]
      command: "chmod +x ${fetchStep.sourceDirectory}/bin/demo"
prune:
  patterns: ["**/*.ts", "docs"]
  pruneEmptyDirectories: false
zip:
  platform: linux
debian:
  maintainer: "Demo Team <team@example.com>"
  depends: [libc6]
dmg:
  cfBundleIdentifier: com.example.demo
nsis:
  publisher: Example
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();

    assert_eq!(
        config.prepare.as_ref().unwrap().temp_directory.as_deref(),
        Some("build-tmp")
    );
    let fetch = config.fetch.as_ref().unwrap();
    assert_eq!(fetch.git_branch.as_deref(), Some("release"));
    let build = config.build.as_ref().unwrap();
    assert_eq!(build.package_manager.as_deref(), Some("yarn"));
    assert_eq!(build.post_build.as_ref().unwrap().len(), 2);
    let prune = config.prune.as_ref().unwrap();
    assert!(!prune.prune_empty_directories);
    assert_eq!(prune.patterns.len(), 2);
    assert!(config.zip.as_ref().unwrap().platform.as_ref().unwrap().contains(Platform::Linux));
    assert_eq!(config.debian.as_ref().unwrap().depends, vec!["libc6".to_string()]);
    assert_eq!(
        config.dmg.as_ref().unwrap().cf_bundle_identifier.as_deref(),
        Some("com.example.demo")
    );
    assert_eq!(config.nsis.as_ref().unwrap().publisher.as_deref(), Some("Example"));

    let report = validate_config(&config, Platform::Linux);
    assert!(report.is_ok(), "{:?}", report.errors);
}

#[test]
fn json_configuration_is_accepted() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("package.json");
    fs::write(
        &path,
        r#"{
  "fetch": { "commands": ["cp -r ../app source"], "sourceDirectory": "source" },
  "build": { "commands": ["make"] },
  "prune": {}
}"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();

    assert!(config.prepare.is_none());
    assert!(config.prune.as_ref().unwrap().prune_empty_directories);
    assert!(validate_config(&config, Platform::current()).is_ok());
}

#[test]
fn missing_file_is_reported_with_its_path() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("absent.yaml");

    let err = Config::load(&path).unwrap_err();

    assert!(format!("{err:#}").contains("absent.yaml"));
}

#[test]
fn unparsable_file_is_an_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("broken.yaml");
    fs::write(&path, "fetch: [unterminated").unwrap();

    assert!(Config::load(&path).is_err());
}

#[test]
fn malformed_templates_fail_validation() {
    let config = Config::from_yaml(
        r#"
fetch:
  gitUrl: https://example.com/demo.git
build:
  postBuild: ["echo ${buildStep.applicationName"]
prune: {}
"#,
    )
    .unwrap();

    let report = validate_config(&config, Platform::Linux);

    assert_eq!(report.errors.len(), 1, "{:?}", report.errors);
    assert!(report.errors[0].contains("postBuild"));
}
