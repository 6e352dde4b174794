use std::path::Path;

use crate::commands::CommandList;
use crate::config::PruneConfig;
use crate::error::{ShipError, ShipResult};
use crate::fsutil::{prune_empty_directories, remove_path};
use crate::pipeline::RunContext;
use crate::stages::{Stage, StageKind, path_variable};
use crate::variables::Variables;

/// Removes files the packaged application does not need.
#[derive(Debug)]
pub struct PruneStage {
    config: PruneConfig,
    post_prune: CommandList,
    removed: Option<usize>,
}

impl PruneStage {
    pub fn new(config: PruneConfig) -> Self {
        let post_prune = CommandList::from_config("postPrune", config.post_prune.as_ref());
        Self {
            config,
            post_prune,
            removed: None,
        }
    }

    fn remove_matches(&self, source: &Path) -> ShipResult<usize> {
        let mut removed = 0usize;
        for pattern in &self.config.patterns {
            let full = format!(
                "{}/{}",
                glob::Pattern::escape(&source.to_string_lossy()),
                pattern
            );
            let matches = glob::glob(&full).map_err(|err| {
                ShipError::Execution(format!("Invalid prune pattern '{pattern}': {err}"))
            })?;
            for entry in matches {
                let path = entry.map_err(|err| {
                    ShipError::Execution(format!("Unable to read prune match: {err}"))
                })?;
                // An earlier match may already have removed a parent directory.
                if path.symlink_metadata().is_err() || !path.starts_with(source) {
                    continue;
                }
                remove_path(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl Stage for PruneStage {
    fn kind(&self) -> StageKind {
        StageKind::Prune
    }

    fn configured_skip(&self) -> bool {
        self.config.skip
    }

    fn preflight_check(&self, ctx: &RunContext<'_>) -> ShipResult<()> {
        for pattern in &self.config.patterns {
            glob::Pattern::new(pattern).map_err(|err| {
                ShipError::Precondition(format!("Prune pattern '{pattern}' is not a valid glob: {err}"))
            })?;
        }
        if !self.config.patterns.is_empty() {
            ctx.logger.check_ok(&format!(
                "{} prune pattern(s) are valid",
                self.config.patterns.len()
            ));
        }
        self.post_prune.preflight_check(ctx)
    }

    fn execute(&mut self, ctx: &RunContext<'_>, vars: &Variables) -> ShipResult<()> {
        let source = path_variable(vars, "fetchStep.sourceDirectory")?;

        let mut removed = self.remove_matches(&source)?;
        if self.config.prune_empty_directories {
            removed += prune_empty_directories(&source)?;
        }
        ctx.logger
            .info(&format!("Pruned {removed} entries from '{}'", source.display()));
        self.removed = Some(removed);

        let scoped = self.scoped_variables(vars);
        self.post_prune.execute(ctx, &scoped, &source)
    }

    fn add_variables(&self, vars: &mut Variables) {
        if let Some(removed) = self.removed {
            vars.set(self.kind().key("removedCount"), removed.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn removes_matching_entries_inside_source() {
        let temp = tempdir().unwrap();
        let source = temp.path();
        fs::create_dir_all(source.join("dist")).unwrap();
        fs::create_dir_all(source.join("docs/api")).unwrap();
        fs::write(source.join("dist/app.js"), "x").unwrap();
        fs::write(source.join("dist/app.js.map"), "x").unwrap();
        fs::write(source.join("docs/api/index.md"), "x").unwrap();

        let stage = PruneStage::new(PruneConfig {
            patterns: vec!["**/*.map".into(), "docs".into()],
            ..PruneConfig::default()
        });
        let removed = stage.remove_matches(source).unwrap();

        assert_eq!(removed, 2);
        assert!(source.join("dist/app.js").exists());
        assert!(!source.join("dist/app.js.map").exists());
        assert!(!source.join("docs").exists());
    }
}
