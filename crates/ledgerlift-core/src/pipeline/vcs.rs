// Recording each operation's changes in version control.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context};
use tracing::debug;

/// Stages a set of files and commits them under one message
pub trait ChangeRecorder {
    fn record(&mut self, message: &str, files: &[PathBuf]) -> anyhow::Result<()>;
}

/// Records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl ChangeRecorder for NoopRecorder {
    fn record(&mut self, _message: &str, _files: &[PathBuf]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Commits through the `git` executable in the project root
#[derive(Debug, Clone)]
pub struct GitRecorder {
    root: PathBuf,
}

impl GitRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn git(&self, args: &[&str], paths: &[&Path]) -> anyhow::Result<()> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .args(paths)
            .output()
            .context("failed to run git")?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl ChangeRecorder for GitRecorder {
    fn record(&mut self, message: &str, files: &[PathBuf]) -> anyhow::Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let paths: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        self.git(&["add", "--"], &paths)?;
        self.git(&["commit", "-m", message], &[])?;
        debug!(files = files.len(), "committed: {message}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_accepts_anything() {
        let mut recorder = NoopRecorder;
        assert!(recorder.record("Nothing", &[PathBuf::from("A.java")]).is_ok());
    }

    #[test]
    fn git_outside_a_repository_fails_without_panicking() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("A.java");
        std::fs::write(&file, "class A {}\n")?;
        let mut recorder = GitRecorder::new(dir.path());
        // either git is missing or the directory is not a repository
        assert!(recorder.record("Add A", &[file]).is_err());
        Ok(())
    }

    #[test]
    fn empty_file_set_is_not_committed() {
        let mut recorder = GitRecorder::new("/nonexistent");
        assert!(recorder.record("Nothing", &[]).is_ok());
    }
}
