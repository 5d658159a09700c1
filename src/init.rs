use crate::config::{Config, Workspace};
use crate::error::StageError;
use crate::ffmpeg::tool_available;
use crate::{logi, logok};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tokio::fs;

const REQUIRED_TOOLS: [&str; 2] = ["ffmpeg", "ffprobe"];

pub async fn ensure_directories(paths: &Workspace) -> Result<()> {
    for dir in paths.all_dirs() {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

/// Writes and removes a probe file in `dir`.
pub fn check_writable(dir: &Path) -> Result<()> {
    let mut probe = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("{} is not writable", dir.display()))?;
    probe
        .write_all(b"probe")
        .with_context(|| format!("write probe in {}", dir.display()))?;
    probe
        .close()
        .with_context(|| format!("remove probe in {}", dir.display()))
}

/// Everything a batch needs before touching the first script. Every problem
/// found is reported together.
pub async fn environment_check(cfg: &Config) -> Result<(), StageError> {
    ensure_directories(&cfg.paths)
        .await
        .map_err(|e| StageError::Config(format!("{e:#}")))?;

    let mut problems = Vec::new();
    for tool in REQUIRED_TOOLS {
        if !tool_available(tool).await {
            problems.push(format!("{tool} not found in PATH"));
        }
    }
    let missing = cfg.missing_credentials();
    if !missing.is_empty() {
        problems.push(format!("missing credentials: {}", missing.join(", ")));
    }
    if let Err(err) = check_writable(&cfg.paths.backup) {
        problems.push(format!("{err:#}"));
    }

    if problems.is_empty() {
        logok("Environment check passed");
        Ok(())
    } else {
        Err(StageError::Config(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_every_workspace_directory() {
        let root = tempfile::tempdir().unwrap();
        let paths = Workspace::rooted(root.path());
        ensure_directories(&paths).await.unwrap();
        for dir in paths.all_dirs() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
    }

    #[test]
    fn probe_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        check_writable(dir.path()).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(check_writable(&dir.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn missing_credentials_are_a_config_error() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.paths = Workspace::rooted(root.path());
        let err = environment_check(&cfg).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("pexels_api_key or pixabay_api_key"));
    }
}
