use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use super::ExploreError;

const BACKUP_PREFIX: &str = "bak_dse_";

/// Make `work_dir` ready for a run over the project in `src_dir`.
///
/// The two directories must not be nested in each other. A non-empty work
/// directory is moved into `bak_dse_{secs}` inside it, then every file in
/// `keep` that lived directly in the work directory (the config or the result
/// database, typically) is copied back. Returns the backup directory, if one
/// was made.
pub fn prepare_workspace(
    src_dir: &Path,
    work_dir: &Path,
    keep: &[&Path],
) -> Result<Option<PathBuf>, ExploreError> {
    let src = src_dir.canonicalize().map_err(|_| {
        ExploreError::Workspace(format!("project folder not found: {}", src_dir.display()))
    })?;
    fs::create_dir_all(work_dir).map_err(ExploreError::io(work_dir))?;
    let work = work_dir.canonicalize().map_err(ExploreError::io(work_dir))?;

    if src.starts_with(&work) || work.starts_with(&src) {
        return Err(ExploreError::Workspace(format!(
            "project {} and workspace {} cannot be nested",
            src.display(),
            work.display()
        )));
    }

    let entries: Vec<PathBuf> = fs::read_dir(&work)
        .map_err(ExploreError::io(&work))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(ExploreError::io(&work))?;
    if entries.is_empty() {
        return Ok(None);
    }

    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let backup = work.join(format!("{}{}", BACKUP_PREFIX, secs));
    warn!(workspace = %work.display(), backup = %backup.display(), "workspace is not empty, backing it up");
    fs::create_dir(&backup).map_err(ExploreError::io(&backup))?;

    for entry in &entries {
        let Some(name) = entry.file_name() else {
            continue;
        };
        let target = backup.join(name);
        fs::rename(entry, &target).map_err(ExploreError::io(entry))?;
    }

    for path in keep {
        let Ok(path) = absolute(path) else {
            continue;
        };
        if path.parent() != Some(work.as_path()) {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        let saved = backup.join(name);
        if saved.is_file() {
            fs::copy(&saved, &path).map_err(ExploreError::io(&path))?;
            info!(file = %path.display(), "restored from workspace backup");
        }
    }

    Ok(Some(backup))
}

/// Absolute form of `path` with a canonical parent, so it compares against the
/// canonical work directory even when the file itself no longer exists.
fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
        _ => std::env::current_dir()?,
    };
    Ok(parent.join(name))
}
