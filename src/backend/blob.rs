//! Persisted blob format shared by every backend variant.
//!
//! The blob is a JSON object mapping each key to the base64 encoding of its
//! record bytes. Keys are written in sorted order so that two persists of the
//! same data produce identical files.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};

use super::BackendError;

/// Read a persisted blob. A missing file is an empty store.
pub fn read(path: &Path) -> Result<BTreeMap<String, Vec<u8>>, BackendError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => {
            return Err(BackendError::Initialization(format!(
                "{}: {}",
                path.display(),
                err
            )))
        }
    };

    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let encoded: BTreeMap<String, String> = serde_json::from_str(&text)
        .map_err(|e| BackendError::Initialization(format!("{}: {}", path.display(), e)))?;

    let mut records = BTreeMap::new();
    for (key, value) in encoded {
        let bytes = STANDARD.decode(value.as_bytes()).map_err(|e| {
            BackendError::Initialization(format!("{}: record {}: {}", path.display(), key, e))
        })?;
        records.insert(key, bytes);
    }
    Ok(records)
}

/// Write a blob, replacing any previous file at `path` atomically.
pub fn write<'a, I>(path: &Path, records: I) -> Result<(), BackendError>
where
    I: IntoIterator<Item = (&'a String, &'a Vec<u8>)>,
{
    let encoded: BTreeMap<&str, String> = records
        .into_iter()
        .map(|(key, bytes)| (key.as_str(), STANDARD.encode(bytes)))
        .collect();
    let text =
        serde_json::to_string(&encoded).map_err(|e| BackendError::Persist(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| BackendError::Persist(format!("{}: {}", parent.display(), e)))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, text)
        .map_err(|e| BackendError::Persist(format!("{}: {}", path.display(), e)))?;
    fs::rename(&tmp, path)
        .map_err(|e| BackendError::Persist(format!("{}: {}", path.display(), e)))?;
    Ok(())
}
