//! Crash-safe JSON files for the checkpoint store.
//!
//! A checkpoint or manifest is first written to a hidden sibling whose name
//! is unique to the write, synced, then renamed over the target. A reader
//! sees either the previous file or the new one, never a partial write.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::TaskError;

/// Serialize `value` as pretty JSON and move it into place at `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), TaskError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let staging = staging_path(parent, path)?;
    let written = (|| -> Result<(), TaskError> {
        let mut out = BufWriter::new(File::create(&staging)?);
        serde_json::to_writer_pretty(&mut out, value)?;
        out.flush()?;
        out.get_ref().sync_all()?;
        Ok(())
    })();

    match written.and_then(|()| Ok(std::fs::rename(&staging, path)?)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&staging);
            Err(e)
        }
    }
}

/// Read and deserialize a JSON file; `Ok(None)` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, TaskError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&data)?))
}

/// `.<name>.<uuid>.partial` next to the target.
fn staging_path(parent: &Path, path: &Path) -> Result<PathBuf, TaskError> {
    let name = path
        .file_name()
        .ok_or_else(|| TaskError::failed(format!("{} has no file name", path.display())))?;
    Ok(parent.join(format!(
        ".{}.{}.partial",
        name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    )))
}
