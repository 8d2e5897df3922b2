use crate::error::IndexError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonStyle {
    Compact,
    Pretty,
}

pub fn to_json_bytes<T: Serialize + ?Sized>(value: &T, style: JsonStyle) -> Result<Vec<u8>, IndexError> {
    let bytes = match style {
        JsonStyle::Compact => serde_json::to_vec(value)?,
        JsonStyle::Pretty => serde_json::to_vec_pretty(value)?,
    };
    Ok(bytes)
}

/// Writes `bytes` next to `path` first and renames over it, so readers never
/// observe a half-written file.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let staging = staging_path(path)?;
    {
        let mut writer = BufWriter::new(File::create(&staging)?);
        writer.write_all(bytes)?;
        writer.flush()?;
    }
    fs::rename(&staging, path)?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    style: JsonStyle,
) -> Result<(), IndexError> {
    let bytes = to_json_bytes(value, style)?;
    write_bytes_atomic(path, &bytes)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Hex SHA-256 of `bytes`.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn staging_path(path: &Path) -> Result<PathBuf, IndexError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IndexError::MissingFileName(path.display().to_string()))?;
    Ok(path.with_file_name(format!(".{name}.tmp")))
}
