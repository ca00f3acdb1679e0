// File-system helpers for uploads and downloads.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::ApiError;

/// Used when the download response carries no filename.
pub const DEFAULT_PROGRAM_FILENAME: &str = "program.xlsx";

/// Ask the operator for a file to upload. An empty path means "cancelled".
#[cfg(feature = "dialog")]
pub fn select_file() -> anyhow::Result<PathBuf> {
    Ok(rfd::FileDialog::new()
        .add_filter("Excel", &["xlsx", "xls"])
        .pick_file()
        .unwrap_or_default())
}

/// Ask the operator for a file to upload. An empty path means "cancelled".
#[cfg(not(feature = "dialog"))]
pub fn select_file() -> anyhow::Result<PathBuf> {
    let path: String = dialoguer::Input::new()
        .with_prompt("Ratings file path (blank to cancel)")
        .allow_empty(true)
        .interact_text()?;
    Ok(PathBuf::from(path.trim()))
}

/// Where downloaded programs go: the OneDrive desktop, then the plain
/// desktop, then the current directory.
pub fn save_dir() -> PathBuf {
    let candidates = dirs::home_dir()
        .map(|home| vec![home.join("OneDrive").join("Desktop"), home.join("Desktop")])
        .unwrap_or_default();
    first_existing(candidates).unwrap_or_else(|| PathBuf::from("."))
}

fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|dir| dir.is_dir())
}

/// Extract `filename="..."` from a `Content-Disposition` header.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let re = Regex::new(r#"filename="(.*?)""#).expect("valid filename regex");
    re.captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| !name.is_empty())
        .and_then(|name| Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Write `bytes` to `dir/filename`.
///
/// # Errors
///
/// [`ApiError::FileSave`] when the file is locked or not writable,
/// [`ApiError::Io`] for anything else.
pub fn save_bytes(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf, ApiError> {
    let path = dir.join(filename);
    match std::fs::write(&path, bytes) {
        Ok(()) => Ok(path),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(ApiError::FileSave {
            filename: PathBuf::from(filename),
            source: e,
        }),
        Err(e) => Err(ApiError::Io(e)),
    }
}
