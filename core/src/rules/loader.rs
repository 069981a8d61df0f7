use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;

/// Rule files (`*.yaml` / `*.yml`) under `path`, in file-name order so that
/// bucket insertion order is stable across platforms.
pub fn rule_files<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() {
            let path = entry.path();
            if let Some(extension) = path.extension() {
                if extension == "yaml" || extension == "yml" {
                    files.push(path.to_path_buf());
                }
            }
        }
    }

    Ok(files)
}
