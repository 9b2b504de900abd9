use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Extension of instrument spectrum exports.
pub const SPECTRUM_EXTENSION: &str = "txt";

/// `.txt` files directly inside `dir`, sorted by name.
pub fn spectrum_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
        if path.is_file() && is_spectrum_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Expand a mix of files and folders into a list of spectrum files. Folders
/// contribute their `.txt` files; explicit files are kept as given.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(spectrum_files_in(input)?);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

pub fn is_spectrum_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SPECTRUM_EXTENSION))
}
