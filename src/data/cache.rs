use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::debug;

use super::baseline;
use super::model::CorrectedSpectrum;
use super::spectrum;
use crate::error::{PipelineError, Result};

struct Entry {
    modified: SystemTime,
    poly_order: usize,
    spectrum: CorrectedSpectrum,
}

/// In-memory cache of corrected spectra keyed by path.
///
/// An entry is reused only while the file's modification time and the
/// requested polynomial order are unchanged.
#[derive(Default)]
pub struct SpectrumCache {
    entries: HashMap<PathBuf, Entry>,
    hits: usize,
    misses: usize,
}

impl SpectrumCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the corrected spectrum of `path`, parsing and correcting it
    /// when the cached copy is missing or stale.
    pub fn get_or_load(&mut self, path: &Path, poly_order: usize) -> Result<CorrectedSpectrum> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| PipelineError::io(path, e))?;

        if let Some(entry) = self.entries.get(path) {
            if entry.modified == modified && entry.poly_order == poly_order {
                self.hits += 1;
                return Ok(entry.spectrum.clone());
            }
        }

        self.misses += 1;
        debug!("Loading {} (order {poly_order})", path.display());
        let spectrum = baseline::correct(spectrum::parse_file(path)?, poly_order)?;
        self.entries.insert(
            path.to_path_buf(),
            Entry {
                modified,
                poly_order,
                spectrum: spectrum.clone(),
            },
        );
        Ok(spectrum)
    }

    /// Drop every entry whose path is not in `paths`. Returns how many went.
    pub fn retain_paths(&mut self, paths: &[PathBuf]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| paths.contains(path));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!("Pruned {pruned} cached spectra");
        }
        pruned
    }

    pub fn invalidate(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn spectrum_text(n: usize) -> String {
        let mut s = String::from("Pixel;Raman Shift;Dark Subtracted #1\n");
        for i in 0..n {
            s.push_str(&format!("{i};{},0;{},5\n", 100 + i, 10 + i));
        }
        s
    }

    #[test]
    fn test_fresh_entry_is_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.txt");
        std::fs::write(&path, spectrum_text(20)).unwrap();

        let mut cache = SpectrumCache::new();
        let a = cache.get_or_load(&path, 2).unwrap();
        let b = cache.get_or_load(&path, 2).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.stats(), (1, 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_order_change_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.txt");
        std::fs::write(&path, spectrum_text(20)).unwrap();

        let mut cache = SpectrumCache::new();
        cache.get_or_load(&path, 2).unwrap();
        cache.get_or_load(&path, 3).unwrap();
        assert_eq!(cache.stats(), (0, 2));

        cache.invalidate(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_retain_paths_prunes_absent_entries() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, spectrum_text(20)).unwrap();
        std::fs::write(&b, spectrum_text(20)).unwrap();

        let mut cache = SpectrumCache::new();
        cache.get_or_load(&a, 2).unwrap();
        cache.get_or_load(&b, 2).unwrap();

        assert_eq!(cache.retain_paths(&[b.clone()]), 1);
        assert_eq!(cache.len(), 1);
        cache.get_or_load(&b, 2).unwrap();
        assert_eq!(cache.stats(), (1, 2));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut cache = SpectrumCache::new();
        let err = cache.get_or_load(Path::new("/nonexistent/s.txt"), 2).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
