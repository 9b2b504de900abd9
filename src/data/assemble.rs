use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::baseline::{self, DEFAULT_POLY_ORDER};
use super::filter::{exclude_sample_description, BRB_SENTINEL};
use super::metadata::{load_metadata, MetadataSource};
use super::model::{
    CombinedDataset, CombinedSpectrum, CorrectedSpectrum, MetadataTable, MetadataValue,
    SAMPLE_DESCRIPTION,
};
use super::spectrum;
use crate::error::{PipelineError, Result};

/// Parameters of one assembly run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblyOptions {
    pub poly_order: usize,
    /// Drop spectra whose `Sample description` is `Cuvette BRB`.
    pub exclude_brb: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            poly_order: DEFAULT_POLY_ORDER,
            exclude_brb: true,
        }
    }
}

/// A spectrum file that could not be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// What happened during an assembly run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssemblySummary {
    /// Rows of the flat view (one per file × wavenumber sample).
    pub rows: usize,
    pub columns: usize,
    /// Spectra kept in the combined dataset.
    pub spectra: usize,
    pub skipped: Vec<SkippedFile>,
    /// Spectrum names that had no metadata row.
    pub unmatched: Vec<String>,
    /// Spectra removed by the exclusion filter.
    pub excluded: usize,
}

impl fmt::Display for AssemblySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows × {} columns from {} spectra",
            self.rows, self.columns, self.spectra
        )?;
        if !self.skipped.is_empty() {
            write!(f, ", {} file(s) skipped", self.skipped.len())?;
        }
        if !self.unmatched.is_empty() {
            write!(f, ", {} without metadata", self.unmatched.len())?;
        }
        if self.excluded > 0 {
            write!(f, ", {} excluded", self.excluded)?;
        }
        Ok(())
    }
}

/// Result of [`assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub dataset: CombinedDataset,
    pub summary: AssemblySummary,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Parse and baseline-correct every spectrum file, then left-join the result
/// with the metadata table on `Spectrum name`.
///
/// Files that fail to parse or correct are logged and listed in the summary;
/// the run only fails when none succeed or the metadata is unusable.
pub fn assemble(
    paths: &[PathBuf],
    metadata: &MetadataSource,
    options: &AssemblyOptions,
) -> Result<Assembly> {
    let table = load_metadata(metadata)?;
    assemble_with(paths, &table, options, |path, order| {
        let raw = spectrum::parse_file(path)?;
        baseline::correct(raw, order)
    })
}

/// Same as [`assemble`] with an already loaded table and a custom per-file
/// loader (the session plugs its spectrum cache in here).
pub fn assemble_with<F>(
    paths: &[PathBuf],
    table: &MetadataTable,
    options: &AssemblyOptions,
    mut load: F,
) -> Result<Assembly>
where
    F: FnMut(&Path, usize) -> Result<CorrectedSpectrum>,
{
    let mut summary = AssemblySummary::default();
    let mut corrected = Vec::with_capacity(paths.len());

    for path in paths {
        match load(path, options.poly_order) {
            Ok(sp) => corrected.push(sp),
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                summary.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if corrected.is_empty() {
        return Err(PipelineError::Assembly(format!(
            "none of the {} spectrum file(s) could be loaded",
            paths.len()
        )));
    }

    let mut dataset = left_join(corrected, table, &mut summary.unmatched);

    if options.exclude_brb {
        let before = dataset.len();
        dataset = exclude_sample_description(dataset, SAMPLE_DESCRIPTION, BRB_SENTINEL);
        summary.excluded = before - dataset.len();
    }

    summary.rows = dataset.row_count();
    summary.columns = dataset.column_count();
    summary.spectra = dataset.len();
    info!("Assembled {summary}");

    Ok(Assembly { dataset, summary })
}

/// Attach each spectrum's metadata row; spectra without a row get `Null`
/// for every column.
fn left_join(
    spectra: Vec<CorrectedSpectrum>,
    table: &MetadataTable,
    unmatched: &mut Vec<String>,
) -> CombinedDataset {
    let combined = spectra
        .into_iter()
        .map(|spectrum| {
            let metadata: BTreeMap<String, MetadataValue> = match table.get(spectrum.spectrum_name()) {
                Some(row) => table
                    .columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(MetadataValue::Null)))
                    .collect(),
                None => {
                    unmatched.push(spectrum.spectrum_name().to_string());
                    table
                        .columns
                        .iter()
                        .map(|c| (c.clone(), MetadataValue::Null))
                        .collect()
                }
            };
            CombinedSpectrum { spectrum, metadata }
        })
        .collect();

    if !unmatched.is_empty() {
        warn!("No metadata for {} spectra: {}", unmatched.len(), unmatched.join(", "));
    }

    CombinedDataset {
        spectra: combined,
        metadata_columns: table.columns.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::RawSpectrum;

    fn spectrum(name: &str) -> CorrectedSpectrum {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        CorrectedSpectrum {
            raw: RawSpectrum {
                file: format!("{name}.txt"),
                spectrum_name: name.to_string(),
                raman_shift: x.clone(),
                intensity: x.clone(),
            },
            baseline: vec![0.0; 10],
            corrected: x,
        }
    }

    fn table(rows: &[(&str, &str)]) -> MetadataTable {
        MetadataTable {
            columns: vec![SAMPLE_DESCRIPTION.to_string()],
            rows: rows
                .iter()
                .map(|(k, d)| {
                    let mut row = BTreeMap::new();
                    row.insert(
                        SAMPLE_DESCRIPTION.to_string(),
                        MetadataValue::String(d.to_string()),
                    );
                    (k.to_string(), row)
                })
                .collect(),
        }
    }

    fn by_name(path: &Path, _order: usize) -> Result<CorrectedSpectrum> {
        let name = path.file_stem().unwrap().to_string_lossy().into_owned();
        if name.starts_with("bad") {
            return Err(PipelineError::parse(format!("{name}.txt"), "broken"));
        }
        Ok(spectrum(&name))
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/data/{n}.txt"))).collect()
    }

    #[test]
    fn test_left_join_keeps_unmatched_spectra() {
        let t = table(&[("A", "sample a")]);
        let out = assemble_with(&paths(&["A", "B"]), &t, &AssemblyOptions::default(), by_name).unwrap();
        assert_eq!(out.dataset.len(), 2);
        assert_eq!(
            out.dataset.spectra[0].attribute(SAMPLE_DESCRIPTION),
            &MetadataValue::String("sample a".into())
        );
        assert!(out.dataset.spectra[1].attribute(SAMPLE_DESCRIPTION).is_null());
        assert_eq!(out.summary.unmatched, vec!["B".to_string()]);
        assert_eq!(out.summary.rows, 20);
        assert_eq!(out.summary.columns, 6);
    }

    #[test]
    fn test_failed_files_are_skipped() {
        let t = table(&[]);
        let out = assemble_with(&paths(&["A", "bad1"]), &t, &AssemblyOptions::default(), by_name).unwrap();
        assert_eq!(out.dataset.len(), 1);
        assert_eq!(out.summary.skipped.len(), 1);
        assert_eq!(out.summary.skipped[0].path, PathBuf::from("/data/bad1.txt"));
    }

    #[test]
    fn test_no_valid_spectra_is_assembly_error() {
        let t = table(&[]);
        let err = assemble_with(&paths(&["bad1", "bad2"]), &t, &AssemblyOptions::default(), by_name)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Assembly(_)));
    }

    #[test]
    fn test_brb_exclusion_toggle() {
        let t = table(&[("A", "Cuvette BRB"), ("B", "sample b")]);
        let out = assemble_with(&paths(&["A", "B"]), &t, &AssemblyOptions::default(), by_name).unwrap();
        assert_eq!(out.dataset.file_names(), vec!["B.txt".to_string()]);
        assert_eq!(out.summary.excluded, 1);

        let keep = AssemblyOptions {
            exclude_brb: false,
            ..AssemblyOptions::default()
        };
        let out = assemble_with(&paths(&["A", "B"]), &t, &keep, by_name).unwrap();
        assert_eq!(out.dataset.len(), 2);
        assert_eq!(out.summary.excluded, 0);
    }

    #[test]
    fn test_summary_display() {
        let summary = AssemblySummary {
            rows: 20,
            columns: 6,
            spectra: 2,
            excluded: 1,
            ..AssemblySummary::default()
        };
        assert_eq!(summary.to_string(), "20 rows × 6 columns from 2 spectra, 1 excluded");
    }
}
