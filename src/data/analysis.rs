//! Peak intensities and pairwise intensity ratios.
//!
//! For every file of a [`CombinedDataset`] and every target wavenumber of a
//! [`PeakSet`], the analyzer takes the maximum corrected intensity inside a
//! symmetric tolerance window, then divides those maxima pairwise.

use std::collections::BTreeMap;
use std::fmt;

use log::info;
use serde::{Deserialize, Serialize};

use super::model::{CombinedDataset, CombinedSpectrum, MetadataValue, SAMPLE_DESCRIPTION};
use crate::error::{PipelineError, Result};

pub const DEFAULT_TOLERANCE: f64 = 2.0;

// ---------------------------------------------------------------------------
// PeakSet
// ---------------------------------------------------------------------------

/// Named, ordered list of target Raman shifts (cm⁻¹).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakSet {
    pub name: String,
    pub peaks: Vec<f64>,
}

impl PeakSet {
    /// Build a peak set. Peaks must be finite, distinct, and there must be
    /// at least one.
    pub fn new(name: impl Into<String>, peaks: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if peaks.is_empty() {
            return Err(PipelineError::Configuration(format!(
                "peak set '{name}' has no peaks"
            )));
        }
        if let Some(p) = peaks.iter().find(|p| !p.is_finite()) {
            return Err(PipelineError::Configuration(format!(
                "peak set '{name}' contains non-finite value {p}"
            )));
        }
        for (i, a) in peaks.iter().enumerate() {
            if peaks[..i].contains(a) {
                return Err(PipelineError::Configuration(format!(
                    "peak set '{name}' lists {a} twice"
                )));
            }
        }
        Ok(Self { name, peaks })
    }

    /// Parse a list such as `"1231, 1327 1342;1358"`. Any entry that is not
    /// a number fails the whole set.
    pub fn parse(name: impl Into<String>, list: &str) -> Result<Self> {
        let name = name.into();
        let peaks = list
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<f64>().map_err(|_| {
                    PipelineError::Configuration(format!(
                        "peak set '{name}': '{tok}' is not a wavenumber"
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Self::new(name, peaks)
    }

    /// The peak sets shipped with the tool, one per excitation wavelength.
    pub fn builtin() -> Vec<PeakSet> {
        vec![
            PeakSet {
                name: "532 nm".to_string(),
                peaks: vec![1231.0, 1327.0, 1342.0, 1358.0, 1450.0],
            },
            PeakSet {
                name: "785 nm".to_string(),
                peaks: vec![412.0, 444.0, 471.0, 547.0, 1561.0],
            },
        ]
    }

    pub fn builtin_named(name: &str) -> Option<PeakSet> {
        Self::builtin().into_iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

impl fmt::Display for PeakSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peaks: Vec<String> = self.peaks.iter().map(|p| p.to_string()).collect();
        write!(f, "{} ({})", self.name, peaks.join(","))
    }
}

/// Column label of a peak intensity, e.g. `I_1231`.
pub fn intensity_label(peak: f64) -> String {
    format!("I_{peak}")
}

/// Column label of a ratio, e.g. `ratio_I_1231_I_1327`.
pub fn ratio_label(numerator: f64, denominator: f64) -> String {
    format!("ratio_I_{numerator}_I_{denominator}")
}

// ---------------------------------------------------------------------------
// Result tables
// ---------------------------------------------------------------------------

/// Peak intensities of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityRow {
    pub file: String,
    pub spectrum_name: String,
    /// One entry per peak of the set, `None` when the window holds no sample.
    pub intensities: Vec<Option<f64>>,
    /// The file's metadata row.
    pub attributes: BTreeMap<String, MetadataValue>,
}

/// File × peak intensity table.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityTable {
    pub peaks: Vec<f64>,
    pub rows: Vec<IntensityRow>,
    pub attribute_columns: Vec<String>,
}

impl IntensityTable {
    /// Intensity of `peak` for `file`.
    pub fn get(&self, file: &str, peak: f64) -> Option<f64> {
        let col = self.peaks.iter().position(|&p| p == peak)?;
        self.rows
            .iter()
            .find(|r| r.file == file)
            .and_then(|r| r.intensities[col])
    }
}

/// One file × peak pair ratio.
#[derive(Debug, Clone, PartialEq)]
pub struct RatioRow {
    pub file: String,
    pub spectrum_name: String,
    pub numerator: f64,
    pub denominator: f64,
    pub value: f64,
    /// `Sample description` and the molar quantity, when known.
    pub attributes: BTreeMap<String, MetadataValue>,
}

impl RatioRow {
    pub fn label(&self) -> String {
        ratio_label(self.numerator, self.denominator)
    }
}

/// Long-format ratio table.
#[derive(Debug, Clone, PartialEq)]
pub struct RatioTable {
    pub rows: Vec<RatioRow>,
    pub attribute_columns: Vec<String>,
}

/// Output of [`analyze`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub peak_set: PeakSet,
    pub tolerance: f64,
    pub intensities: IntensityTable,
    pub ratios: RatioTable,
    /// Column holding the titrant quantity used as the x axis of ratio plots.
    pub quantity_column: Option<String>,
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Options of [`analyze`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    pub tolerance: f64,
    /// Molar-quantity column to carry into the ratio table. `None` picks the
    /// first column named like `n(...) (mol)`.
    pub quantity_column: Option<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            quantity_column: None,
        }
    }
}

/// Compute peak intensities and ratios for every file of the dataset.
pub fn analyze(
    dataset: &CombinedDataset,
    peak_set: &PeakSet,
    options: &AnalysisOptions,
) -> Result<AnalysisResult> {
    let tolerance = options.tolerance;
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(PipelineError::Configuration(format!(
            "tolerance must be a non-negative number, got {tolerance}"
        )));
    }
    let peak_set = PeakSet::new(peak_set.name.clone(), peak_set.peaks.clone())?;

    let quantity_column = options
        .quantity_column
        .clone()
        .filter(|c| dataset.has_column(c))
        .or_else(|| detect_quantity_column(&dataset.metadata_columns));
    let ratio_attribute_columns: Vec<String> = [Some(SAMPLE_DESCRIPTION.to_string()), quantity_column.clone()]
        .into_iter()
        .flatten()
        .filter(|c| dataset.has_column(c))
        .collect();

    // Group by file name; BTreeMap gives the files in sorted order.
    let mut groups: BTreeMap<&str, Vec<&CombinedSpectrum>> = BTreeMap::new();
    for sp in &dataset.spectra {
        groups.entry(sp.spectrum.file()).or_default().push(sp);
    }

    let mut intensity_rows = Vec::with_capacity(groups.len());
    let mut ratio_rows = Vec::new();

    for (file, group) in groups {
        let first = group[0];
        let intensities: Vec<Option<f64>> = peak_set
            .peaks
            .iter()
            .map(|&peak| window_max(&group, peak, tolerance))
            .collect();

        let ratio_attributes: BTreeMap<String, MetadataValue> = ratio_attribute_columns
            .iter()
            .map(|c| (c.clone(), first.attribute(c).clone()))
            .collect();

        for i in 0..peak_set.peaks.len() {
            for j in (i + 1)..peak_set.peaks.len() {
                if let Some(value) = ratio(intensities[i], intensities[j]) {
                    ratio_rows.push(RatioRow {
                        file: file.to_string(),
                        spectrum_name: first.spectrum.spectrum_name().to_string(),
                        numerator: peak_set.peaks[i],
                        denominator: peak_set.peaks[j],
                        value,
                        attributes: ratio_attributes.clone(),
                    });
                }
            }
        }

        intensity_rows.push(IntensityRow {
            file: file.to_string(),
            spectrum_name: first.spectrum.spectrum_name().to_string(),
            intensities,
            attributes: first.metadata.clone(),
        });
    }

    info!(
        "Analyzed {} file(s) with peak set {peak_set} at ±{tolerance} cm⁻¹: {} ratio(s)",
        intensity_rows.len(),
        ratio_rows.len()
    );

    Ok(AnalysisResult {
        intensities: IntensityTable {
            peaks: peak_set.peaks.clone(),
            rows: intensity_rows,
            attribute_columns: dataset.metadata_columns.clone(),
        },
        ratios: RatioTable {
            rows: ratio_rows,
            attribute_columns: ratio_attribute_columns,
        },
        peak_set,
        tolerance,
        quantity_column,
    })
}

/// Maximum corrected intensity with `peak - tol <= shift <= peak + tol`.
fn window_max(group: &[&CombinedSpectrum], peak: f64, tolerance: f64) -> Option<f64> {
    let (lo, hi) = (peak - tolerance, peak + tolerance);
    group
        .iter()
        .flat_map(|sp| {
            sp.spectrum
                .raw
                .raman_shift
                .iter()
                .zip(&sp.spectrum.corrected)
        })
        .filter(|&(&x, &y)| x >= lo && x <= hi && y.is_finite())
        .map(|(_, &y)| y)
        .reduce(f64::max)
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, denominator?);
    if d == 0.0 {
        return None;
    }
    Some(n / d).filter(|v| v.is_finite())
}

/// First column named like `n(EGTA) (mol)`.
pub fn detect_quantity_column(columns: &[String]) -> Option<String> {
    columns
        .iter()
        .find(|c| c.starts_with("n(") && c.ends_with("(mol)"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{CorrectedSpectrum, RawSpectrum};

    fn combined(file: &str, points: &[(f64, f64)], meta: &[(&str, MetadataValue)]) -> CombinedSpectrum {
        let (x, y): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
        CombinedSpectrum {
            spectrum: CorrectedSpectrum {
                raw: RawSpectrum {
                    file: file.to_string(),
                    spectrum_name: file.trim_end_matches(".txt").to_string(),
                    raman_shift: x,
                    intensity: y.clone(),
                },
                baseline: vec![0.0; y.len()],
                corrected: y,
            },
            metadata: meta.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    fn three_peaks() -> PeakSet {
        PeakSet::new("t", vec![100.0, 200.0, 300.0]).unwrap()
    }

    #[test]
    fn test_window_maximum_is_exact() {
        let ds = CombinedDataset {
            spectra: vec![combined(
                "a.txt",
                &[(97.0, 50.0), (98.5, 10.0), (99.5, 42.25), (101.9, 3.0), (102.1, 99.0)],
                &[],
            )],
            metadata_columns: vec![],
        };
        let res = analyze(&ds, &three_peaks(), &AnalysisOptions::default()).unwrap();
        assert_eq!(res.intensities.get("a.txt", 100.0), Some(42.25));
        assert_eq!(res.intensities.get("a.txt", 200.0), None);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let ds = CombinedDataset {
            spectra: vec![combined("a.txt", &[(98.0, 1.0), (102.0, 2.0)], &[])],
            metadata_columns: vec![],
        };
        let res = analyze(&ds, &three_peaks(), &AnalysisOptions::default()).unwrap();
        assert_eq!(res.intensities.get("a.txt", 100.0), Some(2.0));
    }

    #[test]
    fn test_ratio_rows_are_pairs_minus_missing() {
        let ds = CombinedDataset {
            spectra: vec![
                combined("a.txt", &[(100.0, 4.0), (200.0, 2.0), (300.0, 1.0)], &[]),
                // 300 missing → only one pair survives
                combined("b.txt", &[(100.0, 4.0), (200.0, 2.0)], &[]),
                // I_200 = 0 → 100/200 is undefined
                combined("c.txt", &[(100.0, 4.0), (200.0, 0.0), (300.0, 1.0)], &[]),
            ],
            metadata_columns: vec![],
        };
        let res = analyze(&ds, &three_peaks(), &AnalysisOptions::default()).unwrap();
        let count = |f: &str| res.ratios.rows.iter().filter(|r| r.file == f).count();
        assert_eq!(count("a.txt"), 3);
        assert_eq!(count("b.txt"), 1);
        assert_eq!(count("c.txt"), 2);

        let a: Vec<(String, f64)> = res
            .ratios
            .rows
            .iter()
            .filter(|r| r.file == "a.txt")
            .map(|r| (r.label(), r.value))
            .collect();
        assert_eq!(
            a,
            vec![
                ("ratio_I_100_I_200".to_string(), 2.0),
                ("ratio_I_100_I_300".to_string(), 4.0),
                ("ratio_I_200_I_300".to_string(), 2.0),
            ]
        );
    }

    #[test]
    fn test_attributes_follow_the_file() {
        let meta = [
            (SAMPLE_DESCRIPTION, MetadataValue::String("Ca 1 mM".into())),
            ("n(EGTA) (mol)", MetadataValue::Float(2e-6)),
            ("Operator", MetadataValue::String("J".into())),
        ];
        let mut ds = CombinedDataset {
            spectra: vec![combined("a.txt", &[(100.0, 4.0), (200.0, 2.0)], &meta)],
            metadata_columns: vec![
                SAMPLE_DESCRIPTION.to_string(),
                "n(EGTA) (mol)".to_string(),
                "Operator".to_string(),
            ],
        };
        let res = analyze(&ds, &three_peaks(), &AnalysisOptions::default()).unwrap();
        assert_eq!(res.quantity_column.as_deref(), Some("n(EGTA) (mol)"));
        assert_eq!(
            res.ratios.attribute_columns,
            vec![SAMPLE_DESCRIPTION.to_string(), "n(EGTA) (mol)".to_string()]
        );
        assert_eq!(res.ratios.rows[0].attributes["n(EGTA) (mol)"], MetadataValue::Float(2e-6));
        assert_eq!(res.intensities.rows[0].attributes.len(), 3);

        // Without metadata the join leaves nothing behind, and is not an error.
        ds.metadata_columns.clear();
        ds.spectra[0].metadata.clear();
        let res = analyze(&ds, &three_peaks(), &AnalysisOptions::default()).unwrap();
        assert!(res.ratios.attribute_columns.is_empty());
        assert!(res.ratios.rows[0].attributes.is_empty());
    }

    #[test]
    fn test_groups_sorted_by_file() {
        let ds = CombinedDataset {
            spectra: vec![
                combined("b.txt", &[(100.0, 1.0)], &[]),
                combined("a.txt", &[(100.0, 1.0)], &[]),
            ],
            metadata_columns: vec![],
        };
        let res = analyze(&ds, &three_peaks(), &AnalysisOptions::default()).unwrap();
        let files: Vec<&str> = res.intensities.rows.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(files, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_invalid_tolerance() {
        let ds = CombinedDataset::default();
        for tol in [-1.0, f64::NAN, f64::INFINITY] {
            let opts = AnalysisOptions {
                tolerance: tol,
                ..AnalysisOptions::default()
            };
            assert!(matches!(
                analyze(&ds, &three_peaks(), &opts),
                Err(PipelineError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_peak_set_parsing() {
        let set = PeakSet::parse("custom", "1231, 1327 1342;1358").unwrap();
        assert_eq!(set.peaks, vec![1231.0, 1327.0, 1342.0, 1358.0]);
        assert!(matches!(
            PeakSet::parse("bad", "1231, abc"),
            Err(PipelineError::Configuration(_))
        ));
        assert!(PeakSet::parse("empty", " , ").is_err());
        assert!(PeakSet::parse("dup", "1,1").is_err());
    }

    #[test]
    fn test_builtin_peak_sets() {
        let set = PeakSet::builtin_named("785 nm").unwrap();
        assert_eq!(set.peaks, vec![412.0, 444.0, 471.0, 547.0, 1561.0]);
        assert_eq!(PeakSet::builtin_named("532 nm").unwrap().len(), 5);
        assert!(PeakSet::builtin_named("633 nm").is_none());
        assert_eq!(intensity_label(1231.0), "I_1231");
        assert_eq!(ratio_label(1231.0, 1327.5), "ratio_I_1231_I_1327.5");
    }
}
