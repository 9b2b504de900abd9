use std::collections::BTreeMap;
use std::fmt;

/// Name of the wavenumber column in instrument files and exports.
pub const RAMAN_SHIFT: &str = "Raman Shift";
/// Name of the raw intensity column in instrument files and exports.
pub const DARK_SUBTRACTED: &str = "Dark Subtracted #1";
/// Name of the baseline-corrected intensity column in exports.
pub const INTENSITY_CORRECTED: &str = "Intensity_corrected";
pub const FILE: &str = "file";
/// Join key between spectra and the metadata table.
pub const SPECTRUM_NAME: &str = "Spectrum name";
pub const SAMPLE_DESCRIPTION: &str = "Sample description";

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a metadata column
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata cell as found in spreadsheets and CSV files.
/// Used as a key in `BTreeMap` / `BTreeSet` downstream so it must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// ISO-8601 date string kept as text.
    Date(String),
    Null,
}

// -- Manual Eq/Ord so we can put MetadataValue in BTreeSet --

impl Eq for MetadataValue {}

impl PartialOrd for MetadataValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MetadataValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use MetadataValue::*;
        fn discriminant(v: &MetadataValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
                Date(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) | (Date(a), Date(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for MetadataValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            MetadataValue::String(s) | MetadataValue::Date(s) => s.hash(state),
            MetadataValue::Integer(i) => i.hash(state),
            MetadataValue::Float(f) => f.to_bits().hash(state),
            MetadataValue::Bool(b) => b.hash(state),
            MetadataValue::Null => {}
        }
    }
}

/// Short form for labels and legends. Use [`MetadataValue::to_cell`] for exports.
impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v:.4}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Date(d) => write!(f, "{d}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    /// Guess the type of a text cell: empty → Null, then integer, finite
    /// float, boolean, and finally plain text.
    pub fn from_text(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return MetadataValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return MetadataValue::Integer(i);
        }
        if let Some(f) = s.parse::<f64>().ok().filter(|f| f.is_finite()) {
            return MetadataValue::Float(f);
        }
        match s {
            "true" | "True" | "TRUE" => MetadataValue::Bool(true),
            "false" | "False" | "FALSE" => MetadataValue::Bool(false),
            _ => MetadataValue::String(s.to_string()),
        }
    }

    /// Try to interpret the value as an `f64` (numeric axes, colour scales).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }

    /// Full-precision text for CSV cells. Null becomes an empty cell.
    pub fn to_cell(&self) -> String {
        match self {
            MetadataValue::String(s) | MetadataValue::Date(s) => s.clone(),
            MetadataValue::Integer(i) => i.to_string(),
            MetadataValue::Float(v) => v.to_string(),
            MetadataValue::Bool(b) => b.to_string(),
            MetadataValue::Null => String::new(),
        }
    }

    /// Normalised join key. Spreadsheets often store numeric spectrum names as
    /// floats, so `12.0` keys the same as `"12"`.
    pub fn as_key(&self) -> Option<String> {
        match self {
            MetadataValue::Null => None,
            MetadataValue::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
                Some(format!("{}", *v as i64))
            }
            other => {
                let key = other.to_cell();
                let key = key.trim();
                (!key.is_empty()).then(|| key.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Spectra
// ---------------------------------------------------------------------------

/// One parsed instrument file, sorted ascending by wavenumber.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpectrum {
    /// Base file name, e.g. `S01.txt`.
    pub file: String,
    /// File name without extension, the metadata join key.
    pub spectrum_name: String,
    /// Raman shift axis (cm⁻¹).
    pub raman_shift: Vec<f64>,
    /// `Dark Subtracted #1` intensities – same length as `raman_shift`.
    pub intensity: Vec<f64>,
}

impl RawSpectrum {
    pub fn len(&self) -> usize {
        self.raman_shift.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raman_shift.is_empty()
    }
}

/// A spectrum after baseline subtraction.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedSpectrum {
    pub raw: RawSpectrum,
    /// Fitted baseline, same length as the raw intensities.
    pub baseline: Vec<f64>,
    /// `raw.intensity - baseline`.
    pub corrected: Vec<f64>,
}

impl CorrectedSpectrum {
    pub fn file(&self) -> &str {
        &self.raw.file
    }

    pub fn spectrum_name(&self) -> &str {
        &self.raw.spectrum_name
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MetadataTable
// ---------------------------------------------------------------------------

/// Metadata rows keyed by `Spectrum name`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    /// Attribute columns in file order, excluding `Spectrum name`.
    pub columns: Vec<String>,
    /// Spectrum name → attribute values.
    pub rows: BTreeMap<String, BTreeMap<String, MetadataValue>>,
}

impl MetadataTable {
    pub fn get(&self, spectrum_name: &str) -> Option<&BTreeMap<String, MetadataValue>> {
        self.rows.get(spectrum_name)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// CombinedDataset – spectra joined with their metadata
// ---------------------------------------------------------------------------

/// One file's samples together with its metadata row.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSpectrum {
    pub spectrum: CorrectedSpectrum,
    /// Every metadata column of the dataset; unmatched spectra hold `Null`.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl CombinedSpectrum {
    pub fn attribute(&self, column: &str) -> &MetadataValue {
        self.metadata.get(column).unwrap_or(&MetadataValue::Null)
    }
}

/// Left join of the corrected spectra with the metadata table.
///
/// Stored per spectrum; the flat view has one row per (file, wavenumber).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedDataset {
    pub spectra: Vec<CombinedSpectrum>,
    /// Metadata column names in table order (excludes `Spectrum name`).
    pub metadata_columns: Vec<String>,
}

impl CombinedDataset {
    /// Column names of the flat view, in export order.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            RAMAN_SHIFT,
            DARK_SUBTRACTED,
            INTENSITY_CORRECTED,
            FILE,
            SPECTRUM_NAME,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        names.extend(self.metadata_columns.iter().cloned());
        names
    }

    pub fn row_count(&self) -> usize {
        self.spectra.iter().map(|sp| sp.spectrum.len()).sum()
    }

    pub fn column_count(&self) -> usize {
        5 + self.metadata_columns.len()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.metadata_columns.iter().any(|c| c == column)
    }

    /// Distinct file names in dataset order.
    pub fn file_names(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        self.spectra
            .iter()
            .filter(|sp| seen.insert(sp.spectrum.file()))
            .map(|sp| sp.spectrum.file().to_string())
            .collect()
    }

    /// Number of spectra.
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}
