use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{
    CombinedDataset, CombinedSpectrum, CorrectedSpectrum, MetadataValue, RawSpectrum,
    DARK_SUBTRACTED, FILE, INTENSITY_CORRECTED, RAMAN_SHIFT, SPECTRUM_NAME,
};
use super::spectrum::spectrum_name_of;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Reload a combined dataset previously written by
/// [`export_combined`](super::export::export_combined). Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – flat rows, header as written by the CSV export
/// * `.parquet` – same columns, numeric metadata stored as Float64
pub fn load_file(path: &Path) -> Result<CombinedDataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "csv" => load_csv(path)?,
        other => {
            return Err(PipelineError::Configuration(format!(
                "cannot load a combined dataset from '.{other}' files"
            )))
        }
    };
    info!(
        "Loaded combined dataset: {} spectra, {} rows from {}",
        dataset.len(),
        dataset.row_count(),
        path.display()
    );
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Row grouping shared by both formats
// ---------------------------------------------------------------------------

/// Accumulates flat rows into per-file spectra, in order of first appearance.
struct GroupBuilder {
    metadata_columns: Vec<String>,
    order: Vec<String>,
    groups: BTreeMap<String, CombinedSpectrum>,
}

impl GroupBuilder {
    fn new(metadata_columns: Vec<String>) -> Self {
        Self {
            metadata_columns,
            order: Vec::new(),
            groups: BTreeMap::new(),
        }
    }

    fn push(
        &mut self,
        samples: [f64; 3],
        file: &str,
        spectrum_name: Option<&str>,
        metadata: impl FnOnce() -> BTreeMap<String, MetadataValue>,
    ) {
        let [shift, raw, corrected] = samples;
        if !self.groups.contains_key(file) {
            self.order.push(file.to_string());
            let spectrum = CorrectedSpectrum {
                raw: RawSpectrum {
                    file: file.to_string(),
                    spectrum_name: spectrum_name
                        .map(str::to_string)
                        .unwrap_or_else(|| spectrum_name_of(file)),
                    raman_shift: Vec::new(),
                    intensity: Vec::new(),
                },
                baseline: Vec::new(),
                corrected: Vec::new(),
            };
            self.groups.insert(
                file.to_string(),
                CombinedSpectrum {
                    spectrum,
                    metadata: metadata(),
                },
            );
        }
        let Some(group) = self.groups.get_mut(file) else {
            return;
        };
        let sp = &mut group.spectrum;
        sp.raw.raman_shift.push(shift);
        sp.raw.intensity.push(raw);
        sp.baseline.push(raw - corrected);
        sp.corrected.push(corrected);
    }

    fn finish(mut self) -> Result<CombinedDataset> {
        if self.order.is_empty() {
            return Err(PipelineError::Assembly("combined file holds no rows".into()));
        }
        let spectra = self
            .order
            .iter()
            .filter_map(|f| self.groups.remove(f))
            .collect();
        Ok(CombinedDataset {
            spectra,
            metadata_columns: self.metadata_columns,
        })
    }
}

/// Position of the required columns in a header.
struct Layout {
    shift: usize,
    raw: usize,
    corrected: usize,
    file: usize,
    spectrum_name: Option<usize>,
    /// (index, name) of every other column.
    metadata: Vec<(usize, String)>,
}

impl Layout {
    fn from_headers(headers: &[String], source: &Path) -> Result<Self> {
        let find = |name: &str| -> Result<usize> {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                PipelineError::parse(
                    source.display().to_string(),
                    format!("combined file is missing column '{name}'"),
                )
            })
        };
        let shift = find(RAMAN_SHIFT)?;
        let raw = find(DARK_SUBTRACTED)?;
        let corrected = find(INTENSITY_CORRECTED)?;
        let file = find(FILE)?;
        let spectrum_name = headers.iter().position(|h| h == SPECTRUM_NAME);
        let fixed = [Some(shift), Some(raw), Some(corrected), Some(file), spectrum_name];
        let metadata = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !fixed.contains(&Some(*i)))
            .map(|(i, h)| (i, h.clone()))
            .collect();
        Ok(Self {
            shift,
            raw,
            corrected,
            file,
            spectrum_name,
            metadata,
        })
    }

    fn metadata_columns(&self) -> Vec<String> {
        self.metadata.iter().map(|(_, name)| name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path) -> Result<CombinedDataset> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = csv::Reader::from_reader(file);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let layout = Layout::from_headers(&headers, path)?;
    let mut groups = GroupBuilder::new(layout.metadata_columns());

    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        let number = |idx: usize, col: &str| -> Result<f64> {
            let cell = record.get(idx).unwrap_or("");
            cell.trim().parse::<f64>().map_err(|_| {
                PipelineError::parse(
                    path.display().to_string(),
                    format!("row {row_no}, '{col}': '{cell}' is not a number"),
                )
            })
        };
        let samples = [
            number(layout.shift, RAMAN_SHIFT)?,
            number(layout.raw, DARK_SUBTRACTED)?,
            number(layout.corrected, INTENSITY_CORRECTED)?,
        ];
        let file = record.get(layout.file).unwrap_or("");
        let name = layout.spectrum_name.and_then(|i| record.get(i));
        groups.push(samples, file, name, || {
            layout
                .metadata
                .iter()
                .map(|(i, col)| {
                    (col.clone(), MetadataValue::from_text(record.get(*i).unwrap_or("")))
                })
                .collect()
        });
    }

    groups.finish()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

fn load_parquet(path: &Path) -> Result<CombinedDataset> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let layout = Layout::from_headers(&headers, path)?;
    let reader = builder.build()?;
    let mut groups = GroupBuilder::new(layout.metadata_columns());

    for batch_result in reader {
        let batch = batch_result?;
        let shift = f64_column(batch.column(layout.shift), RAMAN_SHIFT, path)?;
        let raw = f64_column(batch.column(layout.raw), DARK_SUBTRACTED, path)?;
        let corrected = f64_column(batch.column(layout.corrected), INTENSITY_CORRECTED, path)?;
        let files = batch.column(layout.file).as_string_opt::<i32>().ok_or_else(|| {
            PipelineError::parse(path.display().to_string(), "'file' is not a string column")
        })?;
        let names = layout
            .spectrum_name
            .and_then(|i| batch.column(i).as_string_opt::<i32>());

        for row in 0..batch.num_rows() {
            let name = names.filter(|n| !n.is_null(row)).map(|n| n.value(row));
            groups.push(
                [shift[row], raw[row], corrected[row]],
                files.value(row),
                name,
                || {
                    layout
                        .metadata
                        .iter()
                        .map(|(i, col)| (col.clone(), extract_metadata_value(batch.column(*i), row)))
                        .collect()
                },
            );
        }
    }

    groups.finish()
}

// -- Parquet / Arrow helpers --

/// Read a numeric column as `f64`, nulls becoming NaN.
fn f64_column(col: &Arc<dyn Array>, name: &str, path: &Path) -> Result<Vec<f64>> {
    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        Ok(arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        Ok(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)).collect())
    } else {
        Err(PipelineError::parse(
            path.display().to_string(),
            format!("column '{name}' is {:?}, expected Float64", col.data_type()),
        ))
    }
}

/// Extract a single metadata value from an Arrow column at a given row.
fn extract_metadata_value(col: &Arc<dyn Array>, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => any
            .downcast_ref::<StringArray>()
            .map(|s| MetadataValue::String(s.value(row).to_string()))
            .unwrap_or(MetadataValue::Null),
        DataType::LargeUtf8 => MetadataValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map(|a| MetadataValue::Integer(a.value(row) as i64))
            .unwrap_or(MetadataValue::Null),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map(|a| MetadataValue::Integer(a.value(row)))
            .unwrap_or(MetadataValue::Null),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map(|a| MetadataValue::Float(a.value(row) as f64))
            .unwrap_or(MetadataValue::Null),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map(|a| MetadataValue::Float(a.value(row)))
            .unwrap_or(MetadataValue::Null),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map(|a| MetadataValue::Bool(a.value(row)))
            .unwrap_or(MetadataValue::Null),
        other => MetadataValue::String(format!("{other:?}")),
    }
}
