use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tempfile::NamedTempFile;

use super::analysis::{intensity_label, AnalysisResult};
use super::model::{CombinedDataset, MetadataValue};
use crate::error::{PipelineError, Result};

/// Rows per worksheet, header included.
pub const XLSX_MAX_ROWS: usize = 1_048_576;
/// Sheet names of the analysis workbook.
pub const INTENSITY_SHEET: &str = "intensites";
pub const RATIO_SHEET: &str = "ratios";

/// File format of a combined-dataset export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinedFormat {
    Csv,
    Xlsx,
    Parquet,
}

impl CombinedFormat {
    /// Choose the format from the file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Ok(CombinedFormat::Csv),
            "xlsx" => Ok(CombinedFormat::Xlsx),
            "parquet" | "pq" => Ok(CombinedFormat::Parquet),
            other => Err(PipelineError::Export(format!(
                "unsupported export extension '.{other}' (use .csv, .xlsx or .parquet)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Combined dataset
// ---------------------------------------------------------------------------

/// Write the flat view of the combined dataset, one row per
/// (file, wavenumber) sample.
pub fn export_combined(dataset: &CombinedDataset, path: &Path, format: CombinedFormat) -> Result<()> {
    check_unique_columns(&dataset.column_names())?;
    match format {
        CombinedFormat::Csv => write_atomically(path, |file| write_combined_csv(dataset, file))?,
        CombinedFormat::Xlsx => {
            let bytes = combined_workbook(dataset)?;
            write_atomically(path, |file| file.write_all(&bytes).map_err(|e| PipelineError::io(path, e)))?
        }
        CombinedFormat::Parquet => write_atomically(path, |file| write_combined_parquet(dataset, file))?,
    }
    info!(
        "Exported {} rows × {} columns to {}",
        dataset.row_count(),
        dataset.column_count(),
        path.display()
    );
    Ok(())
}

/// One flat row as (numeric samples, file, spectrum name, metadata) cells.
fn for_each_row<F>(dataset: &CombinedDataset, mut f: F) -> Result<()>
where
    F: FnMut([f64; 3], &str, &str, Vec<&MetadataValue>) -> Result<()>,
{
    for sp in &dataset.spectra {
        let s = &sp.spectrum;
        let meta: Vec<&MetadataValue> = dataset
            .metadata_columns
            .iter()
            .map(|c| sp.attribute(c))
            .collect();
        for i in 0..s.len() {
            f(
                [s.raw.raman_shift[i], s.raw.intensity[i], s.corrected[i]],
                s.file(),
                s.spectrum_name(),
                meta.clone(),
            )?;
        }
    }
    Ok(())
}

fn write_combined_csv(dataset: &CombinedDataset, file: &mut File) -> Result<()> {
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    writer.write_record(dataset.column_names())?;
    for_each_row(dataset, |nums, file, name, meta| {
        let mut record: Vec<String> = nums.iter().map(|v| v.to_string()).collect();
        record.push(file.to_string());
        record.push(name.to_string());
        record.extend(meta.iter().map(|m| m.to_cell()));
        writer.write_record(&record)?;
        Ok(())
    })?;
    writer.flush().map_err(|e| PipelineError::Export(e.to_string()))?;
    Ok(())
}

fn combined_workbook(dataset: &CombinedDataset) -> Result<Vec<u8>> {
    check_sheet_rows(dataset.row_count(), "combined dataset")?;
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("combined")?;
    write_header(sheet, &dataset.column_names(), &bold)?;

    let mut row: u32 = 1;
    for_each_row(dataset, |nums, file, name, meta| {
        for (col, v) in nums.iter().enumerate() {
            sheet.write_number(row, col as u16, *v)?;
        }
        sheet.write_string(row, 3, file)?;
        sheet.write_string(row, 4, name)?;
        for (i, m) in meta.iter().enumerate() {
            write_cell(sheet, row, (5 + i) as u16, m)?;
        }
        row += 1;
        Ok(())
    })?;
    Ok(workbook.save_to_buffer()?)
}

/// Metadata columns whose non-null values are all numeric are written as
/// Float64, everything else as text.
fn write_combined_parquet(dataset: &CombinedDataset, file: &mut File) -> Result<()> {
    let n = dataset.row_count();
    let mut shift = Vec::with_capacity(n);
    let mut raw = Vec::with_capacity(n);
    let mut corrected = Vec::with_capacity(n);
    let mut files: Vec<&str> = Vec::with_capacity(n);
    let mut names: Vec<&str> = Vec::with_capacity(n);
    let mut meta_cells: Vec<Vec<&MetadataValue>> = vec![Vec::with_capacity(n); dataset.metadata_columns.len()];

    for sp in &dataset.spectra {
        let s = &sp.spectrum;
        shift.extend_from_slice(&s.raw.raman_shift);
        raw.extend_from_slice(&s.raw.intensity);
        corrected.extend_from_slice(&s.corrected);
        files.extend(std::iter::repeat(s.file()).take(s.len()));
        names.extend(std::iter::repeat(s.spectrum_name()).take(s.len()));
        for (col, cells) in dataset.metadata_columns.iter().zip(meta_cells.iter_mut()) {
            cells.extend(std::iter::repeat(sp.attribute(col)).take(s.len()));
        }
    }

    let column_names = dataset.column_names();
    let mut fields = vec![
        Field::new(&column_names[0], DataType::Float64, false),
        Field::new(&column_names[1], DataType::Float64, false),
        Field::new(&column_names[2], DataType::Float64, false),
        Field::new(&column_names[3], DataType::Utf8, false),
        Field::new(&column_names[4], DataType::Utf8, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from(shift)),
        Arc::new(Float64Array::from(raw)),
        Arc::new(Float64Array::from(corrected)),
        Arc::new(StringArray::from(files)),
        Arc::new(StringArray::from(names)),
    ];

    for (name, cells) in dataset.metadata_columns.iter().zip(meta_cells) {
        let numeric = cells.iter().all(|c| c.is_null() || c.as_f64().is_some());
        if numeric {
            fields.push(Field::new(name, DataType::Float64, true));
            let values: Vec<Option<f64>> = cells.iter().map(|c| c.as_f64()).collect();
            columns.push(Arc::new(Float64Array::from(values)));
        } else {
            fields.push(Field::new(name, DataType::Utf8, true));
            let values: Vec<Option<String>> = cells
                .iter()
                .map(|c| (!c.is_null()).then(|| c.to_cell()))
                .collect();
            columns.push(Arc::new(StringArray::from(values)));
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Analysis results
// ---------------------------------------------------------------------------

/// Write the analysis as a workbook with the sheets `intensites` (wide) and
/// `ratios` (long).
pub fn export_analysis(result: &AnalysisResult, path: &Path) -> Result<()> {
    let bytes = analysis_workbook(result)?;
    write_atomically(path, |file| file.write_all(&bytes).map_err(|e| PipelineError::io(path, e)))?;
    info!(
        "Exported {} intensity row(s) and {} ratio row(s) to {}",
        result.intensities.rows.len(),
        result.ratios.rows.len(),
        path.display()
    );
    Ok(())
}

fn analysis_workbook(result: &AnalysisResult) -> Result<Vec<u8>> {
    let intensities = &result.intensities;
    let ratios = &result.ratios;
    check_sheet_rows(intensities.rows.len(), INTENSITY_SHEET)?;
    check_sheet_rows(ratios.rows.len(), RATIO_SHEET)?;

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    // ---- intensites ----
    let sheet = workbook.add_worksheet();
    sheet.set_name(INTENSITY_SHEET)?;
    let mut header = vec!["file".to_string(), "Spectrum name".to_string()];
    header.extend(intensities.peaks.iter().map(|&p| intensity_label(p)));
    header.extend(intensities.attribute_columns.iter().cloned());
    write_header(sheet, &header, &bold)?;

    for (r, row) in intensities.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        sheet.write_string(r, 0, &row.file)?;
        sheet.write_string(r, 1, &row.spectrum_name)?;
        for (i, value) in row.intensities.iter().enumerate() {
            if let Some(v) = value {
                sheet.write_number(r, (2 + i) as u16, *v)?;
            }
        }
        let offset = 2 + intensities.peaks.len();
        for (i, col) in intensities.attribute_columns.iter().enumerate() {
            let value = row.attributes.get(col).unwrap_or(&MetadataValue::Null);
            write_cell(sheet, r, (offset + i) as u16, value)?;
        }
    }

    // ---- ratios ----
    let sheet = workbook.add_worksheet();
    sheet.set_name(RATIO_SHEET)?;
    let mut header = vec!["file".to_string(), "Spectrum name".to_string()];
    header.extend(ratios.attribute_columns.iter().cloned());
    header.push("Ratio".to_string());
    header.push("Value".to_string());
    write_header(sheet, &header, &bold)?;

    for (r, row) in ratios.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        sheet.write_string(r, 0, &row.file)?;
        sheet.write_string(r, 1, &row.spectrum_name)?;
        for (i, col) in ratios.attribute_columns.iter().enumerate() {
            let value = row.attributes.get(col).unwrap_or(&MetadataValue::Null);
            write_cell(sheet, r, (2 + i) as u16, value)?;
        }
        let offset = (2 + ratios.attribute_columns.len()) as u16;
        sheet.write_string(r, offset, row.label())?;
        sheet.write_number(r, offset + 1, row.value)?;
    }

    Ok(workbook.save_to_buffer()?)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_sheet_rows(rows: usize, what: &str) -> Result<()> {
    if rows + 1 > XLSX_MAX_ROWS {
        return Err(PipelineError::Export(format!(
            "{what} has {rows} rows, more than a worksheet holds; export as CSV or Parquet instead"
        )));
    }
    Ok(())
}

/// A metadata column may not reuse a core column name.
fn check_unique_columns(names: &[String]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::Export(format!("duplicate column '{name}'")));
        }
    }
    Ok(())
}

fn write_header(sheet: &mut Worksheet, names: &[String], bold: &Format) -> Result<()> {
    check_unique_columns(names)?;
    for (col, name) in names.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name, bold)?;
    }
    Ok(())
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, value: &MetadataValue) -> Result<()> {
    match value {
        MetadataValue::Null => {}
        MetadataValue::Integer(i) => {
            sheet.write_number(row, col, *i as f64)?;
        }
        MetadataValue::Float(f) => {
            sheet.write_number(row, col, *f)?;
        }
        MetadataValue::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        MetadataValue::String(s) | MetadataValue::Date(s) => {
            sheet.write_string(row, col, s)?;
        }
    }
    Ok(())
}

/// Write through a temporary file in the destination directory and rename it
/// into place, so a failed export never leaves a partial file at `path`.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut()
        .sync_all()
        .map_err(|e| PipelineError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| PipelineError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CombinedFormat::from_path(Path::new("a.CSV")).unwrap(), CombinedFormat::Csv);
        assert_eq!(CombinedFormat::from_path(Path::new("a.xlsx")).unwrap(), CombinedFormat::Xlsx);
        assert_eq!(
            CombinedFormat::from_path(Path::new("a.parquet")).unwrap(),
            CombinedFormat::Parquet
        );
        assert!(matches!(
            CombinedFormat::from_path(Path::new("a.doc")),
            Err(PipelineError::Export(_))
        ));
    }

    fn dataset_with_metadata_column(column: &str) -> CombinedDataset {
        use crate::data::model::{CombinedSpectrum, CorrectedSpectrum, RawSpectrum};
        let raw = RawSpectrum {
            file: "S01.txt".into(),
            spectrum_name: "S01".into(),
            raman_shift: vec![1000.0, 1001.0],
            intensity: vec![5.0, 6.0],
        };
        let spectrum = CorrectedSpectrum {
            raw,
            baseline: vec![1.0, 1.0],
            corrected: vec![4.0, 5.0],
        };
        let metadata = [(column.to_string(), MetadataValue::String("x".into()))]
            .into_iter()
            .collect();
        CombinedDataset {
            spectra: vec![CombinedSpectrum { spectrum, metadata }],
            metadata_columns: vec![column.to_string()],
        }
    }

    #[test]
    fn test_metadata_column_clashing_with_core_column_is_rejected() {
        let dir = tempdir().unwrap();
        let ds = dataset_with_metadata_column("file");
        for (name, format) in [
            ("out.csv", CombinedFormat::Csv),
            ("out.xlsx", CombinedFormat::Xlsx),
            ("out.parquet", CombinedFormat::Parquet),
        ] {
            let target = dir.path().join(name);
            let err = export_combined(&ds, &target, format).unwrap_err();
            assert!(matches!(err, PipelineError::Export(_)), "{name}: {err}");
            assert!(!target.exists());
        }

        let ok = dataset_with_metadata_column("Sample description");
        let target = dir.path().join("ok.csv");
        export_combined(&ok, &target, CombinedFormat::Csv).unwrap();
        let text = std::fs::read_to_string(&target).unwrap();
        assert!(text.starts_with("Raman Shift,Dark Subtracted #1,Intensity_corrected,file,Spectrum name,Sample description"));
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.csv");
        let err = write_atomically(&target, |_| Err(PipelineError::Export("boom".into())));
        assert!(err.is_err());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_atomic_write_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("out.txt");
        std::fs::write(&target, "old").unwrap();
        write_atomically(&target, |f| f.write_all(b"new").map_err(|e| PipelineError::io("t", e)))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn test_unwritable_destination_is_io_error() {
        let err = write_atomically(Path::new("/nonexistent-dir/out.csv"), |_| Ok(())).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
