use std::path::Path;

use log::debug;

use super::model::{RawSpectrum, DARK_SUBTRACTED, RAMAN_SHIFT};
use crate::error::{PipelineError, Result};

/// Token that opens the data table in instrument exports.
pub const HEADER_TOKEN: &str = "Pixel;";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Parse one instrument text export.
///
/// Layout expected:
///
/// ```text
/// <free-form acquisition header…>
/// Pixel;Raman Shift;Dark Subtracted #1;…
/// 1;1000,5;50,2;…
/// ```
///
/// Everything before the `Pixel;` line is ignored. Numbers use `,` as the
/// decimal separator.
pub fn parse_file(path: &Path) -> Result<RawSpectrum> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_str(&text, &file)
}

/// Parse the contents of an instrument export. `file` is the base file name
/// the spectrum will be known by.
pub fn parse_str(text: &str, file: &str) -> Result<RawSpectrum> {
    let start = header_offset(text)
        .ok_or_else(|| PipelineError::parse(file, "no header line starting with 'Pixel;'"))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text[start..].as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::parse(file, e.to_string()))?
        .iter()
        .map(normalise_header)
        .collect();
    let shift_idx = column_index(&columns, RAMAN_SHIFT, file)?;
    let intensity_idx = column_index(&columns, DARK_SUBTRACTED, file)?;

    let mut rows: Vec<(f64, f64)> = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let Ok(record) = record else {
            dropped += 1;
            continue;
        };
        if record.iter().all(str::is_empty) {
            continue;
        }
        let shift = record.get(shift_idx).and_then(parse_decimal);
        let intensity = record.get(intensity_idx).and_then(parse_decimal);
        match (shift, intensity) {
            (Some(x), Some(y)) => rows.push((x, y)),
            _ => dropped += 1,
        }
    }

    if rows.is_empty() {
        return Err(PipelineError::parse(file, "no numeric data rows after the header"));
    }
    if dropped > 0 {
        debug!("{file}: dropped {dropped} non-numeric row(s)");
    }

    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (raman_shift, intensity) = rows.into_iter().unzip();

    Ok(RawSpectrum {
        file: file.to_string(),
        spectrum_name: spectrum_name_of(file),
        raman_shift,
        intensity,
    })
}

/// Derive the metadata join key from a file name: the name without its
/// extension.
pub fn spectrum_name_of(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Byte offset of the first line starting with [`HEADER_TOKEN`].
fn header_offset(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with(HEADER_TOKEN) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn normalise_header(name: &str) -> String {
    name.replace('\u{a0}', " ").trim().to_string()
}

fn column_index(columns: &[String], name: &str, file: &str) -> Result<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| PipelineError::parse(file, format!("missing column '{name}'")))
}

/// Parse a comma-decimal number such as `1000,5`. Blank and non-numeric
/// fields yield `None`.
fn parse_decimal(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    field
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Integration Time;1000
Laser Wavelength;532,07
Pixel;Raman Shift;Wavelength;Dark Subtracted #1;
2;1001,0;560,1;52,5;
1;1000,5;560,0;50,2;
";

    #[test]
    fn test_parses_comma_decimals_sorted() {
        let sp = parse_str(SAMPLE, "S01.txt").unwrap();
        assert_eq!(sp.raman_shift, vec![1000.5, 1001.0]);
        assert_eq!(sp.intensity, vec![50.2, 52.5]);
        assert_eq!(sp.file, "S01.txt");
        assert_eq!(sp.spectrum_name, "S01");
    }

    #[test]
    fn test_minimal_header_scenario() {
        let text = "Pixel;Raman Shift;Dark Subtracted #1\n1;1000,5;50,2\n2;1001,0;52,5\n";
        let sp = parse_str(text, "a.txt").unwrap();
        assert_eq!(sp.len(), 2);
        assert_eq!(sp.raman_shift, vec![1000.5, 1001.0]);
    }

    #[test]
    fn test_drops_rows_that_fail_coercion() {
        let text = "Pixel;Raman Shift;Dark Subtracted #1\n\
                    1;1000,5;50,2\n\
                    2;n/a;51,0\n\
                    3;1002,0;\n\
                    \n\
                    4;1003,0;53,0\n";
        let sp = parse_str(text, "a.txt").unwrap();
        assert_eq!(sp.raman_shift, vec![1000.5, 1003.0]);
        assert!(sp.intensity.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_header_with_non_breaking_space() {
        let text = "Pixel;Raman\u{a0}Shift; Dark Subtracted #1 \n1;10,0;1,0\n";
        let sp = parse_str(text, "nbsp.txt").unwrap();
        assert_eq!(sp.raman_shift, vec![10.0]);
    }

    #[test]
    fn test_missing_header_is_parse_error() {
        let err = parse_str("Raman Shift;Dark Subtracted #1\n1;2\n", "x.txt").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn test_missing_required_column_is_parse_error() {
        let err = parse_str("Pixel;Raman Shift;Raw\n1;10,0;1,0\n", "x.txt").unwrap_err();
        match err {
            PipelineError::Parse { reason, .. } => assert!(reason.contains(DARK_SUBTRACTED)),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_quoted_fields_are_read() {
        let text = "Pixel;Raman Shift;Dark Subtracted #1\n\
                    1;\"1000,5\";\"50,2\"\n\
                    2;1001,0;52,5\n";
        let sp = parse_str(text, "quoted.txt").unwrap();
        assert_eq!(sp.raman_shift, vec![1000.5, 1001.0]);
        assert_eq!(sp.intensity, vec![50.2, 52.5]);
    }

    #[test]
    fn test_semicolons_in_acquisition_header_are_ignored() {
        let text = "title;a;b;c;d\nnote;\"unterminated\nPixel;Raman Shift;Dark Subtracted #1;\n1;10,0;1,0;\n";
        let sp = parse_str(text, "hdr.txt").unwrap();
        assert_eq!(sp.raman_shift, vec![10.0]);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let text = "Pixel;Raman Shift;Dark Subtracted #1\n1;5,0;1,0\n2;5,0;2,0\n3;4,0;3,0\n";
        let sp = parse_str(text, "dup.txt").unwrap();
        assert_eq!(sp.raman_shift, vec![4.0, 5.0, 5.0]);
        assert_eq!(sp.intensity, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_spectrum_name_strips_only_last_extension() {
        assert_eq!(spectrum_name_of("run.2024.txt"), "run.2024");
        assert_eq!(spectrum_name_of("noext"), "noext");
    }
}
