use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use log::{info, warn};
use regex::Regex;

use super::model::{MetadataTable, MetadataValue, SPECTRUM_NAME};
use crate::error::{PipelineError, Result};

/// Delimiters tried when sniffing a metadata CSV, in order of preference.
const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];
/// Lines sampled by the delimiter sniffer.
const SNIFF_LINES: usize = 20;
/// Rows searched for a header row.
const HEADER_SEARCH_ROWS: usize = 10;

/// Join column between the tube mapping and the composition table.
pub const TUBE: &str = "Tube";
pub const CONCENTRATION: &str = "C (EGTA) (M)";
pub const CUVETTE_VOLUME: &str = "V cuvette (mL)";
pub const MOLAR_QUANTITY: &str = "n(EGTA) (mol)";

/// Row label of the concentrations in a wide composition sheet.
const CONCENTRATION_ROW: &str = "C (EGTA)";
/// First-column label above the spectrum/tube pairs of a lab mapping sheet.
const MAPPING_HEADER: &str = "nom du spectre";
/// `tube 3`, `Tube3`, `TUBE 12 (blank)`…
const TUBE_LABEL: &str = r"(?i)^tube\s*(\d+)";

/// Declared kind of a metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Excel,
    Csv,
}

impl MetadataKind {
    /// Infer the kind from the file extension (`.csv` / `.txt` / `.tsv` → CSV,
    /// anything else is handed to the spreadsheet reader).
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => MetadataKind::Csv,
            _ => MetadataKind::Excel,
        }
    }
}

/// Where to read the metadata from.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataSource {
    /// One table with a `Spectrum name` column.
    Table { path: PathBuf, kind: MetadataKind },
    /// A per-tube composition table and a spectrum → tube mapping, joined on
    /// `Tube`.
    Composed { composition: PathBuf, mapping: PathBuf },
}

impl MetadataSource {
    pub fn new(path: impl Into<PathBuf>, kind: MetadataKind) -> Self {
        MetadataSource::Table {
            path: path.into(),
            kind,
        }
    }

    /// Single table whose kind is inferred from the extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = MetadataKind::from_path(&path);
        MetadataSource::Table { path, kind }
    }

    pub fn composed(composition: impl Into<PathBuf>, mapping: impl Into<PathBuf>) -> Self {
        MetadataSource::Composed {
            composition: composition.into(),
            mapping: mapping.into(),
        }
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataSource::Table { path, .. } => write!(f, "{}", path.display()),
            MetadataSource::Composed {
                composition,
                mapping,
            } => write!(f, "{} + {}", composition.display(), mapping.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load the metadata table keyed by `Spectrum name`.
pub fn load_metadata(source: &MetadataSource) -> Result<MetadataTable> {
    let table = match source {
        MetadataSource::Table { path, kind } => {
            let grid = Grid::read(path, *kind)?;
            let header = grid.find_header(&[SPECTRUM_NAME]).unwrap_or(0);
            let (headers, rows) = grid.table_below(header, &[SPECTRUM_NAME]);
            build_table(headers, rows)?
        }
        MetadataSource::Composed {
            composition,
            mapping,
        } => load_composed(composition, mapping)?,
    };
    info!(
        "Loaded metadata for {} spectra ({} columns) from {source}",
        table.len(),
        table.columns.len(),
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// Cell grid shared by the CSV and spreadsheet readers
// ---------------------------------------------------------------------------

type RawTable = (Vec<String>, Vec<Vec<MetadataValue>>);

/// Every non-blank row of a file, header rows included. CSV cells stay text
/// until [`Grid::value`] types them; spreadsheet cells keep their own type.
struct Grid {
    kind: MetadataKind,
    rows: Vec<Vec<MetadataValue>>,
}

impl Grid {
    fn read(path: &Path, kind: MetadataKind) -> Result<Self> {
        let rows = match kind {
            MetadataKind::Csv => read_csv(path)?,
            MetadataKind::Excel => read_excel(path)?,
        };
        Ok(Self { kind, rows })
    }

    fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    fn cell(&self, row: usize, col: usize) -> &MetadataValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&MetadataValue::Null)
    }

    /// Trimmed label text; integral numbers print without a fraction.
    fn text(&self, row: usize, col: usize) -> String {
        self.cell(row, col).as_key().unwrap_or_default()
    }

    fn value(&self, row: usize, col: usize) -> MetadataValue {
        match (self.kind, self.cell(row, col)) {
            (MetadataKind::Csv, MetadataValue::String(s)) => MetadataValue::from_text(s),
            (_, other) => other.clone(),
        }
    }

    fn number(&self, row: usize, col: usize) -> Option<f64> {
        self.value(row, col).as_f64()
    }

    fn find_row(&self, pred: impl Fn(usize) -> bool) -> Option<usize> {
        (0..self.rows.len()).find(|&r| pred(r))
    }

    fn row_has(&self, row: usize, pred: impl Fn(&str) -> bool) -> bool {
        (0..self.rows[row].len()).any(|c| pred(self.text(row, c).as_str()))
    }

    /// First row, within the first few, naming every column of `required`.
    /// Lab sheets often carry a title row above the real header.
    fn find_header(&self, required: &[&str]) -> Option<usize> {
        (0..self.rows.len().min(HEADER_SEARCH_ROWS))
            .find(|&r| required.iter().all(|name| self.row_has(r, |t| t == *name)))
    }

    /// Header names of `header` and the rows below it. Columns named in
    /// `raw` keep the cell as read, so a CSV key like `007` is not read as 7.
    fn table_below(&self, header: usize, raw: &[&str]) -> RawTable {
        let headers: Vec<String> = (0..self.width()).map(|c| self.text(header, c)).collect();
        let rows = (header + 1..self.rows.len())
            .map(|r| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(c, name)| {
                        if raw.contains(&name.as_str()) {
                            self.cell(r, c).clone()
                        } else {
                            self.value(r, c)
                        }
                    })
                    .collect()
            })
            .collect();
        (headers, rows)
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<Vec<Vec<MetadataValue>>> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_start_matches('\u{feff}');
    let delimiter = sniff_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .map(|cell| match cell {
                "" => MetadataValue::Null,
                s => MetadataValue::String(s.to_string()),
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Pick the field delimiter among `,`, `;` and tab.
///
/// A candidate scores when it appears the same non-zero number of times on
/// every sampled line; among scoring candidates the most frequent wins. When
/// no candidate is consistent the most frequent overall is used, and `,` when
/// none appears at all.
pub fn sniff_delimiter(text: &str) -> u8 {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SNIFF_LINES)
        .collect();
    if sample.is_empty() {
        return b',';
    }

    let counts = |delim: u8| -> Vec<usize> {
        sample
            .iter()
            .map(|line| count_outside_quotes(line, delim))
            .collect()
    };

    let mut best_consistent: Option<(u8, usize)> = None;
    let mut best_total: Option<(u8, usize)> = None;
    for &delim in &CANDIDATE_DELIMITERS {
        let per_line = counts(delim);
        let total: usize = per_line.iter().sum();
        if total > best_total.map_or(0, |(_, t)| t) {
            best_total = Some((delim, total));
        }
        let first = per_line[0];
        if first > 0
            && per_line.iter().all(|&c| c == first)
            && first > best_consistent.map_or(0, |(_, c)| c)
        {
            best_consistent = Some((delim, first));
        }
    }

    best_consistent
        .or(best_total)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

fn count_outside_quotes(line: &str, delim: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delim && !in_quotes {
            count += 1;
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Excel
// ---------------------------------------------------------------------------

/// Cells of the first worksheet.
fn read_excel(path: &Path) -> Result<Vec<Vec<MetadataValue>>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::Assembly(format!("{} has no worksheet", path.display())))??;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_value).collect())
        .collect())
}

fn cell_value(cell: &Data) -> MetadataValue {
    match cell {
        Data::Int(i) => MetadataValue::Integer(*i),
        Data::Float(f) => MetadataValue::Float(*f),
        Data::Bool(b) => MetadataValue::Bool(*b),
        Data::String(s) if s.trim().is_empty() => MetadataValue::Null,
        Data::String(s) => MetadataValue::String(s.trim().to_string()),
        Data::DateTimeIso(s) => MetadataValue::Date(s.clone()),
        Data::Empty | Data::Error(_) => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Composition table + tube mapping
// ---------------------------------------------------------------------------

/// Composition columns per tube label.
struct TubeTable {
    columns: Vec<String>,
    rows: Vec<(String, Vec<MetadataValue>)>,
}

fn load_composed(composition: &Path, mapping: &Path) -> Result<MetadataTable> {
    let pattern = Regex::new(TUBE_LABEL).map_err(|e| PipelineError::Assembly(e.to_string()))?;

    let comp = Grid::read(composition, MetadataKind::from_path(composition))?;
    let tubes = composition_from_wide(&comp, &pattern)
        .or_else(|| composition_from_long(&comp))
        .ok_or_else(|| {
            PipelineError::Assembly(format!(
                "{}: no '{TUBE}' column and no '{CONCENTRATION_ROW}' row under tube labels",
                composition.display()
            ))
        })?;

    let map = Grid::read(mapping, MetadataKind::from_path(mapping))?;
    let spectra = mapping_table(&map).ok_or_else(|| {
        PipelineError::Assembly(format!(
            "{}: needs '{SPECTRUM_NAME}' and '{TUBE}' columns",
            mapping.display()
        ))
    })?;

    merge_on_tube(spectra, &tubes, &pattern)
}

/// Wide sheet: a row of `tube N` labels, a `C (EGTA)` row of molar
/// concentrations and optionally a `V cuvette (mL)` row, one tube per column.
/// `n(EGTA) (mol)` is C·V·1e-3 when volumes are given.
fn composition_from_wide(grid: &Grid, pattern: &Regex) -> Option<TubeTable> {
    let conc_row = grid.find_row(|r| grid.row_has(r, |t| t == CONCENTRATION_ROW))?;
    let tube_row = grid.find_row(|r| grid.row_has(r, |t| pattern.is_match(t)))?;
    let volume_row = grid.find_row(|r| grid.row_has(r, |t| t == CUVETTE_VOLUME));

    let mut tubes = Vec::new();
    for c in 0..grid.width() {
        let Some(n) = tube_number(&grid.text(tube_row, c), pattern) else {
            continue;
        };
        let Some(conc) = grid.number(conc_row, c) else {
            continue;
        };
        let volume = volume_row.and_then(|r| grid.number(r, c));
        tubes.push((format!("Tube {n}"), conc, volume));
    }
    if tubes.is_empty() {
        return None;
    }

    let with_volume = tubes.iter().any(|(_, _, v)| v.is_some());
    let mut columns = vec![CONCENTRATION.to_string()];
    if with_volume {
        columns.push(CUVETTE_VOLUME.to_string());
        columns.push(MOLAR_QUANTITY.to_string());
    }
    let float = |v: Option<f64>| v.map_or(MetadataValue::Null, MetadataValue::Float);
    let rows = tubes
        .into_iter()
        .map(|(label, conc, volume)| {
            let mut values = vec![MetadataValue::Float(conc)];
            if with_volume {
                values.push(float(volume));
                values.push(float(volume.map(|v| conc * v * 1e-3)));
            }
            (label, values)
        })
        .collect();
    Some(TubeTable { columns, rows })
}

/// Long table with a `Tube` column; every other named column is carried.
fn composition_from_long(grid: &Grid) -> Option<TubeTable> {
    let header = grid.find_header(&[TUBE])?;
    let (headers, rows) = grid.table_below(header, &[TUBE]);
    let tube_idx = headers.iter().position(|h| h == TUBE)?;
    let keep: Vec<usize> = (0..headers.len())
        .filter(|&i| i != tube_idx && !headers[i].is_empty())
        .collect();
    let rows = rows
        .into_iter()
        .filter_map(|row| {
            let label = row.get(tube_idx)?.as_key()?;
            let values = keep.iter().map(|&i| row[i].clone()).collect();
            Some((label, values))
        })
        .collect();
    Some(TubeTable {
        columns: keep.iter().map(|&i| headers[i].clone()).collect(),
        rows,
    })
}

/// Spectrum → tube rows, headed `Spectrum name`, `Tube`, then any other
/// columns of a long mapping table.
fn mapping_table(grid: &Grid) -> Option<RawTable> {
    let lab_header = grid.find_row(|r| {
        grid.text(r, 0).to_lowercase().starts_with(MAPPING_HEADER)
            && grid.text(r, 1).to_lowercase().starts_with("tube")
    });
    if let Some(header) = lab_header {
        let rows = (header + 1..grid.rows.len())
            .filter_map(|r| {
                let name = grid.text(r, 0);
                if name.is_empty() || name.eq_ignore_ascii_case("nan") {
                    return None;
                }
                let tube = match grid.text(r, 1) {
                    t if t.is_empty() => MetadataValue::Null,
                    t => MetadataValue::String(t),
                };
                Some(vec![MetadataValue::String(name), tube])
            })
            .collect();
        return Some((vec![SPECTRUM_NAME.to_string(), TUBE.to_string()], rows));
    }

    let header = grid.find_header(&[SPECTRUM_NAME, TUBE])?;
    Some(grid.table_below(header, &[SPECTRUM_NAME, TUBE]))
}

/// Left join of the mapping with the composition table. Columns the mapping
/// already has are not taken from the composition table.
fn merge_on_tube(mapping: RawTable, tubes: &TubeTable, pattern: &Regex) -> Result<MetadataTable> {
    let (mut headers, rows) = mapping;
    let tube_idx = headers
        .iter()
        .position(|h| h == TUBE)
        .ok_or_else(|| PipelineError::Assembly(format!("mapping has no '{TUBE}' column")))?;

    let by_key: HashMap<String, &[MetadataValue]> = tubes
        .rows
        .iter()
        .map(|(label, values)| (tube_key(label, pattern), values.as_slice()))
        .collect();
    let added: Vec<usize> = (0..tubes.columns.len())
        .filter(|&i| !headers.contains(&tubes.columns[i]))
        .collect();

    let width = headers.len();
    let mut unknown = BTreeSet::new();
    let rows: Vec<Vec<MetadataValue>> = rows
        .into_iter()
        .map(|mut row| {
            row.resize(width, MetadataValue::Null);
            let label = row[tube_idx].as_key().unwrap_or_default();
            let values = by_key.get(&tube_key(&label, pattern));
            if values.is_none() && !label.is_empty() {
                unknown.insert(label);
            }
            row.extend(added.iter().map(|&i| {
                values
                    .and_then(|v| v.get(i))
                    .cloned()
                    .unwrap_or(MetadataValue::Null)
            }));
            row
        })
        .collect();
    if !unknown.is_empty() {
        let unknown: Vec<String> = unknown.into_iter().collect();
        warn!("No composition for tube(s) {}", unknown.join(", "));
    }

    headers.extend(added.iter().map(|&i| tubes.columns[i].clone()));
    build_table(headers, rows)
}

fn tube_number(label: &str, pattern: &Regex) -> Option<u64> {
    pattern
        .captures(label.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `Tube 3`, `tube3` and a bare `3` name the same tube.
fn tube_key(label: &str, pattern: &Regex) -> String {
    let label = label.trim();
    let number = tube_number(label, pattern).or_else(|| {
        label
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| label.parse().ok())
            .flatten()
    });
    match number {
        Some(n) => format!("tube {n}"),
        None => label.to_lowercase(),
    }
}

// ---------------------------------------------------------------------------
// Table assembly
// ---------------------------------------------------------------------------

fn build_table(headers: Vec<String>, rows: Vec<Vec<MetadataValue>>) -> Result<MetadataTable> {
    let key_idx = headers
        .iter()
        .position(|h| h == SPECTRUM_NAME)
        .ok_or_else(|| {
            PipelineError::Assembly(format!(
                "metadata has no '{SPECTRUM_NAME}' column (found: {})",
                headers.join(", ")
            ))
        })?;

    // Unnamed columns are spreadsheet padding.
    let attribute_idx: Vec<usize> = (0..headers.len())
        .filter(|&i| i != key_idx && !headers[i].is_empty())
        .collect();
    let columns: Vec<String> = attribute_idx.iter().map(|&i| headers[i].clone()).collect();

    let mut table_rows: BTreeMap<String, BTreeMap<String, MetadataValue>> = BTreeMap::new();
    for row in rows {
        let Some(key) = row.get(key_idx).and_then(MetadataValue::as_key) else {
            continue;
        };
        if table_rows.contains_key(&key) {
            warn!("Duplicate '{SPECTRUM_NAME}' {key:?} in metadata, keeping the first row");
            continue;
        }
        let attributes = attribute_idx
            .iter()
            .map(|&i| {
                let value = row.get(i).cloned().unwrap_or(MetadataValue::Null);
                (headers[i].clone(), value)
            })
            .collect();
        table_rows.insert(key, attributes);
    }

    Ok(MetadataTable {
        columns,
        rows: table_rows,
    })
}
