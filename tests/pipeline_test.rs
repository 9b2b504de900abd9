use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use calamine::Reader;
use tempfile::TempDir;

use rusty_raman::data::analysis::{self, AnalysisOptions, PeakSet};
use rusty_raman::data::assemble::{assemble, AssemblyOptions};
use rusty_raman::data::export::{self, CombinedFormat, INTENSITY_SHEET, RATIO_SHEET};
use rusty_raman::data::loader;
use rusty_raman::data::metadata::MetadataSource;
use rusty_raman::data::model::{MetadataValue, SAMPLE_DESCRIPTION};
use rusty_raman::{PipelineConfig, PipelineError, Session};

const QUANTITY: &str = "n(EGTA) (mol)";

fn gaussian(x: f64, mu: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * 4.0_f64.powi(2))).exp()
}

/// Instrument export on 1200..1500 cm⁻¹ with a sloped background and the
/// given (position, amplitude) peaks.
fn instrument_text(peaks: &[(f64, f64)]) -> String {
    let mut out = String::from("File Version;BWSpec4.11_1\nintegration times(ms);1000\n");
    out.push_str("Pixel;Raman Shift;Dark Subtracted #1;\n");
    for i in 0..=300 {
        let x = 1200.0 + i as f64;
        let background = 500.0 + 0.2 * (x - 1200.0);
        let y = background + peaks.iter().map(|&(mu, a)| gaussian(x, mu, a)).sum::<f64>();
        let _ = writeln!(
            out,
            "{i};{};{};",
            format!("{x:.2}").replace('.', ","),
            format!("{y:.4}").replace('.', ",")
        );
    }
    out
}

struct Fixture {
    dir: TempDir,
    spectra: Vec<PathBuf>,
    metadata: PathBuf,
}

impl Fixture {
    /// S01/S02 titration points, S03 a buffer blank, S04 absent from the
    /// metadata table.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let files = [
            ("S01.txt", vec![(1231.0, 300.0), (1327.0, 150.0)]),
            ("S02.txt", vec![(1231.0, 300.0), (1327.0, 600.0)]),
            ("S03.txt", vec![]),
            ("S04.txt", vec![(1327.0, 400.0)]),
        ];
        let spectra = files
            .iter()
            .map(|(name, peaks)| {
                let path = dir.path().join(name);
                std::fs::write(&path, instrument_text(peaks)).unwrap();
                path
            })
            .collect();

        let metadata = dir.path().join("metadata.csv");
        std::fs::write(
            &metadata,
            "Spectrum name;Sample description;n(EGTA) (mol)\n\
             S01;Titration;0.0000001\n\
             S02;Titration;0.0000004\n\
             S03;Cuvette BRB;\n",
        )
        .unwrap();

        Self {
            dir,
            spectra,
            metadata,
        }
    }

    fn source(&self) -> MetadataSource {
        MetadataSource::from_path(&self.metadata)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn column_set(names: Vec<String>) -> BTreeSet<String> {
    names.into_iter().collect()
}

#[test]
fn test_assemble_joins_metadata_and_drops_blank() {
    let fx = Fixture::new();
    let assembly = assemble(&fx.spectra, &fx.source(), &AssemblyOptions::default()).unwrap();
    let ds = &assembly.dataset;

    assert_eq!(ds.file_names(), vec!["S01.txt", "S02.txt", "S04.txt"]);
    assert_eq!(ds.row_count(), 3 * 301);
    assert_eq!(ds.column_count(), 7);
    assert_eq!(assembly.summary.excluded, 1);
    assert_eq!(assembly.summary.unmatched, vec!["S04".to_string()]);
    assert!(assembly.summary.skipped.is_empty());

    let s01 = &ds.spectra[0];
    assert_eq!(s01.attribute(SAMPLE_DESCRIPTION), &MetadataValue::String("Titration".into()));
    assert_eq!(s01.attribute(QUANTITY).as_f64(), Some(1e-7));

    let s04 = &ds.spectra[2];
    assert!(s04.attribute(SAMPLE_DESCRIPTION).is_null());
    assert!(s04.attribute(QUANTITY).is_null());
}

#[test]
fn test_assemble_keeps_blank_when_asked() {
    let fx = Fixture::new();
    let options = AssemblyOptions {
        exclude_brb: false,
        ..AssemblyOptions::default()
    };
    let assembly = assemble(&fx.spectra, &fx.source(), &options).unwrap();
    assert_eq!(assembly.dataset.len(), 4);
    assert_eq!(assembly.summary.excluded, 0);
}

#[test]
fn test_unreadable_spectrum_is_skipped() {
    let fx = Fixture::new();
    let broken = fx.path("broken.txt");
    std::fs::write(&broken, "no table in here\n").unwrap();

    let mut paths = fx.spectra.clone();
    paths.push(broken.clone());
    let assembly = assemble(&paths, &fx.source(), &AssemblyOptions::default()).unwrap();

    assert_eq!(assembly.dataset.len(), 3);
    assert_eq!(assembly.summary.skipped.len(), 1);
    assert_eq!(assembly.summary.skipped[0].path, broken);
}

#[test]
fn test_missing_key_column_fails_assembly() {
    let fx = Fixture::new();
    let metadata = fx.path("bad_metadata.csv");
    std::fs::write(&metadata, "Name;Sample description\nS01;x\n").unwrap();

    let result = assemble(
        &fx.spectra,
        &MetadataSource::from_path(&metadata),
        &AssemblyOptions::default(),
    );
    assert!(matches!(result, Err(PipelineError::Assembly(_))));
}

#[test]
fn test_corrected_peak_stands_above_baseline() {
    let fx = Fixture::new();
    let assembly = assemble(&fx.spectra, &fx.source(), &AssemblyOptions::default()).unwrap();
    let set = PeakSet::parse("test", "1231,1327").unwrap();
    let result = analysis::analyze(&assembly.dataset, &set, &AnalysisOptions::default()).unwrap();

    // S02 has a 600-count band at 1327 on a ~520 background.
    let i1327 = result.intensities.get("S02.txt", 1327.0).unwrap();
    assert!(i1327 > 300.0, "corrected 1327 band only {i1327}");

    // S04 has no 1231 band, so its corrected value stays small.
    let i1231 = result.intensities.get("S04.txt", 1231.0).unwrap();
    assert!(i1231 < 0.25 * i1327, "flat region corrected to {i1231}");
}

#[test]
fn test_analysis_ratios_follow_peak_order() {
    let fx = Fixture::new();
    let assembly = assemble(&fx.spectra, &fx.source(), &AssemblyOptions::default()).unwrap();
    let set = PeakSet::parse("test", "1231,1327").unwrap();
    let result = analysis::analyze(&assembly.dataset, &set, &AnalysisOptions::default()).unwrap();

    assert_eq!(result.quantity_column.as_deref(), Some(QUANTITY));
    assert_eq!(result.intensities.rows.len(), 3);

    let s01 = result
        .ratios
        .rows
        .iter()
        .find(|r| r.file == "S01.txt")
        .unwrap();
    assert_eq!(s01.label(), "ratio_I_1231_I_1327");
    let expected = result.intensities.get("S01.txt", 1231.0).unwrap()
        / result.intensities.get("S01.txt", 1327.0).unwrap();
    approx::assert_relative_eq!(s01.value, expected, max_relative = 1e-12);
    assert_eq!(s01.attributes.get(QUANTITY).and_then(MetadataValue::as_f64), Some(1e-7));

    // More 1327 signal in S02 lowers the ratio.
    let s02 = result
        .ratios
        .rows
        .iter()
        .find(|r| r.file == "S02.txt")
        .unwrap();
    assert!(s02.value < s01.value);
}

#[test]
fn test_csv_export_reloads_same_table() {
    let fx = Fixture::new();
    let assembly = assemble(&fx.spectra, &fx.source(), &AssemblyOptions::default()).unwrap();
    let out = fx.path("combined.csv");

    export::export_combined(&assembly.dataset, &out, CombinedFormat::Csv).unwrap();
    let reloaded = loader::load_file(&out).unwrap();

    assert_eq!(reloaded.row_count(), assembly.dataset.row_count());
    assert_eq!(
        column_set(reloaded.column_names()),
        column_set(assembly.dataset.column_names())
    );
    assert_eq!(reloaded.file_names(), assembly.dataset.file_names());
    approx::assert_relative_eq!(
        reloaded.spectra[1].spectrum.corrected[10],
        assembly.dataset.spectra[1].spectrum.corrected[10],
        max_relative = 1e-9
    );
}

#[test]
fn test_parquet_export_reloads_same_table() {
    let fx = Fixture::new();
    let assembly = assemble(&fx.spectra, &fx.source(), &AssemblyOptions::default()).unwrap();
    let out = fx.path("combined.parquet");

    export::export_combined(&assembly.dataset, &out, CombinedFormat::Parquet).unwrap();
    let reloaded = loader::load_file(&out).unwrap();

    assert_eq!(reloaded.row_count(), assembly.dataset.row_count());
    assert_eq!(
        column_set(reloaded.column_names()),
        column_set(assembly.dataset.column_names())
    );
    assert_eq!(reloaded.spectra[0].attribute(QUANTITY).as_f64(), Some(1e-7));
}

#[test]
fn test_xlsx_export_opens_with_calamine() {
    let fx = Fixture::new();
    let assembly = assemble(&fx.spectra, &fx.source(), &AssemblyOptions::default()).unwrap();
    let out = fx.path("combined.xlsx");

    export::export_combined(&assembly.dataset, &out, CombinedFormat::Xlsx).unwrap();

    let mut workbook = calamine::open_workbook_auto(&out).unwrap();
    let range = workbook.worksheet_range_at(0).unwrap().unwrap();
    assert_eq!(range.height(), assembly.dataset.row_count() + 1);
    assert_eq!(range.width(), assembly.dataset.column_count());
}

#[test]
fn test_analysis_workbook_has_both_sheets() {
    let fx = Fixture::new();
    let assembly = assemble(&fx.spectra, &fx.source(), &AssemblyOptions::default()).unwrap();
    let set = PeakSet::builtin_named("532 nm").unwrap();
    let result = analysis::analyze(&assembly.dataset, &set, &AnalysisOptions::default()).unwrap();
    let out = fx.path("analysis.xlsx");

    export::export_analysis(&result, &out).unwrap();

    let workbook = calamine::open_workbook_auto(&out).unwrap();
    let names = workbook.sheet_names();
    assert!(names.iter().any(|n| n == INTENSITY_SHEET));
    assert!(names.iter().any(|n| n == RATIO_SHEET));
}

#[test]
fn test_unknown_export_extension_is_rejected() {
    assert!(matches!(
        CombinedFormat::from_path(Path::new("out.json")),
        Err(PipelineError::Export(_))
    ));
}

#[test]
fn test_session_flow_and_failure_keeps_state() {
    let fx = Fixture::new();
    let mut session = Session::new(PipelineConfig::default());

    assert!(session.analyze().is_err());

    let summary = session.assemble(&fx.spectra, &fx.source()).unwrap();
    assert_eq!(summary.spectra, 3);
    let result = session.analyze().unwrap();
    assert_eq!(result.peak_set.name, "532 nm");

    let out = fx.path("analysis.xlsx");
    session.export_analysis(&out).unwrap();
    assert!(out.exists());

    // A failing run leaves the previous dataset and analysis in place.
    let missing = MetadataSource::from_path(fx.path("missing.csv"));
    assert!(session.assemble(&fx.spectra, &missing).is_err());
    assert_eq!(session.combined().map(|d| d.len()), Some(3));
    assert!(session.analysis().is_some());

    // Unchanged files come from the cache on the second run.
    session.assemble(&fx.spectra, &fx.source()).unwrap();
    let (hits, _) = session.cache().stats();
    assert_eq!(hits, 4);
    assert!(session.analysis().is_none());
    assert_eq!(session.cache().len(), 4);

    // Files left out of a run are evicted from the cache.
    session.assemble(&fx.spectra[..2], &fx.source()).unwrap();
    assert_eq!(session.cache().len(), 2);
}

#[test]
fn test_excel_metadata_joins_numeric_spectrum_names() {
    let dir = tempfile::tempdir().unwrap();
    let spectra: Vec<PathBuf> = ["12.txt", "13.txt"]
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            std::fs::write(&path, instrument_text(&[(1327.0, 300.0)])).unwrap();
            path
        })
        .collect();

    let metadata = dir.path().join("metadata.xlsx");
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "EGTA titration").unwrap();
    for (col, name) in ["Spectrum name", SAMPLE_DESCRIPTION, QUANTITY].iter().enumerate() {
        sheet.write_string(1, col as u16, *name).unwrap();
    }
    sheet.write_number(2, 0, 12.0).unwrap();
    sheet.write_string(2, 1, "Titration").unwrap();
    sheet.write_number(2, 2, 4e-7).unwrap();
    sheet.write_number(3, 0, 13.0).unwrap();
    sheet.write_string(3, 1, "Cuvette BRB").unwrap();
    workbook.save(&metadata).unwrap();

    let assembly = assemble(
        &spectra,
        &MetadataSource::from_path(&metadata),
        &AssemblyOptions::default(),
    )
    .unwrap();
    assert_eq!(assembly.dataset.file_names(), vec!["12.txt"]);
    assert_eq!(assembly.summary.excluded, 1);
    assert_eq!(assembly.dataset.spectra[0].attribute(QUANTITY).as_f64(), Some(4e-7));
}

#[test]
fn test_composition_and_tube_mapping_feed_the_analysis() {
    let fx = Fixture::new();
    let composition = fx.path("compositions.csv");
    std::fs::write(
        &composition,
        "Tube;C (EGTA) (M);V cuvette (mL);n(EGTA) (mol);Sample description\n\
         Tube 1;0.0001;1;0.0000001;Titration\n\
         Tube 2;0.0004;1;0.0000004;Titration\n\
         Tube 3;;;;Cuvette BRB\n",
    )
    .unwrap();
    let mapping = fx.path("spectre_tube.csv");
    std::fs::write(
        &mapping,
        "Nom de la manip : ;GC514\nNom du spectre;Tube\nS01;tube 1\nS02;tube 2\nS03;tube 3\n",
    )
    .unwrap();

    let source = MetadataSource::composed(&composition, &mapping);
    let assembly = assemble(&fx.spectra, &source, &AssemblyOptions::default()).unwrap();
    assert_eq!(assembly.dataset.file_names(), vec!["S01.txt", "S02.txt", "S04.txt"]);
    assert_eq!(assembly.summary.excluded, 1);
    assert_eq!(assembly.dataset.spectra[1].attribute(QUANTITY).as_f64(), Some(4e-7));

    let set = PeakSet::parse("test", "1231,1327").unwrap();
    let result = analysis::analyze(&assembly.dataset, &set, &AnalysisOptions::default()).unwrap();
    assert_eq!(result.quantity_column.as_deref(), Some(QUANTITY));
}
