use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rusty_raman::data::discover::{is_spectrum_file, spectrum_files_in};
use rusty_raman::data::export::CombinedFormat;
use rusty_raman::data::filter::{
    filtered_indices, init_filter_state, select_files, unique_values, FilterState,
};
use rusty_raman::data::metadata::MetadataSource;
use rusty_raman::data::model::{MetadataValue, SAMPLE_DESCRIPTION};
use rusty_raman::{PipelineConfig, Session};

use crate::color::ColorMap;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Spectra,
    Analysis,
}

/// The full UI state, independent of rendering.
pub struct AppState {
    /// Pipeline session: parameters, combined dataset, last analysis.
    pub session: Session,

    /// Parameters as edited in the side panel; pushed to the session on run.
    pub params: PipelineConfig,

    /// Spectrum files picked by the user.
    pub spectrum_files: Vec<PathBuf>,

    /// Metadata table (Excel or CSV), or the tube composition table when a
    /// tube mapping is set.
    pub metadata_path: Option<PathBuf>,

    /// Spectrum → tube mapping joined with `metadata_path` on `Tube`.
    pub tube_mapping_path: Option<PathBuf>,

    pub active_tab: Tab,

    /// Files ticked for plotting.
    pub plotted_files: BTreeSet<String>,

    /// Per-column metadata filter selections.
    pub filters: FilterState,

    /// Indices of spectra passing file selection and filters (cached).
    pub visible_indices: Vec<usize>,

    /// Which metadata column is used for colouring (`None` = per file).
    pub color_column: Option<String>,

    /// Active colour map.
    pub color_map: Option<ColorMap>,

    /// Overlay raw intensity and fitted baseline instead of the corrected trace.
    pub show_baseline: bool,

    pub minmax_scaling: bool,

    /// Status / error message shown in the UI.
    pub status_message: Option<(String, bool)>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            session: Session::default(),
            params: PipelineConfig::default(),
            spectrum_files: Vec::new(),
            metadata_path: None,
            tube_mapping_path: None,
            active_tab: Tab::Spectra,
            plotted_files: BTreeSet::new(),
            filters: FilterState::default(),
            visible_indices: Vec::new(),
            color_column: None,
            color_map: None,
            show_baseline: false,
            minmax_scaling: false,
            status_message: None,
        }
    }
}

impl AppState {
    pub fn info(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::info!("{msg}");
        self.status_message = Some((msg, false));
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::error!("{msg}");
        self.status_message = Some((msg, true));
    }

    // ---- Inputs ----

    pub fn add_spectrum_files(&mut self, paths: Vec<PathBuf>) {
        for path in paths {
            if is_spectrum_file(&path) && !self.spectrum_files.contains(&path) {
                self.spectrum_files.push(path);
            }
        }
    }

    pub fn add_spectrum_folder(&mut self, dir: &Path) {
        match spectrum_files_in(dir) {
            Ok(files) => {
                let n = files.len();
                self.add_spectrum_files(files);
                self.info(format!("{n} spectrum file(s) found in {}", dir.display()));
            }
            Err(e) => self.error(format!("Error: {e}")),
        }
    }

    pub fn remove_spectrum_file(&mut self, idx: usize) {
        if idx < self.spectrum_files.len() {
            self.spectrum_files.remove(idx);
        }
    }

    // ---- Pipeline ----

    /// Assemble the picked files with the metadata table.
    pub fn assemble(&mut self) {
        let Some(metadata) = self.metadata_path.clone() else {
            self.error("Pick a metadata file first");
            return;
        };
        if self.spectrum_files.is_empty() {
            self.error("Add spectrum files first");
            return;
        }
        if let Err(e) = self.session.set_config(self.params.clone()) {
            self.error(format!("Error: {e}"));
            return;
        }
        let source = match self.tube_mapping_path.clone() {
            Some(mapping) => MetadataSource::composed(metadata, mapping),
            None => MetadataSource::from_path(metadata),
        };
        let files = self.spectrum_files.clone();
        match self.session.assemble(&files, &source) {
            Ok(summary) => {
                let mut msg = format!("Assembled {summary}");
                for skipped in &summary.skipped {
                    msg.push_str(&format!("\n  skipped {}: {}", skipped.path.display(), skipped.reason));
                }
                self.info(msg);
                self.on_dataset_changed();
            }
            Err(e) => self.error(format!("Error: {e}")),
        }
    }

    /// Reload a combined dataset exported earlier.
    pub fn load_combined(&mut self, path: &Path) {
        match self.session.load_combined(path) {
            Ok(ds) => {
                let msg = format!("Loaded {} spectra from {}", ds.len(), path.display());
                self.info(msg);
                self.on_dataset_changed();
            }
            Err(e) => self.error(format!("Error: {e}")),
        }
    }

    pub fn analyze(&mut self) {
        if let Err(e) = self.session.set_config(self.params.clone()) {
            self.error(format!("Error: {e}"));
            return;
        }
        match self.session.analyze() {
            Ok(result) => {
                let msg = format!(
                    "Analysis done: {} file(s), {} ratio(s)",
                    result.intensities.rows.len(),
                    result.ratios.rows.len()
                );
                self.info(msg);
                self.active_tab = Tab::Analysis;
            }
            Err(e) => self.error(format!("Error: {e}")),
        }
    }

    pub fn export_combined(&mut self, path: &Path) {
        let result = CombinedFormat::from_path(path)
            .and_then(|format| self.session.export_combined(path, format));
        match result {
            Ok(()) => self.info(format!("Combined dataset saved to {}", path.display())),
            Err(e) => self.error(format!("Export failed: {e}")),
        }
    }

    pub fn export_analysis(&mut self, path: &Path) {
        match self.session.export_analysis(path) {
            Ok(()) => self.info(format!("Analysis saved to {}", path.display())),
            Err(e) => self.error(format!("Export failed: {e}")),
        }
    }

    pub fn load_params(&mut self, path: &Path) {
        match PipelineConfig::from_file(path) {
            Ok(config) => {
                self.params = config;
                self.info(format!("Parameters loaded from {}", path.display()));
            }
            Err(e) => self.error(format!("Error: {e}")),
        }
    }

    pub fn save_params(&mut self, path: &Path) {
        let result = self
            .params
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        match result {
            Ok(()) => self.info(format!("Parameters saved to {}", path.display())),
            Err(e) => self.error(format!("Error: {e}")),
        }
    }

    // ---- Plot selection ----

    /// Reset plot selection, filters and colours for a new dataset.
    fn on_dataset_changed(&mut self) {
        let Some(ds) = self.session.combined() else {
            return;
        };
        self.plotted_files = ds.file_names().into_iter().collect();
        self.filters = init_filter_state(ds);
        self.color_column = ds
            .has_column(SAMPLE_DESCRIPTION)
            .then(|| SAMPLE_DESCRIPTION.to_string());
        self.rebuild_color_map();
        self.refilter();
    }

    /// Rebuild the colour map from the current `color_column`.
    pub fn rebuild_color_map(&mut self) {
        let Some(ds) = self.session.combined() else {
            self.color_map = None;
            return;
        };
        let values: BTreeSet<MetadataValue> = match &self.color_column {
            Some(col) => unique_values(ds).remove(col).unwrap_or_default(),
            None => ds
                .file_names()
                .into_iter()
                .map(MetadataValue::String)
                .collect(),
        };
        self.color_map = Some(ColorMap::new(self.color_column.as_deref(), &values));
    }

    /// Recompute `visible_indices` after a selection or filter change.
    pub fn refilter(&mut self) {
        let Some(ds) = self.session.combined() else {
            self.visible_indices.clear();
            return;
        };
        let files: Vec<&str> = self.plotted_files.iter().map(String::as_str).collect();
        let selected: BTreeSet<usize> = select_files(ds, &files).into_iter().collect();
        self.visible_indices = filtered_indices(ds, &self.filters)
            .into_iter()
            .filter(|i| selected.contains(i))
            .collect();
    }

    /// Set colour column and rebuild the map.
    pub fn set_color_column(&mut self, col: Option<String>) {
        self.color_column = col;
        self.rebuild_color_map();
    }

    pub fn toggle_plotted_file(&mut self, file: &str) {
        if !self.plotted_files.remove(file) {
            self.plotted_files.insert(file.to_string());
        }
        self.refilter();
    }

    pub fn plot_all_files(&mut self, plot: bool) {
        self.plotted_files.clear();
        if plot {
            if let Some(ds) = self.session.combined() {
                self.plotted_files = ds.file_names().into_iter().collect();
            }
        }
        self.refilter();
    }

    /// Select all values of a metadata column.
    pub fn select_all(&mut self, column: &str) {
        if let Some(ds) = self.session.combined() {
            if let Some(all_vals) = unique_values(ds).remove(column) {
                self.filters.insert(column.to_string(), all_vals);
                self.refilter();
            }
        }
    }

    /// Deselect all values in a column.
    pub fn select_none(&mut self, column: &str) {
        self.filters.insert(column.to_string(), BTreeSet::new());
        self.refilter();
    }
}
