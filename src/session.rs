use std::path::{Path, PathBuf};

use log::info;

use crate::config::PipelineConfig;
use crate::data::analysis::{self, AnalysisResult, PeakSet};
use crate::data::assemble::{assemble_with, AssemblySummary};
use crate::data::cache::SpectrumCache;
use crate::data::export::{self, CombinedFormat};
use crate::data::loader;
use crate::data::metadata::{load_metadata, MetadataSource};
use crate::data::model::CombinedDataset;
use crate::error::{PipelineError, Result};

/// Everything one user works on between launches: parameters, the combined
/// dataset and the last analysis.
///
/// Front ends own a `Session` and call its methods; failures leave the
/// previously assembled dataset and analysis in place.
#[derive(Default)]
pub struct Session {
    config: PipelineConfig,
    cache: SpectrumCache,
    combined: Option<CombinedDataset>,
    summary: Option<AssemblySummary>,
    analysis: Option<AnalysisResult>,
}

impl Session {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the parameters after validating them.
    pub fn set_config(&mut self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn combined(&self) -> Option<&CombinedDataset> {
        self.combined.as_ref()
    }

    pub fn summary(&self) -> Option<&AssemblySummary> {
        self.summary.as_ref()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn cache(&self) -> &SpectrumCache {
        &self.cache
    }

    /// Build the combined dataset from spectrum files and a metadata source.
    /// Unchanged files are served from the spectrum cache; cached spectra of
    /// files not in `paths` are dropped.
    pub fn assemble(&mut self, paths: &[PathBuf], metadata: &MetadataSource) -> Result<&AssemblySummary> {
        let table = load_metadata(metadata)?;
        let options = self.config.assembly_options();
        let cache = &mut self.cache;
        cache.retain_paths(paths);
        let assembly = assemble_with(paths, &table, &options, |path, order| {
            cache.get_or_load(path, order)
        })?;

        self.combined = Some(assembly.dataset);
        self.analysis = None;
        Ok(&*self.summary.insert(assembly.summary))
    }

    /// Replace the combined dataset with one reloaded from an export.
    pub fn load_combined(&mut self, path: &Path) -> Result<&CombinedDataset> {
        let dataset = loader::load_file(path)?;
        self.summary = Some(AssemblySummary {
            rows: dataset.row_count(),
            columns: dataset.column_count(),
            spectra: dataset.len(),
            ..AssemblySummary::default()
        });
        self.analysis = None;
        Ok(&*self.combined.insert(dataset))
    }

    /// Run the peak analysis with the configured peak set and tolerance.
    pub fn analyze(&mut self) -> Result<&AnalysisResult> {
        let peak_set = self.config.active_peak_set()?;
        self.analyze_with(&peak_set)
    }

    /// Run the peak analysis with an explicit peak set.
    pub fn analyze_with(&mut self, peak_set: &PeakSet) -> Result<&AnalysisResult> {
        let dataset = self.require_combined()?;
        let result = analysis::analyze(dataset, peak_set, &self.config.analysis_options())?;
        Ok(&*self.analysis.insert(result))
    }

    pub fn export_combined(&self, path: &Path, format: CombinedFormat) -> Result<()> {
        export::export_combined(self.require_combined()?, path, format)
    }

    pub fn export_analysis(&self, path: &Path) -> Result<()> {
        let result = self.analysis.as_ref().ok_or_else(|| {
            PipelineError::Assembly("run the analysis before exporting its results".into())
        })?;
        export::export_analysis(result, path)
    }

    /// Forget the dataset, the analysis and the cached spectra.
    pub fn clear(&mut self) {
        self.combined = None;
        self.summary = None;
        self.analysis = None;
        self.cache.clear();
        info!("Session cleared");
    }

    fn require_combined(&self) -> Result<&CombinedDataset> {
        self.combined
            .as_ref()
            .ok_or_else(|| PipelineError::Assembly("no combined dataset; assemble spectra first".into()))
    }
}
