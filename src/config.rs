//! Pipeline parameters, optionally loaded from a JSON file.
//!
//! ```json
//! {
//!   "poly_order": 5,
//!   "tolerance": 2.0,
//!   "exclude_brb": true,
//!   "peak_set": "custom",
//!   "quantity_column": "n(EGTA) (mol)",
//!   "peak_sets": [{ "name": "custom", "peaks": [1000, 1100] }]
//! }
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::analysis::{AnalysisOptions, PeakSet, DEFAULT_TOLERANCE};
use crate::data::assemble::AssemblyOptions;
use crate::data::baseline::DEFAULT_POLY_ORDER;
use crate::error::{PipelineError, Result};

/// Highest accepted baseline order; beyond this the fit is numerically
/// meaningless on a single spectrum.
pub const MAX_POLY_ORDER: usize = 15;
pub const DEFAULT_PEAK_SET: &str = "532 nm";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub poly_order: usize,
    /// Half-width of the peak search window (cm⁻¹).
    pub tolerance: f64,
    /// Drop `Cuvette BRB` blanks on assembly.
    pub exclude_brb: bool,
    /// Name of the active peak set (built-in or from `peak_sets`).
    pub peak_set: String,
    /// Molar-quantity column for ratio plots; auto-detected when absent.
    pub quantity_column: Option<String>,
    /// User-defined peak sets, in addition to the built-in ones.
    pub peak_sets: Vec<PeakSet>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poly_order: DEFAULT_POLY_ORDER,
            tolerance: DEFAULT_TOLERANCE,
            exclude_brb: true,
            peak_set: DEFAULT_PEAK_SET.to_string(),
            quantity_column: None,
            peak_sets: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_json(&content)
            .map_err(|e| PipelineError::Configuration(format!("{}: {e}", path.display())))
    }

    /// Parse and validate a JSON configuration string.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(content)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poly_order > MAX_POLY_ORDER {
            return Err(PipelineError::Configuration(format!(
                "poly_order {} exceeds the maximum of {MAX_POLY_ORDER}",
                self.poly_order
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(PipelineError::Configuration(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        for set in &self.peak_sets {
            PeakSet::new(set.name.clone(), set.peaks.clone())?;
        }
        self.active_peak_set().map(|_| ())
    }

    /// Built-in sets followed by user-defined ones. A user set with the name
    /// of a built-in replaces it.
    pub fn available_peak_sets(&self) -> Vec<PeakSet> {
        let mut sets: Vec<PeakSet> = PeakSet::builtin()
            .into_iter()
            .filter(|b| !self.peak_sets.iter().any(|u| u.name == b.name))
            .collect();
        sets.extend(self.peak_sets.iter().cloned());
        sets
    }

    pub fn active_peak_set(&self) -> Result<PeakSet> {
        self.available_peak_sets()
            .into_iter()
            .find(|s| s.name == self.peak_set)
            .ok_or_else(|| {
                PipelineError::Configuration(format!("unknown peak set '{}'", self.peak_set))
            })
    }

    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            poly_order: self.poly_order,
            exclude_brb: self.exclude_brb,
        }
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            tolerance: self.tolerance,
            quantity_column: self.quantity_column.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.active_peak_set().unwrap().name, "532 nm");
    }

    #[test]
    fn test_custom_peak_set() {
        let config = PipelineConfig::from_json(
            r#"{"peak_set": "custom", "tolerance": 3.5,
                "peak_sets": [{"name": "custom", "peaks": [1000, 1100.5]}]}"#,
        )
        .unwrap();
        assert_eq!(config.active_peak_set().unwrap().peaks, vec![1000.0, 1100.5]);
        assert_eq!(config.available_peak_sets().len(), 3);
        assert_eq!(config.analysis_options().tolerance, 3.5);
    }

    #[test]
    fn test_non_numeric_peak_is_configuration_error() {
        let err = PipelineConfig::from_json(
            r#"{"peak_sets": [{"name": "bad", "peaks": [1000, "abc"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_validation() {
        for json in [
            r#"{"tolerance": -1}"#,
            r#"{"poly_order": 40}"#,
            r#"{"peak_set": "633 nm"}"#,
            r#"{"peak_sets": [{"name": "empty", "peaks": []}]}"#,
        ] {
            assert!(
                matches!(PipelineConfig::from_json(json), Err(PipelineError::Configuration(_))),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig {
            poly_order: 3,
            quantity_column: Some("n(EGTA) (mol)".into()),
            ..PipelineConfig::default()
        };
        let back = PipelineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
