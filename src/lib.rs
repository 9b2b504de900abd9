//! # rusty-raman
//!
//! Assembly and analysis pipeline for Raman spectra exported as instrument
//! text files.
//!
//! The pipeline is a set of plain synchronous functions that any front end
//! (the egui viewer, the `raman-batch` CLI, a script) can call:
//!
//! ```text
//!  *.txt ──► spectrum::parse_file ──► baseline::correct ─┐
//!                                                        ├─► assemble ──► CombinedDataset
//!  metadata (.xlsx/.csv) ──► metadata::load_metadata ────┘        │
//!                                                                 ├─► analysis::analyze ──► AnalysisResult
//!                                                                 └─► export::export_combined
//! ```
//!
//! [`session::Session`] ties the stages together and keeps the combined
//! dataset and the last analysis for the current user session.

pub mod config;
pub mod data;
pub mod error;
pub mod session;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use session::Session;
