//! Data layer: core types, parsing, correction, assembly, analysis, export.
//!
//! Architecture:
//! ```text
//!   *.txt exports                 metadata .xlsx / .csv
//!        │                                │
//!        ▼                                ▼
//!   ┌──────────┐                   ┌──────────┐
//!   │ spectrum  │ parse → Raw       │ metadata  │ sniff / read → MetadataTable
//!   └──────────┘                   └──────────┘
//!        │                                │
//!        ▼                                │
//!   ┌──────────┐   (cache)                │
//!   │ baseline  │ modpoly → Corrected     │
//!   └──────────┘                          │
//!        │                                │
//!        ▼                                ▼
//!   ┌─────────────────────────────────────────┐
//!   │ assemble   left join + BRB filter        │ → CombinedDataset
//!   └─────────────────────────────────────────┘
//!        │                         │
//!        ▼                         ▼
//!   ┌──────────┐              ┌──────────┐
//!   │ analysis  │ peaks/ratios │  export   │ csv / xlsx / parquet
//!   └──────────┘              └──────────┘
//! ```

pub mod analysis;
pub mod assemble;
pub mod baseline;
pub mod cache;
pub mod discover;
pub mod export;
pub mod filter;
pub mod loader;
pub mod metadata;
pub mod model;
pub mod spectrum;
