use std::collections::{BTreeMap, BTreeSet};

use super::model::{CombinedDataset, MetadataValue};

/// `Sample description` of the blank-cuvette measurements dropped on assembly.
pub const BRB_SENTINEL: &str = "Cuvette BRB";

// ---------------------------------------------------------------------------
// Exclusion
// ---------------------------------------------------------------------------

/// Drop every spectrum whose `column` equals the text `value`.
///
/// A no-op when the dataset has no such column.
pub fn exclude_sample_description(
    mut dataset: CombinedDataset,
    column: &str,
    value: &str,
) -> CombinedDataset {
    if !dataset.has_column(column) {
        return dataset;
    }
    dataset.spectra.retain(|sp| {
        !matches!(sp.metadata.get(column), Some(MetadataValue::String(s)) if s == value)
    });
    dataset
}

// ---------------------------------------------------------------------------
// Plot selection
// ---------------------------------------------------------------------------

/// Indices of spectra whose file name is in `files`.
pub fn select_files<S: AsRef<str>>(dataset: &CombinedDataset, files: &[S]) -> Vec<usize> {
    let wanted: BTreeSet<&str> = files.iter().map(|f| f.as_ref()).collect();
    dataset
        .spectra
        .iter()
        .enumerate()
        .filter(|(_, sp)| wanted.contains(sp.spectrum.file()))
        .map(|(i, _)| i)
        .collect()
}

/// Per-column selection state: maps column_name → set of selected values.
/// A column absent from the map is not filtered.
pub type FilterState = BTreeMap<String, BTreeSet<MetadataValue>>;

/// For each metadata column the sorted set of values present in the dataset.
pub fn unique_values(dataset: &CombinedDataset) -> BTreeMap<String, BTreeSet<MetadataValue>> {
    let mut unique: BTreeMap<String, BTreeSet<MetadataValue>> = dataset
        .metadata_columns
        .iter()
        .map(|c| (c.clone(), BTreeSet::new()))
        .collect();
    for sp in &dataset.spectra {
        for col in &dataset.metadata_columns {
            unique
                .entry(col.clone())
                .or_default()
                .insert(sp.attribute(col).clone());
        }
    }
    unique
}

/// Initialise a [`FilterState`] with all values selected (i.e., show everything).
pub fn init_filter_state(dataset: &CombinedDataset) -> FilterState {
    unique_values(dataset)
}

/// Return indices of spectra that pass all active filters.
///
/// A spectrum passes a column filter when the column is absent from
/// `filters`, or its value for that column is in the selected set. An empty
/// set hides everything.
pub fn filtered_indices(dataset: &CombinedDataset, filters: &FilterState) -> Vec<usize> {
    dataset
        .spectra
        .iter()
        .enumerate()
        .filter(|(_, sp)| {
            filters
                .iter()
                .all(|(col, selected)| selected.contains(sp.attribute(col)))
        })
        .map(|(i, _)| i)
        .collect()
}
