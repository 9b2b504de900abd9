use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

use rusty_raman::data::model::MetadataValue;

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color32::from_rgb(
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Color mapping: legend key → Color32
// ---------------------------------------------------------------------------

/// Maps the distinct values of the colour-by key (a metadata column, or the
/// file name when no column is chosen) to distinct colours.
#[derive(Debug, Clone)]
pub struct ColorMap {
    /// Column the colours come from; `None` means one colour per file.
    pub column: Option<String>,
    mapping: BTreeMap<MetadataValue, Color32>,
    default_color: Color32,
}

impl ColorMap {
    pub fn new(column: Option<&str>, values: &BTreeSet<MetadataValue>) -> Self {
        let palette = generate_palette(values.len());
        let mapping = values.iter().cloned().zip(palette).collect();
        ColorMap {
            column: column.map(str::to_string),
            mapping,
            default_color: Color32::GRAY,
        }
    }

    /// Look up the colour for a given key value.
    pub fn color_for(&self, value: &MetadataValue) -> Color32 {
        self.mapping
            .get(value)
            .copied()
            .unwrap_or(self.default_color)
    }

    /// Return the legend entries (value label → colour) for the UI.
    pub fn legend_entries(&self) -> Vec<(String, Color32)> {
        self.mapping
            .iter()
            .map(|(v, c)| (v.to_string(), *c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_is_distinct() {
        let colors = generate_palette(5);
        assert_eq!(colors.len(), 5);
        let unique: BTreeSet<[u8; 4]> = colors.iter().map(|c| c.to_array()).collect();
        assert_eq!(unique.len(), 5);
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn test_unknown_value_gets_default() {
        let values: BTreeSet<MetadataValue> =
            [MetadataValue::String("a".into())].into_iter().collect();
        let map = ColorMap::new(Some("Sample description"), &values);
        assert_eq!(map.color_for(&MetadataValue::String("zzz".into())), Color32::GRAY);
        assert_ne!(map.color_for(&MetadataValue::String("a".into())), Color32::GRAY);
        assert_eq!(map.legend_entries().len(), 1);
    }
}
