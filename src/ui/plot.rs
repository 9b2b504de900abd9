use std::collections::BTreeMap;

use eframe::egui::{Color32, Ui};
use egui_plot::{Legend, Line, Plot, PlotPoints, Points};

use rusty_raman::data::analysis::AnalysisResult;
use rusty_raman::data::model::{CombinedSpectrum, MetadataValue};

use crate::color::{generate_palette, ColorMap};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Spectral plot (central panel)
// ---------------------------------------------------------------------------

fn minmax(y: &[f64]) -> Vec<f64> {
    let min = y.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = y.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range.abs() < f64::EPSILON {
        vec![0.0; y.len()]
    } else {
        y.iter().map(|&yi| (yi - min) / range).collect()
    }
}

fn points(x: &[f64], y: &[f64]) -> PlotPoints<'static> {
    x.iter().zip(y).map(|(&xi, &yi)| [xi, yi]).collect()
}

fn spectrum_color(sp: &CombinedSpectrum, color_map: Option<&ColorMap>) -> Color32 {
    let Some(cm) = color_map else {
        return Color32::LIGHT_BLUE;
    };
    match &cm.column {
        Some(col) => cm.color_for(sp.attribute(col)),
        None => cm.color_for(&MetadataValue::String(sp.spectrum.file().to_string())),
    }
}

/// Render the corrected spectra (or raw intensity with its baseline).
pub fn spectral_plot(ui: &mut Ui, state: &AppState) {
    let Some(dataset) = state.session.combined() else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Add spectra and a metadata table, then press Assemble");
        });
        return;
    };

    let color_map = state.color_map.as_ref();
    let y_label = if state.show_baseline {
        "Dark Subtracted #1"
    } else {
        "Intensity_corrected"
    };

    Plot::new("spectral_plot")
        .legend(Legend::default())
        .x_axis_label("Raman Shift (cm⁻¹)")
        .y_axis_label(y_label)
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for &idx in &state.visible_indices {
                let sp = &dataset.spectra[idx];
                let spectrum = &sp.spectrum;
                let color = spectrum_color(sp, color_map);

                // Legend groups by the colour key so one entry covers a group.
                let name = match color_map.and_then(|cm| cm.column.as_deref()) {
                    Some(col) => sp.attribute(col).to_string(),
                    None => spectrum.file().to_string(),
                };

                if state.show_baseline {
                    let (raw, baseline) = if state.minmax_scaling {
                        (minmax(&spectrum.raw.intensity), minmax(&spectrum.baseline))
                    } else {
                        (spectrum.raw.intensity.clone(), spectrum.baseline.clone())
                    };
                    plot_ui.line(
                        Line::new(points(&spectrum.raw.raman_shift, &raw))
                            .name(&name)
                            .color(color)
                            .width(1.5),
                    );
                    plot_ui.line(
                        Line::new(points(&spectrum.raw.raman_shift, &baseline))
                            .name(&name)
                            .color(color.gamma_multiply(0.6))
                            .style(egui_plot::LineStyle::dashed_loose())
                            .width(1.0),
                    );
                } else {
                    let y = if state.minmax_scaling {
                        minmax(&spectrum.corrected)
                    } else {
                        spectrum.corrected.clone()
                    };
                    plot_ui.line(
                        Line::new(points(&spectrum.raw.raman_shift, &y))
                            .name(&name)
                            .color(color)
                            .width(1.5),
                    );
                }
            }
        });
}

// ---------------------------------------------------------------------------
// Ratio plot (analysis tab)
// ---------------------------------------------------------------------------

/// Scatter each peak ratio against the molar quantity column.
pub fn ratio_plot(ui: &mut Ui, result: &AnalysisResult) {
    let Some(quantity) = result.quantity_column.as_deref() else {
        ui.label("No molar quantity column found; ratio plot unavailable.");
        return;
    };

    // ratio label → [(quantity, value)], in peak-set order
    let mut series: BTreeMap<(usize, usize), (String, Vec<[f64; 2]>)> = BTreeMap::new();
    let position = |peak: f64| result.peak_set.peaks.iter().position(|&p| p == peak);
    for row in &result.ratios.rows {
        let Some(x) = row.attributes.get(quantity).and_then(MetadataValue::as_f64) else {
            continue;
        };
        let (Some(i), Some(j)) = (position(row.numerator), position(row.denominator)) else {
            continue;
        };
        series
            .entry((i, j))
            .or_insert_with(|| (row.label(), Vec::new()))
            .1
            .push([x, row.value]);
    }

    if series.is_empty() {
        ui.label("No ratio has a numeric molar quantity.");
        return;
    }

    let palette = generate_palette(series.len());
    Plot::new("ratio_plot")
        .legend(Legend::default())
        .x_axis_label(quantity)
        .y_axis_label("Intensity ratio")
        .show(ui, |plot_ui| {
            for ((label, mut pts), color) in series.into_values().zip(palette) {
                pts.sort_by(|a, b| a[0].total_cmp(&b[0]));
                plot_ui.points(
                    Points::new(PlotPoints::from(pts.clone()))
                        .name(&label)
                        .color(color)
                        .radius(3.0),
                );
                plot_ui.line(Line::new(PlotPoints::from(pts)).name(&label).color(color));
            }
        });
}
