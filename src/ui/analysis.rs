use eframe::egui::{self, Ui};
use egui_extras::{Column, TableBuilder};

use rusty_raman::data::analysis::{intensity_label, AnalysisResult};

use crate::state::AppState;
use crate::ui::plot;

/// Render the analysis tab: ratio plot on top, intensity table below.
pub fn analysis_view(ui: &mut Ui, state: &AppState) {
    let Some(result) = state.session.analysis() else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("Assemble spectra, then press Analyze");
        });
        return;
    };

    ui.label(format!(
        "Peak set {} – tolerance ±{} cm⁻¹",
        result.peak_set, result.tolerance
    ));

    let plot_height = ui.available_height() * 0.55;
    ui.allocate_ui(egui::vec2(ui.available_width(), plot_height), |ui: &mut Ui| {
        plot::ratio_plot(ui, result);
    });
    ui.separator();
    intensity_table(ui, result);
}

fn intensity_table(ui: &mut Ui, result: &AnalysisResult) {
    let table = &result.intensities;

    egui::ScrollArea::horizontal().show(ui, |ui: &mut Ui| {
        TableBuilder::new(ui)
            .striped(true)
            .resizable(true)
            .column(Column::auto().at_least(120.0))
            .columns(Column::auto().at_least(70.0), table.peaks.len())
            .header(20.0, |mut header| {
                header.col(|ui: &mut Ui| {
                    ui.strong("file");
                });
                for &peak in &table.peaks {
                    header.col(|ui: &mut Ui| {
                        ui.strong(intensity_label(peak));
                    });
                }
            })
            .body(|body| {
                body.rows(18.0, table.rows.len(), |mut row| {
                    let r = &table.rows[row.index()];
                    row.col(|ui: &mut Ui| {
                        ui.label(&r.file);
                    });
                    for value in &r.intensities {
                        row.col(|ui: &mut Ui| {
                            match value {
                                Some(v) => ui.label(format!("{v:.2}")),
                                None => ui.weak("–"),
                            };
                        });
                    }
                });
            });
    });
}
