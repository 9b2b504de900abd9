use eframe::egui;

use crate::state::{AppState, Tab};
use crate::ui::{analysis, panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RustyRamanApp {
    pub state: AppState,
}

impl eframe::App for RustyRamanApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            panels::status_bar(ui, &self.state);
        });

        // ---- Left side panel: inputs, parameters, filters ----
        egui::SidePanel::left("side_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel ----
        egui::CentralPanel::default().show(ctx, |ui| match self.state.active_tab {
            Tab::Spectra => plot::spectral_plot(ui, &self.state),
            Tab::Analysis => analysis::analysis_view(ui, &self.state),
        });
    }
}
