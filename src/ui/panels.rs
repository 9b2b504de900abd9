use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use rusty_raman::config::MAX_POLY_ORDER;
use rusty_raman::data::filter::unique_values;

use crate::state::{AppState, Tab};

// ---------------------------------------------------------------------------
// Left side panel – inputs, parameters, filters
// ---------------------------------------------------------------------------

/// Render the left panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            inputs_section(ui, state);
            ui.separator();
            parameters_section(ui, state);
            ui.separator();
            files_section(ui, state);
            ui.separator();
            filters_section(ui, state);
        });
}

fn inputs_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Inputs");

    ui.horizontal(|ui: &mut Ui| {
        if ui.button("Add spectra…").clicked() {
            if let Some(paths) = rfd::FileDialog::new()
                .set_title("Pick spectrum files")
                .add_filter("Spectra", &["txt"])
                .pick_files()
            {
                state.add_spectrum_files(paths);
            }
        }
        if ui.button("Add folder…").clicked() {
            if let Some(dir) = rfd::FileDialog::new().pick_folder() {
                state.add_spectrum_folder(&dir);
            }
        }
    });

    let mut remove = None;
    egui::CollapsingHeader::new(format!("Spectrum files ({})", state.spectrum_files.len()))
        .id_salt("spectrum_files")
        .default_open(false)
        .show(ui, |ui: &mut Ui| {
            for (i, path) in state.spectrum_files.iter().enumerate() {
                ui.horizontal(|ui: &mut Ui| {
                    if ui.small_button("✖").clicked() {
                        remove = Some(i);
                    }
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    ui.label(name).on_hover_text(path.display().to_string());
                });
            }
        });
    if let Some(i) = remove {
        state.remove_spectrum_file(i);
    }

    ui.horizontal(|ui: &mut Ui| {
        if ui.button("Metadata…").clicked() {
            if let Some(path) = rfd::FileDialog::new()
                .set_title("Pick the metadata table")
                .add_filter("Metadata", &["xlsx", "xls", "csv", "tsv", "txt"])
                .pick_file()
            {
                state.metadata_path = Some(path);
            }
        }
        match &state.metadata_path {
            Some(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                ui.label(name).on_hover_text(path.display().to_string());
            }
            None => {
                ui.weak("none");
            }
        }
    });

    ui.horizontal(|ui: &mut Ui| {
        if ui
            .button("Tube mapping…")
            .on_hover_text("Spectrum → tube table; the metadata file is then the tube composition table")
            .clicked()
        {
            if let Some(path) = rfd::FileDialog::new()
                .set_title("Pick the spectrum/tube mapping")
                .add_filter("Metadata", &["xlsx", "xls", "csv", "tsv", "txt"])
                .pick_file()
            {
                state.tube_mapping_path = Some(path);
            }
        }
        let mut clear = false;
        match &state.tube_mapping_path {
            Some(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                ui.label(name).on_hover_text(path.display().to_string());
                clear = ui.small_button("✖").clicked();
            }
            None => {
                ui.weak("none");
            }
        }
        if clear {
            state.tube_mapping_path = None;
        }
    });

    ui.horizontal(|ui: &mut Ui| {
        if ui.button("▶ Assemble").clicked() {
            state.assemble();
        }
        let can_analyze = state.session.combined().is_some();
        if ui
            .add_enabled(can_analyze, egui::Button::new("Analyze"))
            .clicked()
        {
            state.analyze();
        }
    });
}

fn parameters_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Parameters");

    egui::Grid::new("params_grid")
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            ui.label("Polynomial order");
            ui.add(egui::DragValue::new(&mut state.params.poly_order).range(0..=MAX_POLY_ORDER));
            ui.end_row();

            ui.label("Peak tolerance (cm⁻¹)");
            ui.add(
                egui::DragValue::new(&mut state.params.tolerance)
                    .range(0.0..=50.0)
                    .speed(0.1),
            );
            ui.end_row();

            ui.label("Peak set");
            let sets = state.params.available_peak_sets();
            egui::ComboBox::from_id_salt("peak_set")
                .selected_text(&state.params.peak_set)
                .show_ui(ui, |ui: &mut Ui| {
                    for set in &sets {
                        ui.selectable_value(&mut state.params.peak_set, set.name.clone(), &set.name)
                            .on_hover_text(set.to_string());
                    }
                });
            ui.end_row();
        });

    ui.checkbox(&mut state.params.exclude_brb, "Exclude Cuvette BRB blanks");
}

fn files_section(ui: &mut Ui, state: &mut AppState) {
    let Some(ds) = state.session.combined() else {
        return;
    };
    let files = ds.file_names();

    ui.heading("Plotted files");
    ui.horizontal(|ui: &mut Ui| {
        if ui.small_button("All").clicked() {
            state.plot_all_files(true);
        }
        if ui.small_button("None").clicked() {
            state.plot_all_files(false);
        }
    });

    egui::CollapsingHeader::new(format!("{}/{} files", state.plotted_files.len(), files.len()))
        .id_salt("plotted_files")
        .default_open(true)
        .show(ui, |ui: &mut Ui| {
            for file in &files {
                let mut checked = state.plotted_files.contains(file);
                if ui.checkbox(&mut checked, file).changed() {
                    state.toggle_plotted_file(file);
                }
            }
        });
}

fn filters_section(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Filters");

    let Some(ds) = state.session.combined() else {
        ui.label("No dataset assembled.");
        return;
    };

    let columns = ds.metadata_columns.clone();
    let unique = unique_values(ds);

    // ---- Colour-by selector ----
    ui.strong("Color by");
    let current = state
        .color_column
        .clone()
        .unwrap_or_else(|| "file".to_string());
    egui::ComboBox::from_id_salt("color_by")
        .selected_text(&current)
        .show_ui(ui, |ui: &mut Ui| {
            if ui.selectable_label(state.color_column.is_none(), "file").clicked() {
                state.set_color_column(None);
            }
            for col in &columns {
                if ui
                    .selectable_label(state.color_column.as_deref() == Some(col), col)
                    .clicked()
                {
                    state.set_color_column(Some(col.clone()));
                }
            }
        });
    if let Some(cm) = &state.color_map {
        egui::CollapsingHeader::new("Legend")
            .id_salt("legend")
            .show(ui, |ui: &mut Ui| {
                for (label, color) in cm.legend_entries() {
                    ui.colored_label(color, format!("■ {label}"));
                }
            });
    }
    ui.separator();

    let mut changed = false;

    // ---- Per-column filter widgets (collapsible) ----
    for col in &columns {
        let Some(all_values) = unique.get(col) else {
            continue;
        };

        let n_selected = state.filters.get(col).map_or(all_values.len(), |s| s.len());
        let header_text = format!("{col}  ({n_selected}/{})", all_values.len());

        egui::CollapsingHeader::new(RichText::new(header_text).strong())
            .id_salt(col)
            .default_open(false)
            .show(ui, |ui: &mut Ui| {
                ui.horizontal(|ui: &mut Ui| {
                    if ui.small_button("All").clicked() {
                        state.select_all(col);
                    }
                    if ui.small_button("None").clicked() {
                        state.select_none(col);
                    }
                });

                let swatches = if state.color_column.as_deref() == Some(col.as_str()) {
                    state.color_map.clone()
                } else {
                    None
                };
                let selected = state.filters.entry(col.clone()).or_default();

                for val in all_values {
                    let mut text = RichText::new(val.to_string());
                    if let Some(cm) = &swatches {
                        text = text.color(cm.color_for(val));
                    }

                    let mut checked = selected.contains(val);
                    if ui.checkbox(&mut checked, text).changed() {
                        if checked {
                            selected.insert(val.clone());
                        } else {
                            selected.remove(val);
                        }
                        changed = true;
                    }
                }
            });
    }

    if changed {
        state.refilter();
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open combined dataset…").clicked() {
                open_combined_dialog(state);
                ui.close_menu();
            }
            ui.separator();
            if ui.button("Export combined dataset…").clicked() {
                export_combined_dialog(state);
                ui.close_menu();
            }
            if ui.button("Export analysis…").clicked() {
                export_analysis_dialog(state);
                ui.close_menu();
            }
            ui.separator();
            if ui.button("Load parameters…").clicked() {
                if let Some(path) = json_dialog().pick_file() {
                    state.load_params(&path);
                }
                ui.close_menu();
            }
            if ui.button("Save parameters…").clicked() {
                if let Some(path) = json_dialog().set_file_name("raman_params.json").save_file() {
                    state.save_params(&path);
                }
                ui.close_menu();
            }
            ui.separator();
            if ui.button("Clear session").clicked() {
                state.session.clear();
                state.refilter();
                state.color_map = None;
                state.info("Session cleared");
                ui.close_menu();
            }
        });

        ui.separator();
        ui.selectable_value(&mut state.active_tab, Tab::Spectra, "Spectra");
        ui.selectable_value(&mut state.active_tab, Tab::Analysis, "Analysis");
        ui.separator();

        if let Some(ds) = state.session.combined() {
            ui.label(format!(
                "{} spectra, {} visible",
                ds.len(),
                state.visible_indices.len()
            ));
            ui.separator();
        }

        if state.active_tab == Tab::Spectra {
            ui.toggle_value(&mut state.show_baseline, "Raw + baseline");
            ui.toggle_value(&mut state.minmax_scaling, "Min-Max Scaling");
        }
    });
}

/// Status line at the bottom of the window.
pub fn status_bar(ui: &mut Ui, state: &AppState) {
    match &state.status_message {
        Some((msg, true)) => {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
        Some((msg, false)) => {
            ui.label(msg);
        }
        None => {
            ui.weak("Add spectra and a metadata table, then Assemble.");
        }
    }
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

fn json_dialog() -> rfd::FileDialog {
    rfd::FileDialog::new().add_filter("JSON", &["json"])
}

pub fn open_combined_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open combined dataset")
        .add_filter("Supported files", &["parquet", "pq", "csv"])
        .add_filter("Parquet", &["parquet", "pq"])
        .add_filter("CSV", &["csv"])
        .pick_file();

    if let Some(path) = file {
        state.load_combined(&path);
    }
}

pub fn export_combined_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Export combined dataset")
        .set_file_name("combined.csv")
        .add_filter("CSV", &["csv"])
        .add_filter("Excel", &["xlsx"])
        .add_filter("Parquet", &["parquet"])
        .save_file();

    if let Some(path) = file {
        state.export_combined(&path);
    }
}

pub fn export_analysis_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Export analysis")
        .set_file_name("analysis.xlsx")
        .add_filter("Excel", &["xlsx"])
        .save_file();

    if let Some(path) = file {
        state.export_analysis(&path);
    }
}
