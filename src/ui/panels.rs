use eframe::egui::{self, ComboBox, RichText, Ui};

use crate::data::loader::{display_name, Upload, SUPPORTED_EXTENSIONS};
use crate::state::{AppState, Page};

// ---------------------------------------------------------------------------
// Left side panel – dataset and page selectors
// ---------------------------------------------------------------------------

/// Render the left navigation panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Dataset");
    ui.separator();

    if state.registry.is_empty() {
        ui.label("No dataset loaded.");
    } else {
        let names: Vec<String> = state.registry.names().map(str::to_string).collect();
        let current = state.selected.clone().unwrap_or_default();
        let mut picked = None;
        ComboBox::from_id_salt("dataset_selector")
            .selected_text(&current)
            .width(ui.available_width())
            .show_ui(ui, |ui: &mut Ui| {
                for name in &names {
                    if ui.selectable_label(current == *name, name).clicked() {
                        picked = Some(name.clone());
                    }
                }
            });
        if let Some(name) = picked {
            state.select_dataset(&name);
        }

        if let Some((_, table)) = state.current() {
            let (rows, cols) = table.shape();
            ui.weak(format!("{rows} rows, {cols} columns"));
        }
    }

    ui.add_space(8.0);
    ui.heading("Page");
    ui.separator();
    for page in Page::ALL {
        ui.radio_value(&mut state.page, page, page.label());
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Upload datasets…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();
        ui.label(format!("{} datasets loaded", state.registry.len()));

        if !state.errors.is_empty() {
            ui.separator();
            let failed: Vec<&str> = state.errors.iter().map(|f| f.name.as_str()).collect();
            ui.label(
                RichText::new(format!("{} upload errors", state.errors.len()))
                    .color(egui::Color32::RED),
            )
            .on_hover_text(failed.join(", "));
        }
    });
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let files = rfd::FileDialog::new()
        .set_title("Upload datasets")
        .add_filter("Supported files", SUPPORTED_EXTENSIONS)
        .add_filter("CSV", &["csv"])
        .add_filter("Excel", &["xlsx"])
        .add_filter("JSON", &["json"])
        .add_filter("Parquet", &["parquet", "pq"])
        .pick_files();

    let Some(paths) = files else {
        return;
    };

    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        match Upload::from_path(&path) {
            Ok(upload) => uploads.push(upload),
            Err(e) => state.report_unreadable(&display_name(&path), &e),
        }
    }
    state.ingest(uploads);
}

/// Upload files dropped onto the window as one batch.
pub fn handle_dropped_files(ctx: &egui::Context, state: &mut AppState) {
    let dropped = ctx.input(|i| i.raw.dropped_files.clone());
    if dropped.is_empty() {
        return;
    }

    let mut uploads = Vec::with_capacity(dropped.len());
    for file in dropped {
        // Native builds hand over a path; web builds hand over the bytes.
        if let Some(bytes) = file.bytes {
            uploads.push(Upload::new(file.name, bytes.to_vec()));
        } else if let Some(path) = file.path {
            match Upload::from_path(&path) {
                Ok(upload) => uploads.push(upload),
                Err(e) => state.report_unreadable(&display_name(&path), &e),
            }
        }
    }
    state.ingest(uploads);
}
