use eframe::egui::{self, Align, Grid, Layout, ScrollArea, Ui};
use egui_extras::{Column as TableColumn, TableBuilder};

use crate::data::model::{Table, Value};

const ROW_HEIGHT: f32 = 18.0;

// ---------------------------------------------------------------------------
// Table view
// ---------------------------------------------------------------------------

/// Render a table with a row-number column. Only visible rows are laid out,
/// so large uploads stay responsive.
pub fn data_table(ui: &mut Ui, id: &str, table: &Table) {
    let (rows, cols) = table.shape();
    let names = table.column_names();
    let dtypes = table.dtypes();
    ui.weak(format!("{rows} rows × {cols} columns"));

    ui.push_id(id, |ui: &mut Ui| {
        ScrollArea::horizontal().show(ui, |ui: &mut Ui| {
            TableBuilder::new(ui)
                .striped(true)
                .resizable(true)
                .cell_layout(Layout::left_to_right(Align::Center))
                .column(TableColumn::auto())
                .columns(TableColumn::auto().at_least(60.0).clip(true), cols)
                .min_scrolled_height(0.0)
                .header(ROW_HEIGHT + 2.0, |mut header| {
                    header.col(|ui: &mut Ui| {
                        ui.strong("");
                    });
                    for (name, dtype) in names.iter().zip(&dtypes) {
                        header.col(|ui: &mut Ui| {
                            ui.strong(name).on_hover_text(dtype.to_string());
                        });
                    }
                })
                .body(|body| {
                    body.rows(ROW_HEIGHT, rows, |mut row| {
                        let index = row.index();
                        row.col(|ui: &mut Ui| {
                            ui.weak(index.to_string());
                        });
                        for column in 0..cols {
                            row.col(|ui: &mut Ui| {
                                ui.label(table.cell(index, column).to_string());
                            });
                        }
                    });
                });
        });
    });
}

/// Render labelled scalars as a two-column grid.
pub fn summary_list(ui: &mut Ui, id: &str, entries: &[(String, Value)]) {
    Grid::new(id)
        .striped(true)
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            for (label, value) in entries {
                ui.label(label);
                ui.label(egui::RichText::new(value.to_string()).monospace());
                ui.end_row();
            }
        });
}
