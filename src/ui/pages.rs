use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};

use super::plot;
use super::table::{data_table, summary_list};
use super::widgets::{select_many, select_one};
use crate::config::AppConfig;
use crate::data::chart::{self, ChartKind};
use crate::data::model::Table;
use crate::data::olap::{self, AggFunc, OlapError, OlapOutput};
use crate::data::stats;
use crate::state::{AnalysisPanel, AppState, OlapKind, OlapPanel, Page, VizPanel};

const WARNING: Color32 = Color32::YELLOW;
const ERROR: Color32 = Color32::RED;

// ---------------------------------------------------------------------------
// Central panel – page router
// ---------------------------------------------------------------------------

/// Render the active page into the central panel.
pub fn central(ui: &mut Ui, state: &mut AppState, config: &AppConfig) {
    load_errors(ui, state);

    if state.page == Page::Log {
        log_page(ui, state);
        return;
    }
    if state.page == Page::Home {
        intro(ui, config);
    }

    let revision = state.registry.revision();
    let Some(name) = state.selected.clone() else {
        if state.page != Page::Home {
            ui.label("Upload a dataset to begin (File → Upload datasets…).");
        }
        return;
    };
    let Some(table) = state.registry.get(&name) else {
        return;
    };

    match state.page {
        Page::Home => home_page(ui, &name, table),
        Page::Visualization => visualization_page(ui, &name, revision, table, &mut state.viz),
        Page::Analysis => analysis_page(ui, &name, revision, table, &mut state.analysis),
        Page::Operations => operations_page(ui, &name, revision, table, &mut state.olap),
        Page::Log => {}
    }
}

fn load_errors(ui: &mut Ui, state: &mut AppState) {
    if state.errors.is_empty() {
        return;
    }
    for failure in &state.errors {
        ui.label(RichText::new(&failure.message).color(ERROR));
    }
    if ui.small_button("Dismiss").clicked() {
        state.dismiss_errors();
    }
    ui.separator();
}

// ---------------------------------------------------------------------------
// Home
// ---------------------------------------------------------------------------

fn intro(ui: &mut Ui, config: &AppConfig) {
    ui.heading(RichText::new(&config.title).size(28.0).strong());
    if !config.contributors.is_empty() {
        ui.strong("Project contributors:");
        for name in &config.contributors {
            ui.label(format!("• {name}"));
        }
    }
    ui.label("Upload datasets and navigate to other pages for analysis.");
    ui.separator();
}

fn home_page(ui: &mut Ui, name: &str, table: &Table) {
    ui.label(RichText::new(name).size(24.0).underline());
    data_table(ui, "home_table", table);
}

// ---------------------------------------------------------------------------
// Data visualization
// ---------------------------------------------------------------------------

fn visualization_page(ui: &mut Ui, name: &str, revision: u64, table: &Table, panel: &mut VizPanel) {
    ui.heading("Data Visualization");
    let columns = table.column_names();

    ui.horizontal(|ui: &mut Ui| {
        ui.label("Plot type");
        for kind in ChartKind::ALL {
            ui.selectable_value(&mut panel.kind, kind, kind.label());
        }
    });
    select_one(ui, "viz_column", "Column", &columns, &mut panel.column);
    if panel.kind == ChartKind::Scatter {
        select_one(ui, "viz_second", "Second column", &columns, &mut panel.second);
    }

    let Some(request) = panel.request() else {
        return;
    };
    let key = (name.to_string(), revision, request.clone());
    match panel.cache.get_or_compute(key, || chart::build(table, &request)) {
        Ok(data) => plot::chart(ui, data),
        Err(e) => {
            ui.label(RichText::new(format!("Error generating visualization: {e}")).color(ERROR));
        }
    }
}

// ---------------------------------------------------------------------------
// Data analysis
// ---------------------------------------------------------------------------

fn analysis_page(
    ui: &mut Ui,
    name: &str,
    revision: u64,
    table: &Table,
    panel: &mut AnalysisPanel,
) {
    ui.heading("Data Analysis");
    let columns = table.column_names();
    select_many(ui, "Columns for analysis", &columns, &mut panel.columns);
    if panel.columns.is_empty() {
        return;
    }

    let chosen = panel.columns.clone();
    let key = (name.to_string(), revision, chosen.clone());
    ui.strong("Descriptive Statistics");
    match panel.cache.get_or_compute(key, || stats::describe(table, &chosen)) {
        Ok(summary) => data_table(ui, "describe_table", summary),
        Err(e) => {
            ui.label(RichText::new(e.to_string()).color(ERROR));
        }
    }
}

// ---------------------------------------------------------------------------
// Data operations (OLAP)
// ---------------------------------------------------------------------------

fn operations_page(ui: &mut Ui, name: &str, revision: u64, table: &Table, panel: &mut OlapPanel) {
    ui.heading("Data Operations");
    let columns = table.column_names();

    ui.horizontal(|ui: &mut Ui| {
        ui.label("OLAP operation");
        for kind in OlapKind::ALL {
            ui.selectable_value(&mut panel.kind, kind, kind.label());
        }
    });

    let heading = match panel.kind {
        OlapKind::GroupBy => {
            select_many(ui, "Columns for grouping", &columns, &mut panel.group_columns);
            "Grouped Data:"
        }
        OlapKind::Aggregate => {
            if table.numeric_columns().is_empty() {
                ui.label(RichText::new(OlapError::NoNumericColumns.to_string()).color(WARNING));
                return;
            }
            ui.horizontal(|ui: &mut Ui| {
                ui.label("Aggregation function");
                egui::ComboBox::from_id_salt("agg_func")
                    .selected_text(panel.func.label())
                    .show_ui(ui, |ui: &mut Ui| {
                        for func in AggFunc::ALL {
                            ui.selectable_value(&mut panel.func, func, func.label());
                        }
                    });
            });
            "Aggregated Data:"
        }
        OlapKind::Slice => {
            select_one(ui, "slice_column", "Column for slicing", &columns, &mut panel.slice_column);
            ui.horizontal(|ui: &mut Ui| {
                ui.label("Value for slicing");
                ui.text_edit_singleline(&mut panel.slice_value);
            });
            "Sliced Data:"
        }
        OlapKind::Pivot => {
            select_one(ui, "pivot_index", "Index column", &columns, &mut panel.pivot_index);
            select_many(ui, "Pivot columns", &columns, &mut panel.pivot_columns);
            select_one(ui, "pivot_values", "Values column", &columns, &mut panel.pivot_values);
            "Pivoted Data (mean):"
        }
    };

    let Some(request) = panel.request() else {
        return;
    };
    let key = (name.to_string(), revision, request.clone());
    let result = panel.cache.get_or_compute(key, || olap::run(table, &request));

    ui.strong(heading);
    match result {
        Ok(OlapOutput::Table(out)) => data_table(ui, "olap_table", out),
        Ok(OlapOutput::Summary(entries)) => summary_list(ui, "olap_summary", entries),
        Err(OlapError::NoNumericColumns) => {
            ui.label(RichText::new(OlapError::NoNumericColumns.to_string()).color(WARNING));
        }
        Err(e) => {
            ui.label(RichText::new(e.to_string()).color(ERROR));
        }
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

fn log_page(ui: &mut Ui, state: &AppState) {
    ui.heading("Log Page");
    if state.log.is_empty() {
        ui.weak("Nothing has happened yet.");
        return;
    }
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for entry in state.log.entries() {
                ui.monospace(entry.to_string());
            }
        });
}
