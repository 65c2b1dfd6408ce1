use eframe::egui::Ui;
use egui_plot::{Bar, BarChart, Legend, Line, Plot, PlotPoints, Points};

use crate::color::{CategoryColors, SERIES_COLOR};
use crate::data::chart::ChartData;

// ---------------------------------------------------------------------------
// Chart rendering (visualization page)
// ---------------------------------------------------------------------------

/// Draw prepared chart data into the remaining space.
pub fn chart(ui: &mut Ui, data: &ChartData) {
    match data {
        ChartData::Line { column, segments } => {
            Plot::new("line_chart")
                .legend(Legend::default())
                .x_axis_label("row")
                .y_axis_label(column.as_str())
                .show(ui, |plot_ui| {
                    for segment in segments {
                        let points: PlotPoints = segment.iter().copied().collect();
                        plot_ui.line(
                            Line::new(points)
                                .name(column)
                                .color(SERIES_COLOR)
                                .width(1.5),
                        );
                    }
                });
        }
        ChartData::Bar { column, counts } => {
            let colors = CategoryColors::new(counts.iter().map(|(value, _)| value));
            let labels: Vec<String> = counts.iter().map(|(value, _)| value.to_string()).collect();
            let bars: Vec<Bar> = counts
                .iter()
                .enumerate()
                .map(|(i, (value, n))| {
                    Bar::new(i as f64, *n as f64)
                        .name(value.to_string())
                        .fill(colors.color_for(value))
                        .width(0.7)
                })
                .collect();

            Plot::new("bar_chart")
                .x_axis_label(column.as_str())
                .y_axis_label("count")
                .x_axis_formatter(move |mark, _range| {
                    // Only whole positions carry a bar.
                    let slot = mark.value.round();
                    if (mark.value - slot).abs() > 1e-6 || slot < 0.0 {
                        return String::new();
                    }
                    labels.get(slot as usize).cloned().unwrap_or_default()
                })
                .show(ui, |plot_ui| {
                    plot_ui.bar_chart(BarChart::new(bars));
                });
        }
        ChartData::Scatter { x, y, points } => {
            let plotted: PlotPoints = points.iter().copied().collect();
            Plot::new("scatter_chart")
                .legend(Legend::default())
                .x_axis_label(x.as_str())
                .y_axis_label(y.as_str())
                .show(ui, |plot_ui| {
                    plot_ui.points(
                        Points::new(plotted)
                            .name(format!("{y} vs {x}"))
                            .color(SERIES_COLOR)
                            .radius(2.5),
                    );
                });
        }
    }
}
