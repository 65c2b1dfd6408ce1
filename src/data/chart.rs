use thiserror::Error;

use super::model::{DType, Table, TableError, Value};
use super::stats;

/// Chart kinds offered in the visualization page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    Bar,
    Scatter,
}

impl ChartKind {
    pub const ALL: [ChartKind; 3] = [ChartKind::Line, ChartKind::Bar, ChartKind::Scatter];

    pub fn label(self) -> &'static str {
        match self {
            ChartKind::Line => "Line Chart",
            ChartKind::Bar => "Bar Chart",
            ChartKind::Scatter => "Scatter Plot",
        }
    }
}

/// A chart to draw, carrying exactly the columns it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartRequest {
    Line { column: String },
    Bar { column: String },
    Scatter { x: String, y: String },
}

/// Plot-ready data derived from a table.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    /// `(row index, value)` runs; a missing value ends a run.
    Line {
        column: String,
        segments: Vec<Vec<[f64; 2]>>,
    },
    /// Distinct values with their frequency, most frequent first.
    Bar {
        column: String,
        counts: Vec<(Value, usize)>,
    },
    Scatter {
        x: String,
        y: String,
        points: Vec<[f64; 2]>,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChartError {
    #[error("column '{column}' is {dtype}; this chart needs a numeric column")]
    NotNumeric { column: String, dtype: DType },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// A numeric column read as `f64`, `None` marking missing cells.
fn numeric_column(table: &Table, name: &str) -> Result<Vec<Option<f64>>, ChartError> {
    let dtype = table.dtype(name)?;
    if !dtype.is_numeric() {
        return Err(ChartError::NotNumeric {
            column: name.to_string(),
            dtype,
        });
    }
    Ok(table.numbers(name)?)
}

/// Derive the data for `request` from `table`.
pub fn build(table: &Table, request: &ChartRequest) -> Result<ChartData, ChartError> {
    match request {
        ChartRequest::Line { column } => {
            let source = numeric_column(table, column)?;
            Ok(ChartData::Line {
                column: column.clone(),
                segments: line_segments(&source),
            })
        }
        ChartRequest::Bar { column } => Ok(ChartData::Bar {
            column: column.clone(),
            counts: stats::value_counts(table, column)?,
        }),
        ChartRequest::Scatter { x, y } => {
            let xs = numeric_column(table, x)?;
            let ys = numeric_column(table, y)?;
            let points = xs
                .into_iter()
                .zip(ys)
                .filter_map(|(a, b)| Some([a?, b?]))
                .collect();
            Ok(ChartData::Scatter {
                x: x.clone(),
                y: y.clone(),
                points,
            })
        }
    }
}

fn line_segments(values: &[Option<f64>]) -> Vec<Vec<[f64; 2]>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    for (row, value) in values.iter().enumerate() {
        match value {
            Some(v) => current.push([row as f64, *v]),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}
