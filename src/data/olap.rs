use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

use super::model::{
    date_to_days, datetime_to_timestamp, dedupe_names, fresh_name, parse_datetime, DType, Table,
    TableError, Value,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Aggregation applied to every numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Mean,
    Median,
    Sum,
    Count,
}

impl AggFunc {
    pub const ALL: [AggFunc; 4] = [AggFunc::Mean, AggFunc::Median, AggFunc::Sum, AggFunc::Count];

    pub fn label(self) -> &'static str {
        match self {
            AggFunc::Mean => "mean",
            AggFunc::Median => "median",
            AggFunc::Sum => "sum",
            AggFunc::Count => "count",
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One OLAP operation together with exactly the inputs it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum OlapRequest {
    GroupBy {
        columns: Vec<String>,
    },
    Aggregate {
        func: AggFunc,
    },
    Slice {
        column: String,
        value: String,
    },
    Pivot {
        index: String,
        columns: Vec<String>,
        values: String,
    },
}

/// Result of an OLAP operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OlapOutput {
    Table(Table),
    /// Labelled scalars, e.g. `price_mean → 4.2`.
    Summary(Vec<(String, Value)>),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OlapError {
    #[error("No numeric columns found for aggregation.")]
    NoNumericColumns,
    #[error("select at least one column to group by")]
    NoGroupColumns,
    #[error("values column '{column}' is {dtype}, expected a numeric column")]
    NonNumericValues { column: String, dtype: DType },
    #[error("values column '{0}' is also used as index or pivot column")]
    ValuesColumnReused(String),
    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<PolarsError> for OlapError {
    fn from(err: PolarsError) -> Self {
        OlapError::Table(err.into())
    }
}

/// Run one OLAP request against a table. The source table is never modified.
pub fn run(table: &Table, request: &OlapRequest) -> Result<OlapOutput, OlapError> {
    match request {
        OlapRequest::GroupBy { columns } => group_by_count(table, columns).map(OlapOutput::Table),
        OlapRequest::Aggregate { func } => aggregate(table, *func).map(OlapOutput::Summary),
        OlapRequest::Slice { column, value } => slice(table, column, value).map(OlapOutput::Table),
        OlapRequest::Pivot {
            index,
            columns,
            values,
        } => pivot_mean(table, index, columns, values).map(OlapOutput::Table),
    }
}

// ---------------------------------------------------------------------------
// Group by
// ---------------------------------------------------------------------------

/// Name of the row-count column produced by [`group_by_count`].
pub const COUNT_COLUMN: &str = "Count";

/// Rows where every one of `columns` holds a value.
fn all_present(columns: &[String]) -> Expr {
    columns
        .iter()
        .map(|name| col(name.as_str()).is_not_null())
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true))
}

fn key_exprs(columns: &[String]) -> Vec<Expr> {
    columns.iter().map(|name| col(name.as_str())).collect()
}

/// Count rows per distinct combination of the grouping columns.
///
/// Rows with a missing value in any grouping column are dropped. Groups come
/// out in ascending key order.
pub fn group_by_count(table: &Table, columns: &[String]) -> Result<Table, OlapError> {
    if columns.is_empty() {
        return Err(OlapError::NoGroupColumns);
    }
    for name in columns {
        table.series(name)?;
    }
    let count_name = fresh_name(columns, COUNT_COLUMN);

    let grouped = table
        .lazy()
        .filter(all_present(columns))
        .group_by(key_exprs(columns))
        .agg([len().cast(DataType::Int64).alias(count_name.as_str())])
        .sort_by_exprs(key_exprs(columns), SortMultipleOptions::default())
        .collect()?;
    Ok(Table::new(grouped)?)
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Apply `func` to every numeric column, labelling results `<column>_<func>`.
pub fn aggregate(table: &Table, func: AggFunc) -> Result<Vec<(String, Value)>, OlapError> {
    let numeric = table.numeric_columns();
    if numeric.is_empty() {
        return Err(OlapError::NoNumericColumns);
    }
    numeric
        .into_iter()
        .map(|name| -> Result<(String, Value), OlapError> {
            let value = aggregate_series(table.series(&name)?, func)?;
            Ok((format!("{name}_{}", func.label()), value))
        })
        .collect()
}

fn float_sum(series: &Series) -> Result<f64, PolarsError> {
    let floats = series.cast(&DataType::Float64)?;
    Ok(floats.f64()?.sum().unwrap_or(0.0))
}

fn aggregate_series(series: &Series, func: AggFunc) -> Result<Value, OlapError> {
    let value = match func {
        AggFunc::Count => Value::Integer((series.len() - series.null_count()) as i64),
        AggFunc::Mean => series.mean().map_or(Value::Null, Value::float),
        AggFunc::Median => series.median().map_or(Value::Null, Value::float),
        AggFunc::Sum if series.dtype().is_integer() => {
            let ints = series.cast(&DataType::Int64)?;
            let total = ints
                .i64()?
                .into_iter()
                .flatten()
                .try_fold(0i64, |acc, v| acc.checked_add(v));
            // Overflowing integer sums fall back to floating point.
            match total {
                Some(total) => Value::Integer(total),
                None => Value::float(float_sum(series)?),
            }
        }
        AggFunc::Sum => Value::float(float_sum(series)?),
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Slice and dice
// ---------------------------------------------------------------------------

const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Whole-number text as an exact `i64`. Decimal spellings such as `"2.0"`
/// are accepted when they name a whole number.
fn integer_literal(text: &str) -> Option<i64> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(i);
    }
    let f = text.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&f)).then_some(f as i64)
}

/// Read user-typed text as a literal of the column's type. `None` when the
/// text has no meaning in that type.
fn typed_literal(text: &str, dtype: &DataType) -> Option<Expr> {
    let trimmed = text.trim();
    match DType::from(dtype) {
        DType::Integer => integer_literal(trimmed).map(lit),
        DType::Float => trimmed.parse::<f64>().ok().filter(|f| !f.is_nan()).map(lit),
        DType::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Some(lit(true)),
            "false" => Some(lit(false)),
            _ => None,
        },
        DType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .map(|d| lit(date_to_days(d)).cast(DataType::Date)),
        DType::DateTime => {
            let DataType::Datetime(unit, _) = dtype else {
                return None;
            };
            let moment = parse_datetime(trimmed).or_else(|| {
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })?;
            datetime_to_timestamp(moment, *unit).map(|ts| lit(ts).cast(dtype.clone()))
        }
        DType::Text => Some(lit(text)),
    }
}

/// Rows whose value in `column` equals the typed `value`.
///
/// The text is read in the column's own type first, so `"5"` selects the
/// integer `5` and `"true"` a boolean. Text columns compare verbatim. Text
/// that cannot be read in the column's type selects nothing.
pub fn slice(table: &Table, column: &str, value: &str) -> Result<Table, OlapError> {
    let dtype = table.series(column)?.dtype();
    let predicate = match typed_literal(value, dtype) {
        Some(literal) => col(column).eq(literal),
        None => lit(false),
    };
    let rows = table.lazy().filter(predicate).collect()?;
    Ok(Table::new(rows)?)
}

// ---------------------------------------------------------------------------
// Pivot
// ---------------------------------------------------------------------------

/// Separator between pivot-column values in a result column name.
const PIVOT_LABEL_SEPARATOR: &str = " | ";

/// Cross-tabulate the mean of `values` with `index` values as rows and the
/// combinations of `columns` values as result columns.
///
/// A cell without matching source rows is left empty. Rows with a missing
/// index or pivot value are dropped.
pub fn pivot_mean(
    table: &Table,
    index: &str,
    columns: &[String],
    values: &str,
) -> Result<Table, OlapError> {
    if values == index || columns.iter().any(|c| c == values) {
        return Err(OlapError::ValuesColumnReused(values.to_string()));
    }
    table.series(index)?;
    for name in columns {
        table.series(name)?;
    }
    let dtype = table.dtype(values)?;
    if !dtype.is_numeric() {
        return Err(OlapError::NonNumericValues {
            column: values.to_string(),
            dtype,
        });
    }

    let keys: Vec<String> = std::iter::once(index.to_string())
        .chain(columns.iter().cloned())
        .collect();
    let mean_name = fresh_name(&keys, "mean");
    let means = table
        .lazy()
        .filter(all_present(&keys))
        .group_by(key_exprs(&keys))
        .agg([col(values)
            .cast(DataType::Float64)
            .mean()
            .alias(mean_name.as_str())])
        .collect()?;
    let means = Table::new(means)?;

    // (index value, pivot combination) → mean
    let mut cells: HashMap<(Value, Vec<Value>), Value> = HashMap::new();
    let mut row_keys: Vec<Value> = Vec::new();
    let mut col_keys: Vec<Vec<Value>> = Vec::new();
    let pivot_values = columns
        .iter()
        .map(|name| means.values(name))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = means.values(index)?.into_iter().zip(means.values(&mean_name)?);
    for (row, (idx, mean)) in rows.enumerate() {
        let combo: Vec<Value> = pivot_values.iter().map(|v| v[row].clone()).collect();
        row_keys.push(idx.clone());
        col_keys.push(combo.clone());
        cells.insert((idx, combo), mean);
    }
    row_keys.sort();
    row_keys.dedup();
    col_keys.sort();
    col_keys.dedup();

    let labels: Vec<String> = col_keys
        .iter()
        .map(|combo| {
            if combo.is_empty() {
                values.to_string()
            } else {
                combo
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(PIVOT_LABEL_SEPARATOR)
            }
        })
        .collect();
    let names = dedupe_names(std::iter::once(index.to_string()).chain(labels).collect());

    let mut result = vec![(names[0].clone(), row_keys.clone())];
    for (name, combo) in names[1..].iter().zip(&col_keys) {
        let column: Vec<Value> = row_keys
            .iter()
            .map(|idx| {
                cells
                    .get(&(idx.clone(), combo.clone()))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        result.push((name.clone(), column));
    }
    Ok(Table::from_value_columns(result)?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn text(values: &[&str]) -> Vec<Value> {
        values.iter().map(|s| Value::Text(s.to_string())).collect()
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&i| Value::Integer(i)).collect()
    }

    fn table(columns: Vec<(&str, Vec<Value>)>) -> Table {
        Table::from_value_columns(
            columns
                .into_iter()
                .map(|(name, values)| (name.to_string(), values))
                .collect(),
        )
        .unwrap()
    }

    fn abc_table() -> Table {
        table(vec![("A", text(&["x", "y", "x"])), ("V", ints(&[1, 2, 3]))])
    }

    fn rows(table: &Table) -> Vec<Vec<Value>> {
        let width = table.shape().1;
        (0..table.n_rows())
            .map(|r| (0..width).map(|c| table.cell(r, c)).collect())
            .collect()
    }

    #[test]
    fn group_by_counts_each_combination() {
        let out = group_by_count(&abc_table(), &["A".into()]).unwrap();
        assert_eq!(out.column_names(), vec!["A", "Count"]);
        let expected: HashSet<Vec<Value>> = [
            vec![Value::Text("x".into()), Value::Integer(2)],
            vec![Value::Text("y".into()), Value::Integer(1)],
        ]
        .into_iter()
        .collect();
        assert_eq!(rows(&out).into_iter().collect::<HashSet<_>>(), expected);
    }

    #[test]
    fn group_by_several_columns_in_key_order() {
        let source = table(vec![
            ("region", text(&["s", "n", "s", "n", "s"])),
            ("year", ints(&[2021, 2020, 2021, 2021, 2020])),
        ]);
        let out = group_by_count(&source, &["region".into(), "year".into()]).unwrap();
        assert_eq!(out.column_names(), vec!["region", "year", "Count"]);
        let row = |r: &str, y: i64, n: i64| vec![Value::Text(r.into()), Value::Integer(y), Value::Integer(n)];
        assert_eq!(
            rows(&out),
            vec![row("n", 2020, 1), row("n", 2021, 1), row("s", 2020, 1), row("s", 2021, 2)]
        );
    }

    #[test]
    fn group_by_drops_missing_keys_and_requires_columns() {
        let source = table(vec![("A", vec![Value::Text("x".into()), Value::Null])]);
        let out = group_by_count(&source, &["A".into()]).unwrap();
        assert_eq!(out.n_rows(), 1);
        assert_eq!(group_by_count(&source, &[]), Err(OlapError::NoGroupColumns));
    }

    #[test]
    fn group_by_renames_clashing_count_column() {
        let source = table(vec![("Count", ints(&[1, 1]))]);
        let out = group_by_count(&source, &["Count".into()]).unwrap();
        assert_eq!(out.column_names(), vec!["Count", "Count.1"]);
        assert_eq!(rows(&out), vec![vec![Value::Integer(1), Value::Integer(2)]]);
    }

    #[test]
    fn negative_zero_groups_with_zero() {
        let source = table(vec![(
            "f",
            vec![Value::Float(0.0), Value::Float(-0.0), Value::Float(1.5)],
        )]);
        let out = group_by_count(&source, &["f".into()]).unwrap();
        assert_eq!(
            rows(&out),
            vec![
                vec![Value::Float(0.0), Value::Integer(2)],
                vec![Value::Float(1.5), Value::Integer(1)],
            ]
        );
    }

    #[test]
    fn aggregate_sum_labels_by_column() {
        let out = aggregate(&abc_table(), AggFunc::Sum).unwrap();
        assert_eq!(out, vec![("V_sum".to_string(), Value::Integer(6))]);

        let mean = aggregate(&abc_table(), AggFunc::Mean).unwrap();
        assert_eq!(mean, vec![("V_mean".to_string(), Value::Float(2.0))]);
    }

    #[test]
    fn integer_sum_overflow_falls_back_to_float() {
        let source = table(vec![("big", ints(&[i64::MAX, 1]))]);
        let out = aggregate(&source, AggFunc::Sum).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "big_sum");
        assert!(matches!(out[0].1, Value::Float(total) if total > 9.2e18));
    }

    #[test]
    fn aggregate_count_and_median_skip_nulls() {
        let source = table(vec![("p", vec![Value::Float(1.0), Value::Null, Value::Float(4.0)])]);
        assert_eq!(
            aggregate(&source, AggFunc::Count).unwrap(),
            vec![("p_count".to_string(), Value::Integer(2))]
        );
        assert_eq!(
            aggregate(&source, AggFunc::Median).unwrap(),
            vec![("p_median".to_string(), Value::Float(2.5))]
        );
    }

    #[test]
    fn aggregate_without_numeric_columns_warns() {
        let source = table(vec![("A", text(&["x"]))]);
        assert_eq!(
            run(&source, &OlapRequest::Aggregate { func: AggFunc::Sum }),
            Err(OlapError::NoNumericColumns)
        );
    }

    #[test]
    fn slice_matches_text_exactly() {
        let out = slice(&abc_table(), "A", "x").unwrap();
        assert_eq!(out.n_rows(), 2);
        assert_eq!(out.values("V").unwrap(), ints(&[1, 3]));

        assert_eq!(slice(&abc_table(), "A", "X").unwrap().n_rows(), 0);
        assert_eq!(slice(&abc_table(), "A", " x").unwrap().n_rows(), 0);
    }

    #[test]
    fn slice_reads_typed_value_in_column_type() {
        let source = abc_table();
        assert_eq!(slice(&source, "V", "2").unwrap().n_rows(), 1);
        assert_eq!(slice(&source, "V", "2.0").unwrap().n_rows(), 1);
        assert_eq!(slice(&source, "V", "2.5").unwrap().n_rows(), 0);
        assert_eq!(slice(&source, "V", "two").unwrap().n_rows(), 0);
        assert!(matches!(
            slice(&source, "nope", "1"),
            Err(OlapError::Table(TableError::UnknownColumn(_)))
        ));
    }

    #[test]
    fn slice_compares_large_integers_exactly() {
        let source = table(vec![("id", ints(&[9_007_199_254_740_992, 9_007_199_254_740_993]))]);
        let out = slice(&source, "id", "9007199254740993").unwrap();
        assert_eq!(out.values("id").unwrap(), ints(&[9_007_199_254_740_993]));

        let single = table(vec![("id", ints(&[9_007_199_254_740_992]))]);
        assert_eq!(slice(&single, "id", "9007199254740993").unwrap().n_rows(), 0);
    }

    #[test]
    fn slice_reads_booleans_case_insensitively() {
        let source = table(vec![
            ("flag", vec![Value::Bool(true), Value::Bool(false), Value::Null]),
            ("n", ints(&[1, 2, 3])),
        ]);
        assert_eq!(slice(&source, "flag", "TRUE").unwrap().values("n").unwrap(), ints(&[1]));
        assert_eq!(slice(&source, "flag", "False").unwrap().values("n").unwrap(), ints(&[2]));
        assert_eq!(slice(&source, "flag", "yes").unwrap().n_rows(), 0);
    }

    #[test]
    fn slice_reads_dates_and_datetimes() {
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let source = table(vec![
            ("d", vec![Value::Date(day(1)), Value::Date(day(2)), Value::Null]),
            (
                "t",
                vec![
                    Value::DateTime(day(1).and_hms_opt(0, 0, 0).unwrap()),
                    Value::DateTime(day(2).and_hms_opt(10, 0, 0).unwrap()),
                    Value::DateTime(day(2).and_hms_opt(12, 0, 0).unwrap()),
                ],
            ),
            ("n", ints(&[1, 2, 3])),
        ]);
        let matched = |column: &str, text: &str| slice(&source, column, text).unwrap().values("n").unwrap();

        assert_eq!(matched("d", "2024-01-02"), ints(&[2]));
        assert_eq!(matched("d", "02/01/2024"), ints(&[]));
        assert_eq!(matched("t", "2024-01-02 10:00:00"), ints(&[2]));
        assert_eq!(matched("t", "2024-01-02T12:00:00"), ints(&[3]));
        assert_eq!(matched("t", "2024-01-01"), ints(&[1]));
    }

    #[test]
    fn pivot_takes_mean_per_cell() {
        let source = table(vec![
            ("I", text(&["a", "a", "b"])),
            ("C", text(&["p", "p", "q"])),
            ("V", ints(&[2, 4, 10])),
        ]);

        let flat = pivot_mean(&source, "I", &[], "V").unwrap();
        assert_eq!(flat.column_names(), vec!["I", "V"]);
        assert_eq!(flat.values("V").unwrap()[0], Value::Float(3.0));

        let wide = pivot_mean(&source, "I", &["C".into()], "V").unwrap();
        assert_eq!(wide.column_names(), vec!["I", "p", "q"]);
        assert_eq!(wide.values("p").unwrap(), vec![Value::Float(3.0), Value::Null]);
        assert_eq!(wide.values("q").unwrap(), vec![Value::Null, Value::Float(10.0)]);
    }

    #[test]
    fn pivot_joins_combination_labels() {
        let source = table(vec![
            ("I", text(&["a", "a", "b"])),
            ("C", text(&["p", "q", "p"])),
            ("D", ints(&[1, 1, 2])),
            ("V", vec![Value::Float(1.0), Value::Float(2.0), Value::Float(-0.0)]),
        ]);
        let wide = pivot_mean(&source, "I", &["C".into(), "D".into()], "V").unwrap();
        assert_eq!(wide.column_names(), vec!["I", "p | 1", "p | 2", "q | 1"]);
        assert_eq!(wide.values("p | 2").unwrap(), vec![Value::Null, Value::Float(0.0)]);
    }

    #[test]
    fn pivot_merges_negative_zero_index_keys() {
        let source = table(vec![
            ("I", vec![Value::Float(0.0), Value::Float(-0.0)]),
            ("V", ints(&[1, 3])),
        ]);
        let flat = pivot_mean(&source, "I", &[], "V").unwrap();
        assert_eq!(rows(&flat), vec![vec![Value::Float(0.0), Value::Float(2.0)]]);
    }

    #[test]
    fn pivot_rejects_unusable_values_column() {
        let source = abc_table();
        assert!(matches!(
            pivot_mean(&source, "V", &[], "A"),
            Err(OlapError::NonNumericValues { .. })
        ));
        assert_eq!(
            pivot_mean(&source, "V", &[], "V"),
            Err(OlapError::ValuesColumnReused("V".into()))
        );
    }
}
