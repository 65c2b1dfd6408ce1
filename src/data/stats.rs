use polars::prelude::*;

use super::model::{fresh_name, DType, Table, TableError, Value};

/// Row labels of a numeric summary, in display order.
pub const NUMERIC_STATS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Row labels of a summary over non-numeric columns.
pub const CATEGORICAL_STATS: [&str; 4] = ["count", "unique", "top", "freq"];

fn float_or_null(v: Option<f64>) -> Value {
    v.map_or(Value::Null, Value::float)
}

fn is_numeric(series: &Series) -> bool {
    DType::from(series.dtype()).is_numeric()
}

fn numeric_summary(series: &Series) -> Result<Vec<Value>, TableError> {
    let floats = series.cast(&DataType::Float64)?;
    let values = floats.f64()?;
    let quantile = |q: f64| -> Result<Value, TableError> {
        Ok(float_or_null(values.quantile(q, QuantileMethod::Linear)?))
    };
    Ok(vec![
        Value::Float((values.len() - values.null_count()) as f64),
        float_or_null(values.mean()),
        float_or_null(values.std(1)),
        float_or_null(values.min()),
        quantile(0.25)?,
        quantile(0.5)?,
        quantile(0.75)?,
        float_or_null(values.max()),
    ])
}

fn categorical_summary(table: &Table, name: &str) -> Result<Vec<Value>, TableError> {
    let series = table.series(name)?;
    let present = series.len() - series.null_count();
    let unique = series.drop_nulls().n_unique()?;
    let counts = value_counts(table, name)?;
    let top = counts.first();
    Ok(vec![
        Value::Integer(present as i64),
        Value::Integer(unique as i64),
        top.map_or(Value::Null, |(v, _)| v.clone()),
        top.map_or(Value::Null, |(_, n)| Value::Integer(*n as i64)),
    ])
}

/// Frequency of each distinct non-missing value, most frequent first.
/// Values with equal counts keep their order of first appearance.
pub fn value_counts(table: &Table, column: &str) -> Result<Vec<(Value, usize)>, TableError> {
    table.series(column)?;
    let count_name = fresh_name(&[column.to_string()], "count");
    let counts = table
        .lazy()
        .select([col(column)])
        .filter(col(column).is_not_null())
        .group_by_stable([col(column)])
        .agg([len().alias(count_name.as_str())])
        .sort_by_exprs(
            [col(count_name.as_str())],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_maintain_order(true),
        )
        .collect()?;

    let keys = counts.column(column)?;
    let totals = counts.column(&count_name)?;
    (0..counts.height())
        .map(|row| -> Result<(Value, usize), TableError> {
            let n = match Value::from_any(totals.get(row)?) {
                Value::Integer(n) => usize::try_from(n).unwrap_or_default(),
                _ => 0,
            };
            Ok((Value::from_any(keys.get(row)?), n))
        })
        .collect()
}

/// Descriptive statistics for the chosen columns, one result column per
/// described source column and one row per statistic.
///
/// When any chosen column is numeric only the numeric ones are described;
/// otherwise every chosen column gets the categorical summary.
pub fn describe(table: &Table, columns: &[String]) -> Result<Table, TableError> {
    let chosen = columns
        .iter()
        .map(|name| table.series(name))
        .collect::<Result<Vec<_>, _>>()?;
    if chosen.is_empty() {
        return Err(TableError::NoColumns);
    }

    let any_numeric = chosen.iter().any(|s| is_numeric(s));
    let labels: &[&str] = if any_numeric {
        &NUMERIC_STATS
    } else {
        &CATEGORICAL_STATS
    };

    let mut out = vec![(
        String::new(),
        labels.iter().map(|l| Value::Text(l.to_string())).collect(),
    )];
    for series in chosen {
        if any_numeric && !is_numeric(series) {
            continue;
        }
        let summary = if any_numeric {
            numeric_summary(series)?
        } else {
            categorical_summary(table, series.name())?
        };
        out.push((series.name().to_string(), summary));
    }
    Table::from_value_columns(out)
}
