use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::{
    AnyValue, Column, DataFrame, DataType, DateChunked, DatetimeChunked, Float64Chunked,
    IntoColumn, IntoLazy, IntoSeries, LazyFrame, NamedFrom, NewChunkedArray, PlSmallStr, PolarsError, Series,
    TimeUnit,
};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Value – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value read out of a table.
/// Values are compared and hashed as chart categories and pivot keys, so
/// `Value` must be `Ord`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

// -- Manual Eq/Ord/Hash so Values can be sorted and used as map keys --

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
                Date(_) => 5,
                DateTime(_) => 6,
            }
        }
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            // `+ 0.0` folds -0.0 into 0.0.
            (Float(a), Float(b)) => (a + 0.0).total_cmp(&(b + 0.0)),
            (Text(a), Text(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            _ => discriminant(self).cmp(&discriminant(other)),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => (f + 0.0).to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            // Whole floats keep a trailing ".0" so they read as floats in tables.
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{v:.1}")
            }
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Days from 0001-01-01 (day 1) to the Unix epoch.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

impl Value {
    /// A float cell. NaN is a missing value and -0.0 is stored as 0.0.
    pub fn float(v: f64) -> Value {
        if v.is_nan() {
            Value::Null
        } else {
            Value::Float(v + 0.0)
        }
    }

    /// Interpret the value as an `f64` for numeric work.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Convert a polars cell.
    pub fn from_any(value: AnyValue<'_>) -> Value {
        match value {
            AnyValue::Null => Value::Null,
            AnyValue::Boolean(b) => Value::Bool(b),
            AnyValue::String(s) => Value::Text(s.to_string()),
            AnyValue::StringOwned(s) => Value::Text(s.to_string()),
            AnyValue::Int32(v) => Value::Integer(v.into()),
            AnyValue::Int64(v) => Value::Integer(v),
            AnyValue::UInt32(v) => Value::Integer(v.into()),
            AnyValue::UInt64(v) => i64::try_from(v).map_or(Value::float(v as f64), Value::Integer),
            AnyValue::Float32(v) => Value::float(v.into()),
            AnyValue::Float64(v) => Value::float(v),
            AnyValue::Date(days) => days
                .checked_add(EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map_or(Value::Null, Value::Date),
            AnyValue::Datetime(ts, unit, _) => {
                timestamp_to_datetime(ts, unit).map_or(Value::Null, Value::DateTime)
            }
            other => Value::Text(other.to_string()),
        }
    }
}

fn ticks_per_second(unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    }
}

pub fn timestamp_to_datetime(ts: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let per_second = ticks_per_second(unit);
    let nanos = ts.rem_euclid(per_second) * (1_000_000_000 / per_second);
    DateTime::from_timestamp(ts.div_euclid(per_second), u32::try_from(nanos).ok()?)
        .map(|dt| dt.naive_utc())
}

pub fn datetime_to_timestamp(dt: NaiveDateTime, unit: TimeUnit) -> Option<i64> {
    let utc = dt.and_utc();
    match unit {
        TimeUnit::Nanoseconds => utc.timestamp_nanos_opt(),
        TimeUnit::Microseconds => Some(utc.timestamp_micros()),
        TimeUnit::Milliseconds => Some(utc.timestamp_millis()),
    }
}

/// Days since the Unix epoch, the physical value of a polars date.
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

/// Tokens read as a missing value, matching the usual dataframe defaults.
pub const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

// ---------------------------------------------------------------------------
// DType – the element type of a column
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Integer,
    Float,
    Bool,
    Text,
    Date,
    DateTime,
}

impl DType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DType::Integer | DType::Float)
    }
}

impl From<&DataType> for DType {
    fn from(dtype: &DataType) -> Self {
        match dtype {
            d if d.is_integer() => DType::Integer,
            d if d.is_float() => DType::Float,
            DataType::Boolean => DType::Bool,
            DataType::Date => DType::Date,
            DataType::Datetime(..) => DType::DateTime,
            _ => DType::Text,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Integer => "integer",
            DType::Float => "float",
            DType::Bool => "bool",
            DType::Text => "text",
            DType::Date => "date",
            DType::DateTime => "datetime",
        };
        f.write_str(name)
    }
}

/// Which kinds of non-null values a column holds.
#[derive(Default)]
struct Kinds {
    int: bool,
    float: bool,
    bool: bool,
    text: bool,
    date: bool,
    datetime: bool,
}

/// Pick the narrowest dtype able to hold every non-null value.
fn unify_dtype(values: &[Value]) -> DType {
    let mut k = Kinds::default();
    for v in values {
        match v {
            Value::Null => {}
            Value::Integer(_) => k.int = true,
            Value::Float(_) => k.float = true,
            Value::Bool(_) => k.bool = true,
            Value::Text(_) => k.text = true,
            Value::Date(_) => k.date = true,
            Value::DateTime(_) => k.datetime = true,
        }
    }
    let numeric = k.int || k.float;
    let temporal = k.date || k.datetime;

    if k.text || (k.bool && (numeric || temporal)) || (temporal && numeric) {
        DType::Text
    } else if k.bool {
        DType::Bool
    } else if k.datetime {
        DType::DateTime
    } else if k.date {
        DType::Date
    } else if k.int && !k.float {
        DType::Integer
    } else {
        // Float columns, and columns holding nothing but nulls.
        DType::Float
    }
}

fn coerce(value: Value, dtype: DType) -> Value {
    match (value, dtype) {
        (Value::Null, _) => Value::Null,
        (Value::Integer(i), DType::Float) => Value::Float(i as f64),
        (Value::Date(d), DType::DateTime) => d.and_hms_opt(0, 0, 0).map_or(Value::Null, Value::DateTime),
        (v @ Value::Text(_), DType::Text) => v,
        (v, DType::Text) => Value::Text(v.to_string()),
        (v, _) => v,
    }
}

/// Build a polars series from loosely typed cells, widening them to one dtype.
pub fn series_from_values(name: &str, values: Vec<Value>) -> Series {
    let dtype = unify_dtype(&values);
    let cells = values.into_iter().map(|v| coerce(v, dtype));
    let name = PlSmallStr::from(name);
    match dtype {
        DType::Integer => {
            let ints: Vec<Option<i64>> = cells
                .map(|v| match v {
                    Value::Integer(i) => Some(i),
                    _ => None,
                })
                .collect();
            Series::new(name, ints)
        }
        DType::Float => {
            let floats: Vec<Option<f64>> = cells.map(|v| v.as_f64()).collect();
            Series::new(name, floats)
        }
        DType::Bool => {
            let bools: Vec<Option<bool>> = cells
                .map(|v| match v {
                    Value::Bool(b) => Some(b),
                    _ => None,
                })
                .collect();
            Series::new(name, bools)
        }
        DType::Text => {
            let text: Vec<Option<String>> = cells
                .map(|v| match v {
                    Value::Text(s) => Some(s),
                    _ => None,
                })
                .collect();
            Series::new(name, text)
        }
        DType::Date => DateChunked::from_naive_date_options(
            name,
            cells.map(|v| match v {
                Value::Date(d) => Some(d),
                _ => None,
            }),
        )
        .into_series(),
        DType::DateTime => DatetimeChunked::from_naive_datetime_options(
            name,
            cells.map(|v| match v {
                Value::DateTime(dt) => Some(dt),
                _ => None,
            }),
            TimeUnit::Microseconds,
        )
        .into_series(),
    }
}

// ---------------------------------------------------------------------------
// Table – the loaded dataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("no columns to parse")]
    NoColumns,
    #[error("column '{name}' has {len} values, expected {expected}")]
    RaggedColumn {
        name: String,
        len: usize,
        expected: usize,
    },
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("{0}")]
    Engine(String),
}

impl From<PolarsError> for TableError {
    fn from(err: PolarsError) -> Self {
        TableError::Engine(err.to_string())
    }
}

/// An immutable dataset backed by a polars `DataFrame` with at least one
/// column. Float columns never hold NaN or -0.0: NaN is stored as null and
/// -0.0 as 0.0.
#[derive(Debug, Clone)]
pub struct Table {
    df: DataFrame,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.df.get_column_names() == other.df.get_column_names()
            && self.df.equals_missing(&other.df)
    }
}

fn clean_floats(column: &Column) -> Result<Column, PolarsError> {
    if !column.dtype().is_float() {
        return Ok(column.clone());
    }
    let floats = column.as_materialized_series().cast(&DataType::Float64)?;
    let cleaned = floats
        .f64()?
        .into_iter()
        .map(|v| v.filter(|f| !f.is_nan()).map(|f| f + 0.0));
    Ok(Float64Chunked::from_iter_options(column.name().clone(), cleaned).into_column())
}

impl Table {
    pub fn new(df: DataFrame) -> Result<Self, TableError> {
        if df.width() == 0 {
            return Err(TableError::NoColumns);
        }
        let columns = df
            .get_columns()
            .iter()
            .map(clean_floats)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table {
            df: DataFrame::new(columns)?,
        })
    }

    /// Build a table from named columns of loosely typed cells.
    pub fn from_value_columns(columns: Vec<(String, Vec<Value>)>) -> Result<Self, TableError> {
        let n_rows = columns.first().ok_or(TableError::NoColumns)?.1.len();
        let mut names = HashSet::new();
        for (name, values) in &columns {
            if values.len() != n_rows {
                return Err(TableError::RaggedColumn {
                    name: name.clone(),
                    len: values.len(),
                    expected: n_rows,
                });
            }
            if !names.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        let series = columns
            .into_iter()
            .map(|(name, values)| series_from_values(&name, values).into_column())
            .collect();
        Table::new(DataFrame::new(series)?)
    }

    /// A lazy query over a copy of the frame.
    pub fn lazy(&self) -> LazyFrame {
        self.df.clone().lazy()
    }

    pub fn n_rows(&self) -> usize {
        self.df.height()
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        self.df.shape()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn series(&self, name: &str) -> Result<&Series, TableError> {
        self.df
            .column(name)
            .map(Column::as_materialized_series)
            .map_err(|_| TableError::UnknownColumn(name.to_string()))
    }

    pub fn dtype(&self, name: &str) -> Result<DType, TableError> {
        Ok(DType::from(self.series(name)?.dtype()))
    }

    /// Column dtypes in column order.
    pub fn dtypes(&self) -> Vec<DType> {
        self.df
            .get_columns()
            .iter()
            .map(|c| DType::from(c.dtype()))
            .collect()
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.df
            .get_columns()
            .iter()
            .filter(|c| DType::from(c.dtype()).is_numeric())
            .map(|c| c.name().to_string())
            .collect()
    }

    /// The cell at `row` of the column at position `column`; null when out
    /// of range.
    pub fn cell(&self, row: usize, column: usize) -> Value {
        self.df
            .get_columns()
            .get(column)
            .and_then(|c| c.get(row).ok())
            .map_or(Value::Null, Value::from_any)
    }

    /// Every cell of a column, in row order.
    pub fn values(&self, name: &str) -> Result<Vec<Value>, TableError> {
        let series = self.series(name)?;
        (0..series.len())
            .map(|i| series.get(i).map(Value::from_any))
            .collect::<Result<Vec<_>, _>>()
            .map_err(TableError::from)
    }

    /// A column read as `f64`, with `None` for missing cells.
    pub fn numbers(&self, name: &str) -> Result<Vec<Option<f64>>, TableError> {
        let floats = self.series(name)?.cast(&DataType::Float64)?;
        Ok(floats.f64()?.into_iter().collect())
    }
}

/// Make header names usable as unique column names: blanks become
/// `Unnamed: <i>`, repeats get `.1`, `.2`, … suffixes.
pub fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let base = if name.trim().is_empty() {
                format!("Unnamed: {i}")
            } else {
                name
            };
            let mut candidate = base.clone();
            let mut n = 1;
            while seen.contains(&candidate) {
                candidate = format!("{base}.{n}");
                n += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// `base`, suffixed like [`dedupe_names`] does when it clashes with `taken`.
pub fn fresh_name(taken: &[String], base: &str) -> String {
    let mut names = taken.to_vec();
    names.push(base.to_string());
    dedupe_names(names).pop().unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&i| Value::Integer(i)).collect()
    }

    #[test]
    fn infers_integer_and_float_columns() {
        let table = Table::from_value_columns(vec![
            ("a".into(), vec![Value::Integer(1), Value::Integer(2), Value::Null]),
            ("b".into(), vec![Value::Integer(1), Value::Float(2.5), Value::Null]),
        ])
        .unwrap();
        assert_eq!(table.dtypes(), vec![DType::Integer, DType::Float]);
        assert_eq!(table.values("a").unwrap()[2], Value::Null);
        assert_eq!(table.values("b").unwrap()[0], Value::Float(1.0));
    }

    #[test]
    fn mixed_column_becomes_text() {
        let table = Table::from_value_columns(vec![(
            "a".into(),
            vec![Value::Float(1.5), Value::Text("abc".into()), Value::Null],
        )])
        .unwrap();
        assert_eq!(table.dtype("a").unwrap(), DType::Text);
        assert_eq!(
            table.values("a").unwrap(),
            vec![Value::Text("1.5".into()), Value::Text("abc".into()), Value::Null]
        );
    }

    #[test]
    fn dates_survive_the_round_trip() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let moment = day.and_hms_opt(10, 30, 5).unwrap();
        let table = Table::from_value_columns(vec![
            ("d".into(), vec![Value::Date(day), Value::Null]),
            ("t".into(), vec![Value::Date(day), Value::DateTime(moment)]),
        ])
        .unwrap();
        assert_eq!(table.dtypes(), vec![DType::Date, DType::DateTime]);
        assert_eq!(table.cell(0, 0), Value::Date(day));
        assert_eq!(
            table.values("t").unwrap(),
            vec![
                Value::DateTime(day.and_hms_opt(0, 0, 0).unwrap()),
                Value::DateTime(moment)
            ]
        );
        assert_eq!(date_to_days(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
    }

    #[test]
    fn all_null_column_is_float() {
        let table =
            Table::from_value_columns(vec![("n".into(), vec![Value::Null, Value::Null])]).unwrap();
        assert_eq!(table.dtype("n").unwrap(), DType::Float);
        assert_eq!(table.numeric_columns(), vec!["n"]);
    }

    #[test]
    fn table_rejects_bad_shapes() {
        assert_eq!(Table::from_value_columns(vec![]), Err(TableError::NoColumns));
        assert_eq!(Table::new(DataFrame::empty()), Err(TableError::NoColumns));
        assert!(matches!(
            Table::from_value_columns(vec![("a".into(), ints(&[1])), ("b".into(), vec![])]),
            Err(TableError::RaggedColumn { .. })
        ));
        assert_eq!(
            Table::from_value_columns(vec![("a".into(), ints(&[1])), ("a".into(), ints(&[2]))]),
            Err(TableError::DuplicateColumn("a".into()))
        );
    }

    #[test]
    fn nan_is_stored_as_null_and_negative_zero_as_zero() {
        let series = Series::new("f".into(), &[Some(1.0), Some(f64::NAN), Some(-0.0), None]);
        let table = Table::new(DataFrame::new(vec![series.into_column()]).unwrap()).unwrap();
        let values = table.values("f").unwrap();
        assert_eq!(values[..2], [Value::Float(1.0), Value::Null]);
        assert!(matches!(values[2], Value::Float(z) if z == 0.0 && z.is_sign_positive()));
        assert_eq!(table.numbers("f").unwrap()[1], None);

        assert_eq!(Value::float(f64::NAN), Value::Null);
        assert_eq!(Value::Float(-0.0), Value::Float(0.0));
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let table = Table::from_value_columns(vec![("a".into(), ints(&[1]))]).unwrap();
        assert_eq!(
            table.series("b").unwrap_err(),
            TableError::UnknownColumn("b".into())
        );
        assert_eq!(table.cell(5, 0), Value::Null);
    }

    #[test]
    fn dedupes_header_names() {
        let names = dedupe_names(vec!["a".into(), "".into(), "a".into(), "a".into()]);
        assert_eq!(names, vec!["a", "Unnamed: 1", "a.1", "a.2"]);
        assert_eq!(fresh_name(&["Count".into()], "Count"), "Count.1");
        assert_eq!(fresh_name(&["A".into()], "Count"), "Count");
    }

    #[test]
    fn display_formats_cells() {
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(2.25).to_string(), "2.25");
        assert_eq!(Value::Null.to_string(), "");
        assert!(Value::Null < Value::Integer(-5));
    }
}
