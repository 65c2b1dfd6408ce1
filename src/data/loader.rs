use std::io::Cursor;
use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Date32Type, Float32Type, Float64Type, Int16Type, Int32Type,
    Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::temporal_conversions::date32_to_datetime;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use bytes::Bytes;
use calamine::{Data, Reader, Xlsx};
use chrono::{NaiveDate, Timelike};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use polars::prelude::{CsvReadOptions, NullValues, PlSmallStr, SerReader};
use serde_json::Value as JsonValue;

use super::model::{dedupe_names, parse_datetime, Table, TableError, Value, NA_TOKENS};
use crate::session_log::SessionLog;

/// Extensions accepted by the upload dialog.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "json", "parquet", "pq"];

// ---------------------------------------------------------------------------
// Uploads and batch results
// ---------------------------------------------------------------------------

/// A user-supplied file: its display name and raw content.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Upload {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Upload::new(display_name(path), bytes))
    }
}

/// The file name shown in the dataset selector.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub csv_delimiter: u8,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { csv_delimiter: b',' }
    }
}

/// A file that could not be loaded, with the message shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub name: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successfully parsed tables in upload order.
    pub loaded: Vec<(String, Table)>,
    pub failures: Vec<LoadFailure>,
}

/// Parse every upload independently. A bad file is logged and reported but
/// never stops the rest of the batch.
pub fn load_batch(uploads: Vec<Upload>, options: &LoadOptions, log: &mut SessionLog) -> BatchReport {
    let mut report = BatchReport::default();
    for upload in uploads {
        match parse_upload(&upload, options) {
            Ok(table) => {
                let (rows, cols) = table.shape();
                log.info(format!(
                    "Dataset '{}' with {rows} rows and {cols} columns has been uploaded.",
                    upload.name
                ));
                report.loaded.push((upload.name, table));
            }
            Err(e) => report.failures.push(record_failure(log, &upload.name, &e)),
        }
    }
    report
}

/// Log a failed upload and build the user-facing error for it.
pub fn record_failure(log: &mut SessionLog, name: &str, err: &anyhow::Error) -> LoadFailure {
    log::error!("Failed to load '{name}': {err:#}");
    log.warn(format!("Dataset '{name}' uploading failed"));
    LoadFailure {
        name: name.to_string(),
        message: format!("Error loading dataset '{name}': {err:#}"),
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Parse one upload into a table. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one record per row
/// * `.xlsx`    – first worksheet, header in the first row
/// * `.json`    – `[{ "col": value, ... }, ...]`
/// * `.parquet` – any flat schema
pub fn parse_upload(upload: &Upload, options: &LoadOptions) -> Result<Table> {
    let ext = Path::new(&upload.name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => parse_csv(&upload.bytes, options.csv_delimiter),
        "xlsx" => parse_xlsx(&upload.bytes),
        "json" => parse_json(&upload.bytes),
        "parquet" | "pq" => parse_parquet(&upload.bytes),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Cell spellings read as missing: the usual dataframe tokens plus every
/// signed or differently cased form of `nan`.
fn csv_null_tokens() -> Vec<PlSmallStr> {
    let mut tokens: Vec<String> = NA_TOKENS.iter().map(|t| t.to_string()).collect();
    for sign in ["", "+", "-"] {
        for mask in 0..8u8 {
            let nan: String = "nan"
                .chars()
                .enumerate()
                .map(|(i, c)| if mask & (1 << i) != 0 { c.to_ascii_uppercase() } else { c })
                .collect();
            let token = format!("{sign}{nan}");
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
    }
    tokens.into_iter().map(PlSmallStr::from).collect()
}

/// De-duplicated header names. A record longer than the header is an error;
/// short records are padded with missing values when parsed.
fn csv_header(text: &str, delimiter: u8) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().context("reading CSV headers")?;
    if headers.is_empty() {
        return Err(TableError::NoColumns.into());
    }
    let names = dedupe_names(headers.iter().map(str::to_string).collect());

    for result in reader.records() {
        let record = result.context("reading CSV record")?;
        if record.len() > names.len() {
            let line = record.position().map_or(0, |p| p.line());
            bail!(
                "CSV line {line}: expected {} fields, saw {}",
                names.len(),
                record.len()
            );
        }
    }
    Ok(names)
}

fn parse_csv(bytes: &[u8], delimiter: u8) -> Result<Table> {
    let text = std::str::from_utf8(bytes).context("CSV is not valid UTF-8")?;
    let names = csv_header(text, delimiter)?;

    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|opts| {
            opts.with_separator(delimiter)
                .with_try_parse_dates(true)
                .with_missing_is_null(true)
                .with_null_values(Some(NullValues::AllColumns(csv_null_tokens())))
        })
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .context("parsing CSV")?;
    if df.width() != names.len() {
        bail!("CSV header has {} fields, parsed {} columns", names.len(), df.width());
    }
    df.set_column_names(names).context("naming CSV columns")?;
    Ok(Table::new(df)?)
}

// ---------------------------------------------------------------------------
// XLSX loader
// ---------------------------------------------------------------------------

fn parse_xlsx(bytes: &[u8]) -> Result<Table> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).context("opening workbook")?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .context("workbook has no sheets")?;
    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("reading sheet '{sheet}'"))?;

    let mut rows = range.rows();
    let header = rows.next().ok_or(TableError::NoColumns)?;
    let names = dedupe_names(
        header
            .iter()
            .map(|cell| cell_to_value(cell).to_string())
            .collect(),
    );

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for row in rows {
        for (i, column) in values.iter_mut().enumerate() {
            column.push(row.get(i).map_or(Value::Null, cell_to_value));
        }
    }

    let columns = names
        .into_iter()
        .zip(values.into_iter().map(narrow_whole_floats))
        .collect();
    Ok(Table::from_value_columns(columns)?)
}

fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => Value::float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if NA_TOKENS.contains(&s.trim()) => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(d) if d.num_seconds_from_midnight() == 0 && d.nanosecond() == 0 => {
                Value::Date(d.date())
            }
            Some(d) => Value::DateTime(d),
            None => Value::Null,
        },
        Data::DateTimeIso(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Value::Date)
            .ok()
            .or_else(|| parse_datetime(s).map(Value::DateTime))
            .unwrap_or_else(|| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

/// Spreadsheets store every number as a float; a complete column of whole
/// numbers is read back as integers.
fn narrow_whole_floats(values: Vec<Value>) -> Vec<Value> {
    let whole = !values.is_empty()
        && values
            .iter()
            .all(|v| matches!(v, Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15));
    if !whole {
        return values;
    }
    values
        .into_iter()
        .map(|v| match v {
            Value::Float(f) => Value::Integer(f as i64),
            other => other,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "region": "north", "units": 4, "price": 9.5 },
///   ...
/// ]
/// ```
fn parse_json(bytes: &[u8]) -> Result<Table> {
    let root: JsonValue = serde_json::from_slice(bytes).context("parsing JSON")?;
    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut names: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Record {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let values = records
                .iter()
                .map(|rec| rec.get(&name).map_or(Value::Null, json_to_value))
                .collect();
            (name, values)
        })
        .collect();
    Ok(Table::from_value_columns(columns)?)
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => Value::Text(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::float(f)
            } else {
                Value::Text(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load every record batch of a Parquet file into one table.
fn parse_parquet(bytes: &[u8]) -> Result<Table> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes))
        .context("reading parquet metadata")?;
    let names: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut values: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        for (i, column) in values.iter_mut().enumerate() {
            column.extend(arrow_values(batch.column(i))?);
        }
    }

    Ok(Table::from_value_columns(names.into_iter().zip(values).collect())?)
}

// -- Arrow helpers --

fn primitive_values<T: ArrowPrimitiveType>(
    col: &ArrayRef,
    convert: impl Fn(T::Native) -> Value,
) -> Vec<Value> {
    col.as_primitive::<T>()
        .iter()
        .map(|v| v.map_or(Value::Null, &convert))
        .collect()
}

/// Convert one Arrow column into cell values.
fn arrow_values(col: &ArrayRef) -> Result<Vec<Value>> {
    let values = match col.data_type() {
        DataType::Utf8 => col
            .as_string::<i32>()
            .iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
            .collect(),
        DataType::LargeUtf8 => col
            .as_string::<i64>()
            .iter()
            .map(|v| v.map_or(Value::Null, |s| Value::Text(s.to_string())))
            .collect(),
        DataType::Boolean => col
            .as_boolean()
            .iter()
            .map(|v| v.map_or(Value::Null, Value::Bool))
            .collect(),
        DataType::Int8 => primitive_values::<Int8Type>(col, |v| Value::Integer(v.into())),
        DataType::Int16 => primitive_values::<Int16Type>(col, |v| Value::Integer(v.into())),
        DataType::Int32 => primitive_values::<Int32Type>(col, |v| Value::Integer(v.into())),
        DataType::Int64 => primitive_values::<Int64Type>(col, Value::Integer),
        DataType::UInt8 => primitive_values::<UInt8Type>(col, |v| Value::Integer(v.into())),
        DataType::UInt16 => primitive_values::<UInt16Type>(col, |v| Value::Integer(v.into())),
        DataType::UInt32 => primitive_values::<UInt32Type>(col, |v| Value::Integer(v.into())),
        DataType::UInt64 => primitive_values::<UInt64Type>(col, |v| {
            i64::try_from(v).map_or(Value::float(v as f64), Value::Integer)
        }),
        DataType::Float32 => primitive_values::<Float32Type>(col, |v| Value::float(v.into())),
        DataType::Float64 => primitive_values::<Float64Type>(col, Value::float),
        DataType::Date32 => primitive_values::<Date32Type>(col, |v| {
            date32_to_datetime(v).map_or(Value::Null, |dt| Value::Date(dt.date()))
        }),
        other => {
            let formatter = ArrayFormatter::try_new(col.as_ref(), &FormatOptions::default())
                .with_context(|| format!("formatting {other} column"))?;
            (0..col.len())
                .map(|row| {
                    if col.is_null(row) {
                        Value::Null
                    } else {
                        Value::Text(formatter.value(row).to_string())
                    }
                })
                .collect()
        }
    };
    Ok(values)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use super::*;
    use crate::data::model::DType;

    fn load_one(name: &str, bytes: &[u8]) -> Result<Table> {
        parse_upload(&Upload::new(name, bytes), &LoadOptions::default())
    }

    #[test]
    fn csv_upload_adds_table_and_one_log_entry() {
        let mut log = SessionLog::default();
        let csv = "city,pop,area\nA,10,1.5\nB,20,2.5\nC,30,3.5\nD,40,4.5\n";
        let report = load_batch(
            vec![Upload::new("cities.csv", csv)],
            &LoadOptions::default(),
            &mut log,
        );

        assert!(report.failures.is_empty());
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.loaded[0].0, "cities.csv");
        assert_eq!(report.loaded[0].1.shape(), (4, 3));

        assert_eq!(log.len(), 1);
        let message = &log.entries()[0].message;
        assert!(message.contains("cities.csv"));
        assert!(message.contains("4 rows"));
        assert!(message.contains("3 columns"));
    }

    #[test]
    fn malformed_file_does_not_block_the_batch() {
        let mut log = SessionLog::default();
        let uploads = vec![
            Upload::new("bad.csv", "a,b\n1,2\n3,4,5\n"),
            Upload::new("good.csv", "a\n1\n"),
        ];
        let report = load_batch(uploads, &LoadOptions::default(), &mut log);

        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.loaded[0].0, "good.csv");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "bad.csv");
        assert!(report.failures[0].message.contains("bad.csv"));
        assert!(report.failures[0].message.contains("expected 2 fields, saw 3"));

        let failures: Vec<_> = log
            .entries()
            .iter()
            .filter(|e| e.message.contains("uploading failed"))
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("bad.csv"));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn short_csv_records_are_padded() {
        let table = load_one("t.csv", b"a,b\n1\n2,3\n").unwrap();
        assert_eq!(table.values("b").unwrap(), vec![Value::Null, Value::Integer(3)]);
    }

    #[test]
    fn csv_infers_column_types() {
        let csv = "i,f,t,b,d,dt\n1,1.5,x,true,2024-01-02,2024-01-02 10:00:00\n2,NA,1.50,false,2024-02-03,2024-02-03 11:30:00\n";
        let table = load_one("types.csv", csv.as_bytes()).unwrap();
        assert_eq!(
            table.dtypes(),
            vec![
                DType::Integer,
                DType::Float,
                DType::Text,
                DType::Bool,
                DType::Date,
                DType::DateTime
            ]
        );
        assert_eq!(table.values("f").unwrap()[1], Value::Null);
        assert_eq!(table.values("t").unwrap()[1], Value::Text("1.50".into()));
        assert_eq!(
            table.values("d").unwrap()[0],
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
    }

    #[test]
    fn csv_nan_spellings_are_missing() {
        let table = load_one("nan.csv", b"a,b\n1,1.5\nNAN,+nan\n3,Nan\n").unwrap();
        assert_eq!(table.dtype("a").unwrap(), DType::Integer);
        assert_eq!(
            table.values("a").unwrap(),
            vec![Value::Integer(1), Value::Null, Value::Integer(3)]
        );
        assert_eq!(table.numbers("b").unwrap(), vec![Some(1.5), None, None]);
    }

    #[test]
    fn csv_headers_are_deduplicated() {
        let table = load_one("dup.csv", b"a,,a\n1,2,3\n").unwrap();
        assert_eq!(table.column_names(), vec!["a", "Unnamed: 1", "a.1"]);
    }

    #[test]
    fn csv_respects_delimiter_option() {
        let options = LoadOptions { csv_delimiter: b';' };
        let table = parse_upload(&Upload::new("t.csv", "a;b\n1;2\n"), &options).unwrap();
        assert_eq!(table.shape(), (1, 2));
    }

    #[test]
    fn rejects_empty_and_non_utf8_csv() {
        assert!(load_one("empty.csv", b"").is_err());
        assert!(load_one("latin1.csv", b"name\ncaf\xe9\n").is_err());
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = load_one("notes.txt", b"a,b\n").unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported file extension"));
    }

    #[test]
    fn reads_json_records() {
        let json = r#"[{"a": 1, "b": "x"}, {"a": 2.5}, {"b": "y", "c": true}]"#;
        let table = load_one("data.json", json.as_bytes()).unwrap();
        assert_eq!(table.shape(), (3, 3));
        assert_eq!(table.dtype("a").unwrap(), DType::Float);
        assert_eq!(table.values("b").unwrap()[1], Value::Null);
        assert_eq!(table.dtype("c").unwrap(), DType::Bool);
    }

    #[test]
    fn json_nested_values_are_kept_as_json_text() {
        let json = r#"[{"tags": [1, 2], "meta": {"k": "v"}}, {"tags": null, "meta": {}}]"#;
        let table = load_one("nested.json", json.as_bytes()).unwrap();
        assert_eq!(table.dtype("tags").unwrap(), DType::Text);
        assert_eq!(
            table.values("tags").unwrap(),
            vec![Value::Text("[1,2]".into()), Value::Null]
        );
        assert_eq!(
            table.values("meta").unwrap(),
            vec![Value::Text(r#"{"k":"v"}"#.into()), Value::Text("{}".into())]
        );
    }

    #[test]
    fn json_must_be_an_array_of_objects() {
        assert!(load_one("obj.json", br#"{"a": 1}"#).is_err());
        let err = load_one("rows.json", br#"[[1, 2]]"#).unwrap_err();
        assert!(format!("{err:#}").contains("Record 0 is not a JSON object"));
    }

    #[test]
    fn reads_first_xlsx_sheet() {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(0, 1, "qty").unwrap();
        sheet.write_string(0, 2, "price").unwrap();
        for (row, (name, qty, price)) in [("a", 1.0, 0.5), ("b", 2.0, 1.25)].into_iter().enumerate() {
            let row = row as u32 + 1;
            sheet.write_string(row, 0, name).unwrap();
            sheet.write_number(row, 1, qty).unwrap();
            sheet.write_number(row, 2, price).unwrap();
        }
        let bytes = workbook.save_to_buffer().unwrap();

        let table = load_one("book.xlsx", &bytes).unwrap();
        assert_eq!(table.shape(), (2, 3));
        assert_eq!(table.dtype("qty").unwrap(), DType::Integer);
        assert_eq!(table.dtype("price").unwrap(), DType::Float);
        assert_eq!(table.values("name").unwrap()[1], Value::Text("b".into()));
    }

    #[test]
    fn reads_parquet() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("label", DataType::Utf8, true),
            Field::new("score", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("x"), None])),
                Arc::new(Float64Array::from(vec![0.5, f64::NAN])),
            ],
        )
        .unwrap();
        let mut buffer = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buffer, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_one("scores.parquet", &buffer).unwrap();
        assert_eq!(table.shape(), (2, 3));
        assert_eq!(table.dtype("id").unwrap(), DType::Integer);
        assert_eq!(table.values("label").unwrap()[1], Value::Null);
        assert_eq!(table.numbers("score").unwrap(), vec![Some(0.5), None]);
    }
}
