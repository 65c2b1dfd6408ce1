//! Writes a small demo sales dataset as `sample_sales.csv` and
//! `sample_sales.parquet` into the working directory.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use parquet::arrow::ArrowWriter;

const ROWS: usize = 240;

/// Deterministic SplitMix64 generator, so every run writes the same file.
struct SplitMix64(u64);

impl SplitMix64 {
    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

struct Orders {
    id: Vec<i64>,
    date: Vec<String>,
    region: Vec<&'static str>,
    product: Vec<&'static str>,
    units: Vec<i64>,
    unit_price: Vec<f64>,
    returned: Vec<bool>,
}

fn generate(rng: &mut SplitMix64) -> Result<Orders> {
    let regions = ["North", "South", "East", "West"];
    let products = ["Widget", "Gadget", "Gizmo"];
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).context("invalid start date")?;

    let mut orders = Orders {
        id: Vec::with_capacity(ROWS),
        date: Vec::with_capacity(ROWS),
        region: Vec::with_capacity(ROWS),
        product: Vec::with_capacity(ROWS),
        units: Vec::with_capacity(ROWS),
        unit_price: Vec::with_capacity(ROWS),
        returned: Vec::with_capacity(ROWS),
    };
    for i in 0..ROWS {
        let product = rng.pick(&products);
        let base_price = match product {
            "Widget" => 4.5,
            "Gadget" => 12.0,
            _ => 27.5,
        };
        let day = start + Duration::days((i / 2) as i64);

        orders.id.push(1000 + i as i64);
        orders.date.push(day.format("%Y-%m-%d").to_string());
        orders.region.push(rng.pick(&regions));
        orders.product.push(product);
        orders.units.push(1 + (rng.next_u64() % 20) as i64);
        orders
            .unit_price
            .push((base_price * (0.9 + 0.2 * rng.unit()) * 100.0).round() / 100.0);
        orders.returned.push(rng.unit() < 0.05);
    }
    Ok(orders)
}

fn write_csv(orders: &Orders, path: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {path}"))?;
    writer.write_record([
        "order_id",
        "order_date",
        "region",
        "product",
        "units",
        "unit_price",
        "returned",
    ])?;
    for i in 0..orders.id.len() {
        writer.write_record([
            orders.id[i].to_string(),
            orders.date[i].clone(),
            orders.region[i].to_string(),
            orders.product[i].to_string(),
            orders.units[i].to_string(),
            orders.unit_price[i].to_string(),
            orders.returned[i].to_string(),
        ])?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

fn write_parquet(orders: &Orders, path: &str) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("order_date", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("product", DataType::Utf8, false),
        Field::new("units", DataType::Int64, false),
        Field::new("unit_price", DataType::Float64, false),
        Field::new("returned", DataType::Boolean, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(orders.id.clone())),
        Arc::new(StringArray::from(
            orders.date.iter().map(String::as_str).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(orders.region.clone())),
        Arc::new(StringArray::from(orders.product.clone())),
        Arc::new(Int64Array::from(orders.units.clone())),
        Arc::new(Float64Array::from(orders.unit_price.clone())),
        Arc::new(BooleanArray::from(orders.returned.clone())),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn main() -> Result<()> {
    let orders = generate(&mut SplitMix64(42))?;

    write_csv(&orders, "sample_sales.csv")?;
    write_parquet(&orders, "sample_sales.parquet")?;

    println!("Wrote {ROWS} orders to sample_sales.csv and sample_sales.parquet");
    Ok(())
}
