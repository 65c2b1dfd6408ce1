//! Data layer: core types, loading, and the table transforms behind each page.
//!
//! Architecture:
//! ```text
//!  .csv / .xlsx / .json / .parquet
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse upload → Table, log success / failure
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ registry  │  display name → Table, insertion ordered
//!   └──────────┘
//!        │
//!        ├──────────────┬──────────────┐
//!        ▼              ▼              ▼
//!   ┌─────────┐   ┌──────────┐   ┌──────────┐
//!   │  chart   │   │  stats   │   │   olap   │  derive new tables / summaries
//!   └─────────┘   └──────────┘   └──────────┘
//! ```

pub mod chart;
pub mod loader;
pub mod model;
pub mod olap;
pub mod registry;
pub mod stats;
