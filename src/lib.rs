//! Ingestion pipeline for INSEE fixed-width death records: parse raw
//! text exports, normalize rows (dates, age at death), persist them as
//! year-partitioned Parquet, and serve filtered views to a dashboard.

pub mod convert;
pub mod normalize;
pub mod parse;
pub mod query;
pub mod store;

pub use convert::{convert_to_parquet, ConversionReport, FileOutcome};
pub use parse::{Layout, ParsedRecord, Sex};
pub use store::{available_years, load, Dataset, StoreCache};
