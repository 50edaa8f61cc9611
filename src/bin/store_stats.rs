use anyhow::Result;
use deces_pipeline::{available_years, load};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Print the years available in a columnar store directory and the row
/// count behind each one.
fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data_processed/deces"));

    let years = available_years(&dir)?;
    if years.is_empty() {
        println!("no columnar file in {}", dir.display());
        return Ok(());
    }

    println!("store: {}", dir.display());
    let mut total = 0usize;
    for year in years {
        let wanted: BTreeSet<i32> = [year].into_iter().collect();
        let dataset = load(&dir, Some(&wanted))?;
        println!("  {year}: {} rows", dataset.len());
        total += dataset.len();
    }
    println!("  total: {total} rows");
    Ok(())
}
