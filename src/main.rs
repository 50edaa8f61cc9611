use anyhow::Result;
use deces_pipeline::{convert_to_parquet, Layout};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Bulk conversion of INSEE death exports: TXT → Parquet.
///
/// Usage: convert [SOURCE_DIR] [OUTPUT_DIR] [--pattern] [--delete-original]
fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    // ─── 2) parse arguments ──────────────────────────────────────────
    let mut layout = Layout::FixedWidth;
    let mut delete_original = false;
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--pattern" => layout = Layout::Pattern,
            "--fixed-width" => layout = Layout::FixedWidth,
            "--delete-original" => delete_original = true,
            other => positional.push(PathBuf::from(other)),
        }
    }
    let source_dir = positional
        .first()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("data_processed/deces"));
    let output_dir = positional.get(1).cloned().unwrap_or_else(|| source_dir.clone());

    info!(
        "converting {} -> {} ({:?} layout, delete_original={})",
        source_dir.display(),
        output_dir.display(),
        layout,
        delete_original
    );

    // ─── 3) run the sweep ────────────────────────────────────────────
    let report = match convert_to_parquet(&source_dir, &output_dir, layout, delete_original) {
        Ok(report) => report,
        Err(e) => {
            error!("conversion aborted: {:#}", e);
            std::process::exit(1);
        }
    };

    // ─── 4) dump the report ──────────────────────────────────────────
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        successes = report.successes(),
        failures = report.failures(),
        rows = report.total_rows(),
        "done"
    );

    if report.failures() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
