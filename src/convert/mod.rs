// src/convert/mod.rs
//
// Bulk TXT → Parquet conversion: parse + normalize every raw export in
// a directory and write one SNAPPY Parquet per source file. A failure
// on one file is logged and recorded; the sweep continues.

use crate::normalize::{normalize, NormalizedRecord};
use crate::parse::{parse_file, Layout};
use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Date32Builder, Float64Builder, Int32Builder, StringBuilder};
use arrow::datatypes::{DataType, Date32Type, Field, Schema};
use arrow::record_batch::RecordBatch;
use glob::glob;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Rows per Arrow batch handed to the Parquet writer.
const BATCH_ROWS: usize = 65_536;

/// Outcome for one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Converted {
        source: String,
        output: String,
        rows: u64,
        bytes_in: u64,
        bytes_out: u64,
    },
    Failed {
        source: String,
        reason: String,
    },
}

/// Per-file outcomes of one conversion sweep, in processing order.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    pub files: Vec<FileOutcome>,
}

impl ConversionReport {
    pub fn successes(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Converted { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.files.len() - self.successes()
    }

    pub fn total_rows(&self) -> u64 {
        self.files
            .iter()
            .map(|f| match f {
                FileOutcome::Converted { rows, .. } => *rows,
                FileOutcome::Failed { .. } => 0,
            })
            .sum()
    }
}

/// Arrow schema of one columnar death-record file.
pub fn record_schema() -> Schema {
    Schema::new(vec![
        Field::new("nom_prenom", DataType::Utf8, false),
        Field::new("sexe", DataType::Utf8, false),
        Field::new("date_naissance", DataType::Date32, true),
        Field::new("code_lieu_naissance", DataType::Utf8, false),
        Field::new("commune_naissance", DataType::Utf8, false),
        Field::new("pays_naissance", DataType::Utf8, true),
        Field::new("date_deces", DataType::Date32, true),
        Field::new("code_lieu_deces", DataType::Utf8, false),
        Field::new("numero_acte", DataType::Utf8, true),
        Field::new("age_deces", DataType::Float64, true),
        Field::new("annee_deces", DataType::Int32, true),
        Field::new("mois_deces", DataType::Int32, true),
    ])
}

fn records_to_batch(schema: Arc<Schema>, records: &[NormalizedRecord]) -> Result<RecordBatch> {
    let mut nom = StringBuilder::new();
    let mut sexe = StringBuilder::new();
    let mut naissance = Date32Builder::new();
    let mut code_naissance = StringBuilder::new();
    let mut commune = StringBuilder::new();
    let mut pays = StringBuilder::new();
    let mut deces = Date32Builder::new();
    let mut code_deces = StringBuilder::new();
    let mut acte = StringBuilder::new();
    let mut age = Float64Builder::new();
    let mut annee = Int32Builder::new();
    let mut mois = Int32Builder::new();

    for r in records {
        nom.append_value(&r.nom_prenom);
        sexe.append_value(r.sexe.code());
        naissance.append_option(r.date_naissance.map(Date32Type::from_naive_date));
        code_naissance.append_value(&r.code_lieu_naissance);
        commune.append_value(&r.commune_naissance);
        pays.append_option(r.pays_naissance.as_deref());
        deces.append_option(r.date_deces.map(Date32Type::from_naive_date));
        code_deces.append_value(&r.code_lieu_deces);
        acte.append_option(r.numero_acte.as_deref());
        age.append_option(r.age_deces);
        annee.append_option(r.annee_deces);
        mois.append_option(r.mois_deces.map(|m| m as i32));
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(nom.finish()),
        Arc::new(sexe.finish()),
        Arc::new(naissance.finish()),
        Arc::new(code_naissance.finish()),
        Arc::new(commune.finish()),
        Arc::new(pays.finish()),
        Arc::new(deces.finish()),
        Arc::new(code_deces.finish()),
        Arc::new(acte.finish()),
        Arc::new(age.finish()),
        Arc::new(annee.finish()),
        Arc::new(mois.finish()),
    ];

    RecordBatch::try_new(schema, columns).context("building death record batch")
}

/// Parquet output path for a source file: stem with `-` normalized to
/// `_`, extension `.parquet`.
pub fn output_path_for(source: &Path, output_dir: &Path) -> Result<PathBuf> {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("source file {:?} has no usable stem", source))?;
    Ok(output_dir.join(format!("{}.parquet", stem.replace('-', "_"))))
}

/// Convert one source file. The Parquet is written to a `.tmp` path and
/// renamed on success, so a failed conversion leaves no partial output.
/// The source is deleted only after the rename, and only if requested.
#[tracing::instrument(level = "info", skip_all, fields(source = %source.display()))]
fn convert_one(
    source: &Path,
    output_dir: &Path,
    layout: Layout,
    delete_original: bool,
) -> Result<FileOutcome> {
    let bytes_in = fs::metadata(source)
        .with_context(|| format!("reading metadata of {:?}", source))?
        .len();

    let records = normalize(parse_file(source, layout)?);
    let rows = records.len() as u64;

    let final_path = output_path_for(source, output_dir)?;
    let tmp_path = final_path.with_extension("parquet.tmp");

    let write_result = (|| -> Result<u64> {
        let schema = Arc::new(record_schema());
        let tmp_file = File::create(&tmp_path)
            .with_context(|| format!("creating temporary Parquet file {:?}", tmp_path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(tmp_file, schema.clone(), Some(props))
            .context("initializing Parquet writer")?;

        for chunk in records.chunks(BATCH_ROWS) {
            let batch = records_to_batch(schema.clone(), chunk)?;
            writer.write(&batch).context("writing batch to Parquet")?;
        }
        if records.is_empty() {
            // Still emit a valid empty file so the year stays discoverable.
            let batch = records_to_batch(schema.clone(), &[])?;
            writer.write(&batch).context("writing empty batch")?;
        }
        writer.close().context("closing Parquet writer")?;

        let bytes_out = fs::metadata(&tmp_path)
            .context("reading output metadata")?
            .len();
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("renaming {:?} to {:?}", tmp_path, final_path))?;
        Ok(bytes_out)
    })();

    // A failed conversion must leave no partial output on disk.
    let bytes_out = match write_result {
        Ok(bytes) => bytes,
        Err(e) => {
            if let Err(rm) = fs::remove_file(&tmp_path) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("could not remove {}: {rm}", tmp_path.display());
                }
            }
            return Err(e);
        }
    };

    info!(
        rows,
        "{}: {:.1} MiB -> {}: {:.1} MiB",
        source.display(),
        bytes_in as f64 / 1024.0 / 1024.0,
        final_path.display(),
        bytes_out as f64 / 1024.0 / 1024.0,
    );

    if delete_original {
        fs::remove_file(source)
            .with_context(|| format!("deleting converted source {:?}", source))?;
        info!("deleted source {}", source.display());
    }

    Ok(FileOutcome::Converted {
        source: source.display().to_string(),
        output: final_path.display().to_string(),
        rows,
        bytes_in,
        bytes_out,
    })
}

/// Convert every `*.txt` file in `source_dir` into a Parquet file in
/// `output_dir`. Per-file failures are recorded and skipped; a missing
/// source directory is fatal; an empty one yields a warning and an
/// empty report.
#[tracing::instrument(level = "info", skip_all, fields(source_dir = %source_dir.as_ref().display()))]
pub fn convert_to_parquet<P: AsRef<Path>, Q: AsRef<Path>>(
    source_dir: P,
    output_dir: Q,
    layout: Layout,
    delete_original: bool,
) -> Result<ConversionReport> {
    let source_dir = source_dir.as_ref();
    let output_dir = output_dir.as_ref();

    if !source_dir.is_dir() {
        bail!("source directory {:?} does not exist", source_dir);
    }
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory {:?}", output_dir))?;

    let pattern = format!("{}/*.txt", source_dir.display());
    let sources: Vec<PathBuf> = glob(&pattern)
        .context("invalid glob pattern for source directory")?
        .filter_map(|entry| entry.ok())
        .collect();

    if sources.is_empty() {
        warn!("no .txt file found in {}", source_dir.display());
        return Ok(ConversionReport::default());
    }

    info!("converting {} TXT files to Parquet", sources.len());

    let mut report = ConversionReport::default();
    for source in &sources {
        match convert_one(source, output_dir, layout, delete_original) {
            Ok(outcome) => report.files.push(outcome),
            Err(e) => {
                error!("conversion of {} failed: {:#}", source.display(), e);
                report.files.push(FileOutcome::Failed {
                    source: source.display().to_string(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    info!(
        successes = report.successes(),
        failures = report.failures(),
        rows = report.total_rows(),
        "conversion sweep complete"
    );
    Ok(report)
}
