// src/store/mod.rs
//
// Read side of the columnar store: discover per-year Parquet files by
// filename, load only the requested years, and merge them into one
// in-memory columnar table. Filenames are authoritative for the year.

use crate::parse::Sex;
use anyhow::{Context, Result};
use arrow::array::{Array, Date32Array, Float64Array, Int32Array, StringArray};
use arrow::datatypes::Date32Type;
use chrono::NaiveDate;
use glob::glob;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Columns the accessor reads from each Parquet file. The stored year
/// column is deliberately absent: the year is taken from the filename.
const LOADED_COLUMNS: [&str; 11] = [
    "nom_prenom",
    "sexe",
    "date_naissance",
    "code_lieu_naissance",
    "commune_naissance",
    "pays_naissance",
    "date_deces",
    "code_lieu_deces",
    "numero_acte",
    "age_deces",
    "mois_deces",
];

/// In-memory union of the loaded columnar files, one Vec per
/// column. Never mutated after construction; the query layer copies
/// what it selects.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Dataset {
    pub nom_prenom: Vec<String>,
    pub sexe: Vec<Option<Sex>>,
    pub date_naissance: Vec<Option<NaiveDate>>,
    pub code_lieu_naissance: Vec<String>,
    pub commune_naissance: Vec<String>,
    pub pays_naissance: Vec<Option<String>>,
    pub date_deces: Vec<Option<NaiveDate>>,
    pub code_lieu_deces: Vec<String>,
    pub numero_acte: Vec<Option<String>>,
    pub age_deces: Vec<Option<f64>>,
    /// Year of death, tagged from the source filename.
    pub annee_deces: Vec<i32>,
    pub mois_deces: Vec<Option<u32>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.annee_deces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annee_deces.is_empty()
    }
}

/// First 4-digit run in the stem that looks like a calendar year.
fn year_from_filename(stem: &str) -> Option<i32> {
    let bytes = stem.as_bytes();
    for i in 0..bytes.len().saturating_sub(3) {
        if bytes[i..i + 4].iter().all(|b| b.is_ascii_digit()) {
            // Skip runs longer than four digits.
            if i > 0 && bytes[i - 1].is_ascii_digit() {
                continue;
            }
            if bytes.get(i + 4).is_some_and(|b| b.is_ascii_digit()) {
                continue;
            }
            let year: i32 = stem[i..i + 4].parse().ok()?;
            if (1900..=2100).contains(&year) {
                return Some(year);
            }
        }
    }
    None
}

/// Every `(year, path)` pair in `dir`, sorted by year then path.
/// Filenames without a recognizable year are ignored.
fn discover<P: AsRef<Path>>(dir: P) -> Result<Vec<(i32, PathBuf)>> {
    let pattern = format!("{}/*.parquet", dir.as_ref().display());
    let mut found = Vec::new();
    for entry in glob(&pattern).context("invalid glob pattern for store directory")? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!("cannot read glob entry: {e}");
                continue;
            }
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match year_from_filename(stem) {
            Some(year) => found.push((year, path)),
            None => warn!("ignoring file without year in name: {}", path.display()),
        }
    }
    found.sort();
    Ok(found)
}

/// Years available in `dir`, ascending, derived purely from filenames.
pub fn available_years<P: AsRef<Path>>(dir: P) -> Result<Vec<i32>> {
    let years: BTreeSet<i32> = discover(dir)?.into_iter().map(|(y, _)| y).collect();
    Ok(years.into_iter().collect())
}

fn string_column<'a>(
    batch: &'a arrow::record_batch::RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .with_context(|| format!("column `{name}` missing or mistyped in {path:?}"))
}

fn date_column<'a>(
    batch: &'a arrow::record_batch::RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a Date32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Date32Array>())
        .with_context(|| format!("column `{name}` missing or mistyped in {path:?}"))
}

fn load_file(path: &Path, year: i32, dataset: &mut Dataset) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("opening Parquet file {:?}", path))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading Parquet metadata of {:?}", path))?;

    let indices: Vec<usize> = builder
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| LOADED_COLUMNS.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
    let reader = builder
        .with_projection(mask)
        .with_batch_size(8_192)
        .build()
        .with_context(|| format!("building Parquet reader for {:?}", path))?;

    for batch in reader {
        let batch = batch.with_context(|| format!("reading batch from {:?}", path))?;
        let nom = string_column(&batch, "nom_prenom", path)?;
        let sexe = string_column(&batch, "sexe", path)?;
        let naissance = date_column(&batch, "date_naissance", path)?;
        let code_naissance = string_column(&batch, "code_lieu_naissance", path)?;
        let commune = string_column(&batch, "commune_naissance", path)?;
        let pays = string_column(&batch, "pays_naissance", path)?;
        let deces = date_column(&batch, "date_deces", path)?;
        let code_deces = string_column(&batch, "code_lieu_deces", path)?;
        let acte = string_column(&batch, "numero_acte", path)?;
        let age = batch
            .column_by_name("age_deces")
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .with_context(|| format!("column `age_deces` missing or mistyped in {:?}", path))?;
        let mois = batch
            .column_by_name("mois_deces")
            .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
            .with_context(|| format!("column `mois_deces` missing or mistyped in {:?}", path))?;

        for i in 0..batch.num_rows() {
            dataset.nom_prenom.push(nom.value(i).to_string());
            dataset.sexe.push(if sexe.is_null(i) {
                None
            } else {
                Sex::from_code(sexe.value(i))
            });
            dataset
                .date_naissance
                .push((!naissance.is_null(i)).then(|| Date32Type::to_naive_date(naissance.value(i))));
            dataset
                .code_lieu_naissance
                .push(code_naissance.value(i).to_string());
            dataset.commune_naissance.push(commune.value(i).to_string());
            dataset
                .pays_naissance
                .push((!pays.is_null(i)).then(|| pays.value(i).to_string()));
            dataset
                .date_deces
                .push((!deces.is_null(i)).then(|| Date32Type::to_naive_date(deces.value(i))));
            dataset.code_lieu_deces.push(code_deces.value(i).to_string());
            dataset
                .numero_acte
                .push((!acte.is_null(i)).then(|| acte.value(i).to_string()));
            dataset
                .age_deces
                .push((!age.is_null(i)).then(|| age.value(i)));
            // Filename year wins over whatever the file stored.
            dataset.annee_deces.push(year);
            dataset
                .mois_deces
                .push((!mois.is_null(i)).then(|| mois.value(i) as u32));
        }
    }
    Ok(())
}

/// Load the columnar files of `dir` into one `Dataset`. With
/// `years = None` every file is loaded; otherwise only matching years
/// (missing years are skipped silently). An empty directory yields an
/// empty dataset, not an error.
#[tracing::instrument(level = "info", skip_all, fields(dir = %dir.as_ref().display()))]
pub fn load<P: AsRef<Path>>(dir: P, years: Option<&BTreeSet<i32>>) -> Result<Dataset> {
    let mut dataset = Dataset::default();
    let mut files = 0usize;

    for (year, path) in discover(&dir)? {
        if let Some(wanted) = years {
            if !wanted.contains(&year) {
                continue;
            }
        }
        load_file(&path, year, &mut dataset)?;
        files += 1;
    }

    if files == 0 {
        warn!("no matching Parquet file in {}", dir.as_ref().display());
    } else {
        info!(files, rows = dataset.len(), "loaded columnar store");
    }
    Ok(dataset)
}

/// Read-through cache keyed by `(directory, requested years)`. The
/// store directory is treated as append-only within a process
/// lifetime, so entries are never invalidated.
#[derive(Debug, Default)]
pub struct StoreCache {
    inner: Mutex<HashMap<(PathBuf, Option<BTreeSet<i32>>), Arc<Dataset>>>,
}

impl StoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(
        &self,
        dir: P,
        years: Option<&BTreeSet<i32>>,
    ) -> Result<Arc<Dataset>> {
        let key = (dir.as_ref().to_path_buf(), years.cloned());
        if let Some(hit) = self.inner.lock().unwrap().get(&key) {
            return Ok(Arc::clone(hit));
        }
        let dataset = Arc::new(load(&dir, years)?);
        self.inner
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&dataset));
        Ok(dataset)
    }
}
