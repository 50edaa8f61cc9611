// src/parse/mod.rs

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub mod fixed;
pub mod pattern;

/// Sex code as it appears in the INSEE export ("1" / "2"). The raw
/// code is what gets stored; label mapping is a presentation concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(Sex::Male),
            "2" => Some(Sex::Female),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Sex::Male => "1",
            Sex::Female => "2",
        }
    }
}

/// One death record as extracted from a raw line. Fields are kept as
/// raw strings (padding included); the normalizer trims and types them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    pub nom_prenom: String,
    pub sexe: Sex,
    pub date_naissance: String,
    pub code_lieu_naissance: String,
    pub commune_naissance: String,
    pub pays_naissance: String,
    pub date_deces: String,
    pub code_lieu_deces: String,
    pub numero_acte: String,
}

/// Layout strategy for one source file. The INSEE exports come in two
/// shapes: the canonical fixed-width form and a compact variant that
/// needs positional pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    FixedWidth,
    Pattern,
}

impl Layout {
    /// Extract a record from one raw line, or `None` if the line does
    /// not match the layout. Non-matching lines carry no partial data.
    pub fn parse_line(self, line: &str) -> Option<ParsedRecord> {
        match self {
            Layout::FixedWidth => fixed::parse_line(line),
            Layout::Pattern => pattern::parse_line(line),
        }
    }
}

/// Read every line of `path` under `layout`. Undecodable bytes are
/// replaced rather than aborting the file; lines that do not match the
/// layout are dropped silently (counted, logged at debug).
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn parse_file<P: AsRef<Path>>(path: P, layout: Layout) -> Result<Vec<ParsedRecord>> {
    let bytes = fs::read(path.as_ref())
        .with_context(|| format!("reading death record file {:?}", path.as_ref()))?;
    let text = String::from_utf8_lossy(&bytes);

    let mut records = Vec::new();
    let mut lines = 0u64;
    let mut skipped = 0u64;

    for line in text.lines() {
        lines += 1;
        match layout.parse_line(line) {
            Some(record) => records.push(record),
            None => {
                skipped += 1;
                debug!(line_no = lines, "line does not match layout; dropped");
            }
        }
    }

    info!(
        lines,
        matched = records.len(),
        skipped,
        "parsed death record file"
    );
    Ok(records)
}
