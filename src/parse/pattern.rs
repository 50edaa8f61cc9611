// src/parse/pattern.rs
//
// Positional pattern for the compact export variant: name block ended
// by '/', one sex code, 8-digit birth date, 5-digit birth place code,
// place-name block, 8-digit death date, then an optional 5-digit death
// place code and optional act number. Lines that do not match exactly
// are dropped; this is a lossy filter, not an error.

use super::{ParsedRecord, Sex};
use once_cell::sync::Lazy;
use regex::Regex;

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?P<nom>[A-ZÀ-ÖØ-Þ' \-*]+)/",
        r"(?P<sexe>[12])",
        r"(?P<naissance>\d{8})",
        r"(?P<code_naissance>\d{5})",
        r"(?P<commune>.*?)",
        r"(?P<deces>\d{8})",
        r"(?P<code_deces>\d{5})?",
        r"(?P<acte>\d{0,9})$",
    ))
    .expect("valid death record pattern")
});

pub fn parse_line(line: &str) -> Option<ParsedRecord> {
    let caps = LINE_RE.captures(line)?;

    let sexe = Sex::from_code(&caps["sexe"])?;
    let group = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    };

    Some(ParsedRecord {
        nom_prenom: caps["nom"].to_string(),
        sexe,
        date_naissance: caps["naissance"].to_string(),
        code_lieu_naissance: caps["code_naissance"].to_string(),
        commune_naissance: caps["commune"].to_string(),
        // The compact variant never carries the country column.
        pays_naissance: String::new(),
        date_deces: caps["deces"].to_string(),
        code_lieu_deces: group("code_deces"),
        numero_acte: group("acte"),
    })
}
