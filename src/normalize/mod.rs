// src/normalize/mod.rs
//
// Pure transform from parsed rows to typed rows: date parsing, age at
// death, derived year/month. A malformed row never aborts the batch;
// every absent value is an explicit `None`, never a sentinel.

use crate::parse::{ParsedRecord, Sex};
use chrono::{Datelike, NaiveDate};

/// Ages outside [0, MAX_AGE_YEARS] are treated as implausible and set
/// absent.
pub const MAX_AGE_YEARS: f64 = 140.0;

/// A death record with typed dates and derived fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub nom_prenom: String,
    pub sexe: Sex,
    pub date_naissance: Option<NaiveDate>,
    pub code_lieu_naissance: String,
    pub commune_naissance: String,
    pub pays_naissance: Option<String>,
    pub date_deces: Option<NaiveDate>,
    pub code_lieu_deces: String,
    pub numero_acte: Option<String>,
    pub age_deces: Option<f64>,
    pub annee_deces: Option<i32>,
    pub mois_deces: Option<u32>,
}

/// Fast parse of `"AAAAMMJJ"` → date. Anything that is not exactly
/// eight digits forming a real calendar date yields `None`.
pub fn parse_insee_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Age at death in years, rounded to one decimal (the policy of the
/// historical pipeline). Absent when the age falls outside
/// [0, MAX_AGE_YEARS], which also covers death before birth.
pub fn age_at_death(naissance: NaiveDate, deces: NaiveDate) -> Option<f64> {
    let days = (deces - naissance).num_days();
    let age = (days as f64 / 365.25 * 10.0).round() / 10.0;
    if (0.0..=MAX_AGE_YEARS).contains(&age) {
        Some(age)
    } else {
        None
    }
}

fn opt_trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

pub fn normalize_record(rec: ParsedRecord) -> NormalizedRecord {
    let date_naissance = parse_insee_date(&rec.date_naissance);
    let date_deces = parse_insee_date(&rec.date_deces);

    let age_deces = match (date_naissance, date_deces) {
        (Some(n), Some(d)) => age_at_death(n, d),
        _ => None,
    };

    NormalizedRecord {
        nom_prenom: rec.nom_prenom.trim().to_string(),
        sexe: rec.sexe,
        date_naissance,
        code_lieu_naissance: rec.code_lieu_naissance.trim().to_string(),
        commune_naissance: rec.commune_naissance.trim().to_string(),
        pays_naissance: opt_trimmed(&rec.pays_naissance),
        date_deces,
        code_lieu_deces: rec.code_lieu_deces.trim().to_string(),
        numero_acte: opt_trimmed(&rec.numero_acte),
        age_deces,
        annee_deces: date_deces.map(|d| d.year()),
        mois_deces: date_deces.map(|d| d.month()),
    }
}

/// Normalize a whole batch, preserving cardinality and order.
pub fn normalize(records: Vec<ParsedRecord>) -> Vec<NormalizedRecord> {
    records.into_iter().map(normalize_record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::Layout;

    #[test]
    fn valid_dates_round_trip() {
        for s in ["19650315", "20240229", "19000101", "20991231"] {
            let d = parse_insee_date(s).expect("valid date");
            assert_eq!(d.format("%Y%m%d").to_string(), s);
        }
    }

    #[test]
    fn invalid_dates_are_absent() {
        for s in ["", "00000000", "19651315", "19650230", "1965031", "196503150", "ABCDEFGH"] {
            assert_eq!(parse_insee_date(s), None, "should reject {s:?}");
        }
    }

    #[test]
    fn death_before_birth_yields_absent_age() {
        let naissance = NaiveDate::from_ymd_opt(2000, 6, 1).unwrap();
        let deces = NaiveDate::from_ymd_opt(1990, 6, 1).unwrap();
        assert_eq!(age_at_death(naissance, deces), None);
    }

    #[test]
    fn implausible_ages_are_absent() {
        let naissance = NaiveDate::from_ymd_opt(1850, 1, 1).unwrap();
        let deces = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(age_at_death(naissance, deces), None);

        let naissance = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap();
        let deces = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let age = age_at_death(naissance, deces).expect("plausible age");
        assert!((0.0..=MAX_AGE_YEARS).contains(&age));
    }

    #[test]
    fn same_day_death_is_age_zero() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(age_at_death(d, d), Some(0.0));
    }

    #[test]
    fn concrete_line_yields_age_59_point_3() {
        // Documented policy: round to one decimal.
        let rec = Layout::Pattern
            .parse_line("DUPONT JEAN/1196503150123000012PARIS20240615001")
            .expect("line should match");
        let norm = normalize_record(rec);
        assert_eq!(norm.sexe, Sex::Male);
        assert_eq!(norm.date_naissance, NaiveDate::from_ymd_opt(1965, 3, 15));
        assert_eq!(norm.date_deces, NaiveDate::from_ymd_opt(2024, 6, 15));
        assert_eq!(norm.age_deces, Some(59.3));
        assert_eq!(norm.annee_deces, Some(2024));
        assert_eq!(norm.mois_deces, Some(6));
    }

    #[test]
    fn unparseable_death_date_leaves_derived_fields_absent() {
        let rec = ParsedRecord {
            nom_prenom: "X".into(),
            sexe: Sex::Female,
            date_naissance: "19500601".into(),
            code_lieu_naissance: "29019".into(),
            commune_naissance: "BREST".into(),
            pays_naissance: "   ".into(),
            date_deces: "00000000".into(),
            code_lieu_deces: "29019".into(),
            numero_acte: "".into(),
        };
        let norm = normalize_record(rec);
        assert_eq!(norm.date_deces, None);
        assert_eq!(norm.age_deces, None);
        assert_eq!(norm.annee_deces, None);
        assert_eq!(norm.mois_deces, None);
        assert_eq!(norm.pays_naissance, None);
        assert_eq!(norm.numero_acte, None);
    }

    #[test]
    fn batch_normalization_preserves_cardinality() {
        let recs: Vec<ParsedRecord> = (0..5)
            .map(|i| ParsedRecord {
                nom_prenom: format!("NOM {i}"),
                sexe: Sex::Male,
                date_naissance: "19650315".into(),
                code_lieu_naissance: "01230".into(),
                commune_naissance: "BOURG".into(),
                pays_naissance: String::new(),
                date_deces: "not-a-date".into(),
                code_lieu_deces: "01230".into(),
                numero_acte: "1".into(),
            })
            .collect();
        assert_eq!(normalize(recs).len(), 5);
    }
}
