// src/query/mod.rs
//
// Dashboard-facing filtering and aggregation over a loaded `Dataset`.
// Filtering copies the selected rows into a `FilteredView`; the source
// dataset is never mutated. Sampling above the row cap is seeded, so
// the same predicates over the same dataset always show the same rows.

use crate::parse::Sex;
use crate::store::Dataset;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Seed of the historical dashboard sampling.
pub const DEFAULT_SAMPLE_SEED: u64 = 42;

/// Filter predicates. `None` means "no constraint" for that
/// dimension; `age_range` bounds are inclusive.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub years: Option<BTreeSet<i32>>,
    pub sexes: Option<BTreeSet<Sex>>,
    pub age_range: Option<(f64, f64)>,
    pub sample_cap: Option<usize>,
    pub sample_seed: u64,
}

impl Default for FilterSpec {
    fn default() -> Self {
        FilterSpec {
            years: None,
            sexes: None,
            age_range: None,
            sample_cap: None,
            sample_seed: DEFAULT_SAMPLE_SEED,
        }
    }
}

/// Rows selected by one `filter` call, in dataset order. Carries every
/// record column so a dashboard can render full sample rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredView {
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
    pub annee_deces: Vec<i32>,
    pub mois_deces: Vec<Option<u32>>,
    /// Rows matching the predicates before the sampling cap.
    pub matched: usize,
    /// True when the cap forced a sub-sample.
    pub sampled: bool,
}

impl FilteredView {
    pub fn len(&self) -> usize {
        self.annee_deces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annee_deces.is_empty()
    }
}

fn row_matches(dataset: &Dataset, i: usize, spec: &FilterSpec) -> bool {
    if let Some(years) = &spec.years {
        if !years.contains(&dataset.annee_deces[i]) {
            return false;
        }
    }
    if let Some(sexes) = &spec.sexes {
        // A row without a sex code never matches a sex predicate.
        match dataset.sexe[i] {
            Some(s) if sexes.contains(&s) => {}
            _ => return false,
        }
    }
    if let Some((lo, hi)) = spec.age_range {
        match dataset.age_deces[i] {
            Some(age) if age >= lo && age <= hi => {}
            _ => return false,
        }
    }
    true
}

/// Apply `spec` to `dataset`. When the match count exceeds
/// `sample_cap`, a seeded sample without replacement is drawn and
/// re-ordered to dataset order, so repeated calls are identical.
pub fn filter(dataset: &Dataset, spec: &FilterSpec) -> FilteredView {
    let mut indices: Vec<usize> = (0..dataset.len())
        .filter(|&i| row_matches(dataset, i, spec))
        .collect();
    let matched = indices.len();

    let mut sampled = false;
    if let Some(cap) = spec.sample_cap {
        if matched > cap {
            let mut rng = StdRng::seed_from_u64(spec.sample_seed);
            let mut picked = rand::seq::index::sample(&mut rng, matched, cap).into_vec();
            picked.sort_unstable();
            indices = picked.into_iter().map(|p| indices[p]).collect();
            sampled = true;
            debug!(matched, cap, "sub-sampled filtered rows");
        }
    }

    let mut view = FilteredView {
        matched,
        sampled,
        ..FilteredView::default()
    };
    for i in indices {
        view.nom_prenom.push(dataset.nom_prenom[i].clone());
        view.sexe.push(dataset.sexe[i]);
        view.date_naissance.push(dataset.date_naissance[i]);
        view.code_lieu_naissance
            .push(dataset.code_lieu_naissance[i].clone());
        view.commune_naissance
            .push(dataset.commune_naissance[i].clone());
        view.pays_naissance.push(dataset.pays_naissance[i].clone());
        view.date_deces.push(dataset.date_deces[i]);
        view.code_lieu_deces
            .push(dataset.code_lieu_deces[i].clone());
        view.numero_acte.push(dataset.numero_acte[i].clone());
        view.age_deces.push(dataset.age_deces[i]);
        view.annee_deces.push(dataset.annee_deces[i]);
        view.mois_deces.push(dataset.mois_deces[i]);
    }
    view
}

/// One histogram bucket over `[lower, upper)`.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Histogram of ages at death with buckets of `bin_width` years,
/// starting at zero, in ascending order. Absent ages are skipped; a
/// non-positive bin width yields no bins rather than panicking.
pub fn age_histogram(view: &FilteredView, bin_width: f64) -> Vec<HistogramBin> {
    if bin_width.is_nan() || bin_width <= 0.0 {
        return Vec::new();
    }

    let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
    for age in view.age_deces.iter().flatten() {
        let bin = (age / bin_width).floor() as u64;
        *counts.entry(bin).or_default() += 1;
    }

    let last = match counts.keys().next_back() {
        Some(&b) => b,
        None => return Vec::new(),
    };
    (0..=last)
        .map(|b| HistogramBin {
            lower: b as f64 * bin_width,
            upper: (b + 1) as f64 * bin_width,
            count: counts.get(&b).copied().unwrap_or(0),
        })
        .collect()
}

/// Death counts grouped by (year, sex), ascending by year.
pub fn deaths_by_year_and_sex(view: &FilteredView) -> BTreeMap<(i32, Sex), u64> {
    let mut counts = BTreeMap::new();
    for (year, sexe) in view.annee_deces.iter().zip(&view.sexe) {
        if let Some(s) = sexe {
            *counts.entry((*year, *s)).or_default() += 1;
        }
    }
    counts
}

/// Death counts grouped by (month, sex), in calendar order. Rows with
/// an absent month are skipped.
pub fn deaths_by_month_and_sex(view: &FilteredView) -> BTreeMap<(u32, Sex), u64> {
    let mut counts = BTreeMap::new();
    for (mois, sexe) in view.mois_deces.iter().zip(&view.sexe) {
        if let (Some(m), Some(s)) = (mois, sexe) {
            *counts.entry((*m, *s)).or_default() += 1;
        }
    }
    counts
}

/// Month names in calendar order, for seasonal charts.
pub const MONTH_NAMES: [&str; 12] = [
    "Janvier",
    "Février",
    "Mars",
    "Avril",
    "Mai",
    "Juin",
    "Juillet",
    "Août",
    "Septembre",
    "Octobre",
    "Novembre",
    "Décembre",
];

pub fn month_name(month: u32) -> Option<&'static str> {
    MONTH_NAMES.get(month.checked_sub(1)? as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_dataset(rows: usize) -> Dataset {
        let mut ds = Dataset::default();
        for i in 0..rows {
            ds.nom_prenom.push(format!("NOM {i}"));
            ds.sexe.push(Some(if i % 2 == 0 { Sex::Male } else { Sex::Female }));
            ds.date_naissance
                .push(NaiveDate::from_ymd_opt(1950, 1, 1));
            ds.code_lieu_naissance.push("01230".to_string());
            ds.commune_naissance.push("BOURG".to_string());
            ds.pays_naissance.push(None);
            ds.date_deces
                .push(NaiveDate::from_ymd_opt(2020 + (i % 5) as i32, 6, 15));
            ds.code_lieu_deces.push("69123".to_string());
            ds.numero_acte.push(Some(format!("{i}")));
            ds.age_deces.push(if i % 10 == 9 {
                None
            } else {
                Some((i % 100) as f64)
            });
            ds.annee_deces.push(2020 + (i % 5) as i32);
            ds.mois_deces.push(Some((i % 12) as u32 + 1));
        }
        ds
    }

    #[test]
    fn filtering_never_mutates_the_dataset() {
        let ds = synthetic_dataset(100);
        let before = ds.clone();
        let _ = filter(
            &ds,
            &FilterSpec {
                years: Some([2021].into_iter().collect()),
                ..FilterSpec::default()
            },
        );
        assert_eq!(ds, before);
    }

    #[test]
    fn predicates_compose() {
        let ds = synthetic_dataset(1000);
        let view = filter(
            &ds,
            &FilterSpec {
                years: Some([2021, 2023].into_iter().collect()),
                sexes: Some([Sex::Female].into_iter().collect()),
                age_range: Some((10.0, 60.0)),
                ..FilterSpec::default()
            },
        );
        assert!(!view.is_empty());
        assert!(view.annee_deces.iter().all(|y| *y == 2021 || *y == 2023));
        assert!(view.sexe.iter().all(|s| *s == Some(Sex::Female)));
        assert!(view
            .age_deces
            .iter()
            .all(|a| a.is_some_and(|a| (10.0..=60.0).contains(&a))));
        assert_eq!(view.matched, view.len());
        assert!(!view.sampled);
    }

    #[test]
    fn absent_age_never_matches_an_age_predicate() {
        let ds = synthetic_dataset(100);
        let view = filter(
            &ds,
            &FilterSpec {
                age_range: Some((0.0, 140.0)),
                ..FilterSpec::default()
            },
        );
        assert!(view.age_deces.iter().all(Option::is_some));
        assert_eq!(view.len(), 90);
    }

    #[test]
    fn sampling_is_deterministic_and_order_preserving() {
        let ds = synthetic_dataset(10_000);
        let spec = FilterSpec {
            sample_cap: Some(2_000),
            ..FilterSpec::default()
        };

        let a = filter(&ds, &spec);
        let b = filter(&ds, &spec);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2_000);
        assert_eq!(a.matched, 10_000);
        assert!(a.sampled);

        // A different seed draws a different sample.
        let other = filter(
            &ds,
            &FilterSpec {
                sample_seed: 7,
                ..spec
            },
        );
        assert_ne!(a, other);
    }

    #[test]
    fn cap_above_match_count_does_not_sample() {
        let ds = synthetic_dataset(100);
        let view = filter(
            &ds,
            &FilterSpec {
                sample_cap: Some(1_000),
                ..FilterSpec::default()
            },
        );
        assert_eq!(view.len(), 100);
        assert!(!view.sampled);
    }

    #[test]
    fn filtered_view_carries_full_sample_rows() {
        let ds = synthetic_dataset(50);
        let view = filter(
            &ds,
            &FilterSpec {
                years: Some([2022].into_iter().collect()),
                ..FilterSpec::default()
            },
        );
        assert_eq!(view.len(), 10);
        assert_eq!(view.nom_prenom[0], "NOM 2");
        assert_eq!(view.commune_naissance[0], "BOURG");
        assert_eq!(view.numero_acte[0], Some("2".to_string()));
        assert_eq!(
            view.date_naissance[0],
            NaiveDate::from_ymd_opt(1950, 1, 1)
        );
        assert_eq!(
            view.date_deces[0],
            NaiveDate::from_ymd_opt(2022, 6, 15)
        );
    }

    #[test]
    fn non_positive_bin_width_yields_no_bins() {
        let ds = synthetic_dataset(100);
        let view = filter(&ds, &FilterSpec::default());
        assert!(age_histogram(&view, 0.0).is_empty());
        assert!(age_histogram(&view, -5.0).is_empty());
        assert!(age_histogram(&view, f64::NAN).is_empty());
        assert!(!age_histogram(&view, 10.0).is_empty());
    }

    #[test]
    fn histogram_bins_are_ordered_and_complete() {
        let ds = synthetic_dataset(1000);
        let view = filter(&ds, &FilterSpec::default());
        let bins = age_histogram(&view, 10.0);

        assert_eq!(bins.len(), 10);
        assert!(bins.windows(2).all(|w| w[0].upper == w[1].lower));
        let total: u64 = bins.iter().map(|b| b.count).sum();
        let present = view.age_deces.iter().flatten().count() as u64;
        assert_eq!(total, present);
    }

    #[test]
    fn grouped_counts_by_year_and_sex() {
        let ds = synthetic_dataset(1000);
        let view = filter(&ds, &FilterSpec::default());
        let counts = deaths_by_year_and_sex(&view);

        assert_eq!(counts.len(), 10); // 5 years x 2 sexes
        assert_eq!(counts.values().sum::<u64>(), 1000);
        assert_eq!(counts[&(2020, Sex::Male)], 100);
    }

    #[test]
    fn end_to_end_txt_to_filtered_aggregates() {
        use crate::convert::convert_to_parquet;
        use crate::parse::Layout;
        use crate::store;
        use std::io::Write;

        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for year in [2020, 2021] {
            let mut f =
                std::fs::File::create(src.path().join(format!("deces_{year}.txt"))).unwrap();
            writeln!(f, "DUPONT JEAN/1196503150123000012PARIS{year}0615001").unwrap();
            writeln!(f, "MARTIN*LOUISE/2193402127511200012PARIS{year}0103").unwrap();
        }

        let report = convert_to_parquet(src.path(), out.path(), Layout::Pattern, false).unwrap();
        assert_eq!(report.successes(), 2);

        let wanted: BTreeSet<i32> = [2021].into_iter().collect();
        let ds = store::load(out.path(), Some(&wanted)).unwrap();
        assert_eq!(ds.len(), 2);

        let view = filter(
            &ds,
            &FilterSpec {
                sexes: Some([Sex::Female].into_iter().collect()),
                ..FilterSpec::default()
            },
        );
        assert_eq!(view.len(), 1);
        assert_eq!(view.annee_deces, vec![2021]);
        assert_eq!(view.mois_deces, vec![Some(1)]);

        let counts = deaths_by_year_and_sex(&view);
        assert_eq!(counts[&(2021, Sex::Female)], 1);
    }

    #[test]
    fn month_names_follow_calendar_order() {
        assert_eq!(month_name(1), Some("Janvier"));
        assert_eq!(month_name(6), Some("Juin"));
        assert_eq!(month_name(12), Some("Décembre"));
        assert_eq!(month_name(0), None);
        assert_eq!(month_name(13), None);

        let ds = synthetic_dataset(240);
        let view = filter(&ds, &FilterSpec::default());
        let counts = deaths_by_month_and_sex(&view);
        let months: Vec<u32> = counts.keys().map(|(m, _)| *m).collect();
        let mut sorted = months.clone();
        sorted.sort_unstable();
        assert_eq!(months, sorted);
    }
}
