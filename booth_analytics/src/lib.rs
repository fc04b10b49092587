//! Analytics of polling-station (booth) election data.
//!
//! The pipeline goes from the wide rows of the source spreadsheets to
//! assembly-level figures:
//! * `normalize` and `builder::StationsBuilder` turn the rows into `PollingStation`s
//! * `aggregate` computes the figures of one assembly for one election
//! * `trend` follows the mean shares across elections
//! * `booths` singles out strongholds and weak booths
//! * `access` filters what a user may see
//!
//! Everything is pure and in memory. See the `manual` module for the input formats.

mod config;

pub mod access;
pub mod aggregate;
pub mod booths;
pub mod builder;
pub mod manual;
pub mod normalize;
pub mod trend;

pub use crate::aggregate::{aggregate, aggregate_with};
pub use crate::config::*;
pub use crate::normalize::{normalize, normalize_with};
pub use crate::trend::analyze_trend;

#[cfg(test)]
mod tests {
    use super::builder::StationsBuilder;
    use super::*;
    use serde_json::json;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn single_booth_scenario() {
        init_logger();
        let raw = json!({"AC_1_FINAL": [{"PS_NO_2021": "1", "BJP_2021_pct": 0.4, "DMK_2021_pct": 0.6, "POLLED_2021": 800}]});
        let mut builder = StationsBuilder::new(&NormalizeOptions::default());
        builder.add_records("1", raw["AC_1_FINAL"].as_array().unwrap());
        let (stations, report) = builder.build();
        assert!(report.skipped.is_empty());

        let summary = aggregate(&stations, 2021);
        assert_eq!(summary.total_polled, 800);
        let table: Vec<(&str, f64)> = summary
            .party_shares
            .iter()
            .map(|ps| (ps.party.as_str(), ps.share_pct))
            .collect();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].0, "DMK");
        assert!((table[0].1 - 60.0).abs() < 1e-9);
        assert_eq!(table[1].0, "BJP");
        assert!((table[1].1 - 40.0).abs() < 1e-9);
    }

    #[test]
    fn assembly_pipeline() {
        init_logger();
        let rows = [
            json!({"PS_NO_2021": "1", "POLLED_2021": 500, "BJP_2021_pct": 45, "DMK_2021_pct": 40, "OTHERS_2021_pct": 15,
                   "BJP_2016_pct": 30, "DMK_2016_pct": 50, "OTHERS_2016_pct": 15, "TOP_SCORE_PARTY": "BJP (A)"}),
            json!({"PS_NO_2021": "2", "POLLED_2021": 300, "BJP_2021_pct": 20, "DMK_2021_pct": 70, "OTHERS_2021_pct": 10,
                   "BJP_2016_pct": 10, "DMK_2016_pct": 80, "OTHERS_2016_pct": 10, "TOP_SCORE_PARTY": "DMK"}),
        ];
        let options = NormalizeOptions {
            id_convention: IdConvention::Auto,
            ..Default::default()
        };
        let mut builder = StationsBuilder::new(&options);
        builder.add_records("5", &rows);
        let (stations, _) = builder.build();

        let summary = aggregate(&stations, 2021);
        let total: f64 = summary.party_shares.iter().map(|ps| ps.share_pct).sum();
        assert!((total - 100.0).abs() < 0.5);
        assert_eq!(summary.booth_wins.len(), 2);

        let trend = analyze_trend(&stations, &[2016, 2021]);
        assert!(trend.swing(2016, 2021, "BJP").unwrap() > 0.0);
        assert!(trend.swing(2016, 2021, "DMK").unwrap() < 0.0);
        assert_eq!(trend.swing(2016, 2021, "OTHERS"), None);

        let user = UserProfile {
            role: Role::Client,
            accessible_assemblies: Some(vec!["5".to_string()]),
            ..Default::default()
        };
        let all = vec![Assembly::new("4", "Mudaliarpet"), Assembly::new("5", "Oulgaret")];
        let visible = access::visible_assemblies(&user, &all);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "5");
    }
}
