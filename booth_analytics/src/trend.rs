use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;

// Swings below this many points read as 0.00 and are dropped.
const MIN_SWING: f64 = 0.005;

/// Mean booth shares per election, and the swings between consecutive elections.
///
/// The mean is a plain average over all the stations: a booth where the party
/// got no share (or that has no result) counts as zero, and the booths are not
/// weighted by their votes. This differs from the party table of
/// `aggregate`, which is vote-weighted.
///
/// Every party seen in any year appears in every year of the series, with a
/// zero mean where it got nothing.
///
/// Swings are only computed between consecutive years of `years`, in
/// percentage points. A swing that shows as 0.00 at two decimals is not
/// reported.
pub fn analyze_trend(stations: &[PollingStation], years: &[u32]) -> TrendReport {
    let mut years: Vec<u32> = years.to_vec();
    years.sort_unstable();
    years.dedup();

    let mut series: Vec<YearSeries> = years
        .iter()
        .map(|year| YearSeries {
            year: *year,
            shares: mean_shares(stations, *year),
        })
        .collect();
    let parties: BTreeSet<String> = series
        .iter()
        .flat_map(|ys| ys.shares.keys().cloned())
        .collect();
    for ys in series.iter_mut() {
        for party in parties.iter() {
            ys.shares.entry(party.clone()).or_insert(0.0);
        }
    }

    if stations.is_empty() {
        return TrendReport {
            series,
            swings: Vec::new(),
        };
    }

    let swings: Vec<SwingPeriod> = series
        .windows(2)
        .map(|w| swing_period(&w[0], &w[1]))
        .collect();
    debug!(
        "analyze_trend: {} stations, {} years, {} swing periods",
        stations.len(),
        series.len(),
        swings.len()
    );
    TrendReport { series, swings }
}

fn mean_shares(stations: &[PollingStation], year: u32) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    for r in stations.iter().filter_map(|ps| ps.result(year)) {
        for (party, share) in r.candidates.iter() {
            *sums.entry(party.clone()).or_insert(0.0) += share;
        }
    }
    let n = stations.len() as f64;
    sums.into_iter()
        .map(|(party, sum)| (party, sum / n * 100.0))
        .collect()
}

fn swing_period(before: &YearSeries, after: &YearSeries) -> SwingPeriod {
    let parties: BTreeSet<&String> = before.shares.keys().chain(after.shares.keys()).collect();
    let swings: Vec<PartySwing> = parties
        .into_iter()
        .filter_map(|party| {
            let b = before.shares.get(party).cloned().unwrap_or(0.0);
            let a = after.shares.get(party).cloned().unwrap_or(0.0);
            let swing = a - b;
            if swing.abs() < MIN_SWING {
                None
            } else {
                Some(PartySwing {
                    party: party.clone(),
                    swing,
                })
            }
        })
        .collect();
    SwingPeriod {
        from: before.year,
        to: after.year,
        swings,
    }
}
