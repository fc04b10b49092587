//! Assembly-level statistics for one election.
//!
//! Two aggregations of the party performance live side by side:
//! * the party table weights each booth share by the votes polled in the booth
//! * the booth wins count one per booth for its strongest party
//!
//! Different views of the dashboard use one or the other.

use log::{debug, info};
use std::cmp::Ordering;

use crate::config::*;

pub fn aggregate(stations: &[PollingStation], year: u32) -> AssemblySummary {
    aggregate_with(stations, year, &AggregateOptions::default())
}

/// Computes the statistics of a set of stations (usually one assembly) for one year.
///
/// Stations that have no result for the year contribute nothing to the vote
/// counts, but they are still counted in the categories and the booth wins.
///
/// The party table is sorted by votes. Parties with exactly the same votes are
/// listed in the order of the first station reporting them, and by label
/// among the parties of that station.
pub fn aggregate_with(
    stations: &[PollingStation],
    year: u32,
    options: &AggregateOptions,
) -> AssemblySummary {
    let results: Vec<&ElectionResult> = stations.iter().filter_map(|ps| ps.result(year)).collect();
    let total_polled: u64 = results.iter().map(|r| r.polled()).sum();
    let electorate = electorate(&results, total_polled, options);
    let turnout_pct = percent(total_polled as f64, electorate.count as f64);
    let party_shares = party_shares(&results, total_polled);
    debug!(
        "aggregate_with: year {}: {} parties over {} reporting stations",
        year,
        party_shares.len(),
        results.len()
    );

    let summary = AssemblySummary {
        year,
        total_stations: stations.len(),
        reporting_stations: results.len(),
        mapped_stations: stations
            .iter()
            .filter(|ps| ps.coordinates().is_some())
            .count(),
        total_polled,
        electorate,
        turnout_pct,
        party_shares,
        categories: category_counts(stations),
        booth_wins: booth_wins(stations),
    };
    info!(
        "aggregate_with: year {}: {} stations, {} votes polled, turnout {:.2}%",
        year, summary.total_stations, summary.total_polled, summary.turnout_pct
    );
    summary
}

fn electorate(
    results: &[&ElectionResult],
    total_polled: u64,
    options: &AggregateOptions,
) -> Electorate {
    if results.iter().any(|r| r.electors.is_some()) {
        return Electorate {
            count: results.iter().filter_map(|r| r.electors).sum(),
            source: ElectorateSource::VoterRoll,
        };
    }
    let rate = options.assumed_turnout_rate;
    let count = if rate.is_finite() && rate > 0.0 {
        (total_polled as f64 / rate).round() as u64
    } else {
        0
    };
    Electorate {
        count,
        source: ElectorateSource::Estimated {
            assumed_turnout_rate: rate,
        },
    }
}

fn party_shares(results: &[&ElectionResult], total_polled: u64) -> Vec<PartyShare> {
    // Exact ties keep the order parties are first met in: station order, then
    // party label within a station, as the candidates map is sorted by label.
    let mut shares: Vec<PartyShare> = Vec::new();
    for r in results.iter() {
        let polled = r.polled() as f64;
        for (party, share) in r.candidates.iter() {
            let votes = polled * share;
            match shares.iter_mut().find(|ps| &ps.party == party) {
                Some(ps) => ps.votes += votes,
                None => shares.push(PartyShare {
                    party: party.clone(),
                    votes,
                    share_pct: 0.0,
                }),
            }
        }
    }
    for ps in shares.iter_mut() {
        ps.share_pct = percent(ps.votes, total_polled as f64);
    }
    shares.sort_by(|a, b| b.votes.partial_cmp(&a.votes).unwrap_or(Ordering::Equal));
    shares
}

fn category_counts(stations: &[PollingStation]) -> Vec<CategoryCount> {
    let mut counts: Vec<CategoryCount> = Vec::new();
    for ps in stations.iter() {
        let category = match ps.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => UNKNOWN_CATEGORY,
        };
        match counts.iter_mut().find(|cc| cc.category == category) {
            Some(cc) => cc.stations += 1,
            None => counts.push(CategoryCount {
                category: category.to_string(),
                stations: 1,
            }),
        }
    }
    counts
}

fn booth_wins(stations: &[PollingStation]) -> Vec<BoothWins> {
    let mut wins: Vec<BoothWins> = Vec::new();
    for ps in stations.iter() {
        let party = match ps.strongest_party.as_deref().and_then(leading_label) {
            Some(p) => p,
            None => continue,
        };
        match wins.iter_mut().find(|w| w.party == party) {
            Some(w) => w.booths += 1,
            None => wins.push(BoothWins {
                party: party.to_string(),
                booths: 1,
                pct: 0.0,
            }),
        }
    }
    for w in wins.iter_mut() {
        w.pct = percent(w.booths as f64, stations.len() as f64);
    }
    wins
}

/// The party in a strongest-party label: `"BJP (A)"` counts for `BJP`.
pub fn leading_label(label: &str) -> Option<&str> {
    label
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|s| !s.is_empty())
}

/// `num / den * 100`, or 0 when the denominator is zero.
pub(crate) fn percent(num: f64, den: f64) -> f64 {
    if den > 0.0 && num.is_finite() {
        num / den * 100.0
    } else {
        0.0
    }
}
