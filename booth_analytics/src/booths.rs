//! Booths singled out for a party: strongholds ("retro booths"), weak booths
//! and hotspots of independent candidates.
//!
//! All shares are fractions (0-1), as in `ElectionResult`.

use log::debug;
use std::cmp::Ordering;

use crate::config::*;

/// What makes a booth a stronghold of a party.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct RetroCriteria {
    pub latest_year: u32,
    /// The share of the party in `latest_year` must be strictly above this.
    pub latest_threshold: f64,
    /// When the booth also has a share for the party in this year, it must be
    /// strictly above `previous_threshold`.
    pub previous_year: Option<u32>,
    pub previous_threshold: f64,
}

impl RetroCriteria {
    pub const DEFAULT: RetroCriteria = RetroCriteria {
        latest_year: 2021,
        latest_threshold: 0.4,
        previous_year: Some(2016),
        previous_threshold: 0.3,
    };
}

impl Default for RetroCriteria {
    fn default() -> Self {
        RetroCriteria::DEFAULT
    }
}

/// The booths that are strongholds of some party, in input order.
///
/// A booth that qualifies for several parties is reported once, for the party
/// with the highest share.
pub fn retro_booths(stations: &[PollingStation], criteria: &RetroCriteria) -> Vec<FlaggedBooth> {
    let res: Vec<FlaggedBooth> = stations
        .iter()
        .filter_map(|ps| {
            let latest = ps.result(criteria.latest_year)?;
            let (party, score) = latest
                .candidates
                .iter()
                .filter(|(_, share)| **share > criteria.latest_threshold)
                .filter(|(party, _)| {
                    match criteria.previous_year.and_then(|y| ps.share(party, y)) {
                        Some(prev) => prev > criteria.previous_threshold,
                        None => true,
                    }
                })
                .fold(None, |best: Option<(&String, f64)>, (party, share)| match best {
                    Some((_, s)) if s >= *share => best,
                    _ => Some((party, *share)),
                })?;
            Some(flag(ps, party, score))
        })
        .collect();
    debug!(
        "retro_booths: {} of {} booths with {:?}",
        res.len(),
        stations.len(),
        criteria
    );
    res
}

/// The booths where a party performs worst, lowest score first.
///
/// The score is the share of the party in `primary_year`, or in
/// `fallback_year` when the primary share is missing or zero.
pub fn weak_booths(
    stations: &[PollingStation],
    party: &str,
    primary_year: u32,
    fallback_year: u32,
    limit: usize,
) -> Vec<FlaggedBooth> {
    let mut res: Vec<FlaggedBooth> = stations
        .iter()
        .map(|ps| {
            let score = match ps.share(party, primary_year) {
                Some(s) if s != 0.0 => s,
                _ => ps.share(party, fallback_year).unwrap_or(0.0),
            };
            flag(ps, party, score)
        })
        .collect();
    res.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
    res.truncate(limit);
    res
}

/// The booths where `label` got more than `threshold` in `year`, in input order.
///
/// Used with the `IND` label to find where independent candidates did well.
pub fn independent_hotspots(
    stations: &[PollingStation],
    label: &str,
    year: u32,
    threshold: f64,
    limit: usize,
) -> Vec<FlaggedBooth> {
    stations
        .iter()
        .filter_map(|ps| {
            let share = ps.share(label, year)?;
            if share > threshold {
                Some(flag(ps, label, share))
            } else {
                None
            }
        })
        .take(limit)
        .collect()
}

fn flag(ps: &PollingStation, party: &str, score: f64) -> FlaggedBooth {
    FlaggedBooth {
        station_id: ps.id.clone(),
        locality: ps.locality.clone(),
        party: party.to_string(),
        score,
        category: ps.category.clone(),
    }
}
