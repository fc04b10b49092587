//! Turns the wide, spreadsheet-shaped booth records into `PollingStation`s.
//!
//! A raw record is a flat JSON object with one column per party and per
//! election (`BJP_2021_pct`, `DMK_2016_pct`, ...). The party columns are
//! discovered from the keys: no party list is hardcoded.

use log::debug;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use std::collections::BTreeMap;

use crate::config::*;

const STATION_NUMBER_COLUMNS: [&str; 2] = ["PS_NO_2021", "PS_NO"];
const STATION_NAME_COLUMN: &str = "PS_NAME";
const LOCALITY_COLUMNS: [&str; 2] = ["LOCALITY_EXTRACTED", "LOCALITY"];
const LATITUDE_COLUMN: &str = "Latitude";
const LONGITUDE_COLUMN: &str = "Longitude";
const CATEGORY_COLUMN: &str = "TOP_SCORE_CATEGORY";
const STRONGEST_PARTY_COLUMN: &str = "TOP_SCORE_PARTY";
const POLLED_PREFIX: &str = "POLLED_";
const VOTERS_PREFIX: &str = "VOTERS_";
const SHARE_SUFFIX: &str = "_pct";
const SCORE_SUFFIX: &str = "_SCORE";

/// Normalizes one record with the default options (natural-key ids, automatic
/// share scale, elections of 2011, 2016 and 2021).
pub fn normalize(
    raw: &JSValue,
    assembly_id: &str,
    index: usize,
) -> Result<PollingStation, IngestError> {
    normalize_with(raw, assembly_id, index, &NormalizeOptions::default())
}

/// Normalizes one record.
///
/// Arguments:
/// * `raw` the record, which must be a JSON object. All the columns are optional.
/// * `assembly_id` the assembly the record belongs to
/// * `index` the position of the record in its sheet, starting at 0
///
/// This function is pure: the same inputs always produce the same station.
pub fn normalize_with(
    raw: &JSValue,
    assembly_id: &str,
    index: usize,
    options: &NormalizeOptions,
) -> Result<PollingStation, IngestError> {
    let record = raw.as_object().ok_or_else(|| IngestError::MalformedRecord {
        assembly_id: assembly_id.to_string(),
        index,
        found: json_kind(raw).to_string(),
    })?;

    let source_number = station_number(record);
    let id = station_id(
        assembly_id,
        source_number.as_deref(),
        index,
        options.id_convention,
    );
    let station_number = source_number
        .clone()
        .unwrap_or_else(|| (index + 1).to_string());
    let station_name = read_string_column(record, STATION_NAME_COLUMN)
        .or(source_number)
        .unwrap_or_else(|| format!("Station {}", index + 1));
    let locality = LOCALITY_COLUMNS
        .iter()
        .find_map(|c| read_string_column(record, c))
        .unwrap_or_default();

    let station = PollingStation {
        id,
        assembly_id: assembly_id.to_string(),
        assembly_name: None,
        station_number,
        station_name,
        locality,
        latitude: read_number_column(record, LATITUDE_COLUMN).unwrap_or(0.0),
        longitude: read_number_column(record, LONGITUDE_COLUMN).unwrap_or(0.0),
        category: read_string_column(record, CATEGORY_COLUMN),
        strongest_party: read_string_column(record, STRONGEST_PARTY_COLUMN),
        scores: read_scores(record),
        election_results: pivot_results(record, options),
    };
    debug!(
        "normalize: assembly {} index {} -> {} ({} elections)",
        assembly_id,
        index,
        station.id,
        station.election_results.len()
    );
    Ok(station)
}

/// The id of a station under a given convention.
///
/// `IdConvention::Auto` is resolved per batch by the builder. For a single
/// record it behaves as `NaturalKey`.
pub fn station_id(
    assembly_id: &str,
    station_number: Option<&str>,
    index: usize,
    convention: IdConvention,
) -> String {
    match (convention, station_number) {
        (IdConvention::Positional, _) => format!("{}-{}", assembly_id, index + 1),
        (_, Some(no)) => format!("{}_{}", assembly_id, no),
        (_, None) => format!("{}_{}", assembly_id, index),
    }
}

/// The station number given by the source, if any.
pub fn station_number(record: &JSMap<String, JSValue>) -> Option<String> {
    STATION_NUMBER_COLUMNS
        .iter()
        .find_map(|c| read_string_column(record, c))
}

/// Splits a share column `<LABEL>_<YEAR>_pct` into its label and year.
///
/// ```
/// use booth_analytics::normalize::split_share_key;
/// assert_eq!(split_share_key("AIADMK_2016_pct"), Some(("AIADMK", 2016)));
/// assert_eq!(split_share_key("POLLED_2021"), None);
/// ```
pub fn split_share_key(key: &str) -> Option<(&str, u32)> {
    let stem = key.strip_suffix(SHARE_SUFFIX)?;
    let (label, year) = stem.rsplit_once('_')?;
    if label.is_empty() {
        return None;
    }
    let year = year.parse::<u32>().ok()?;
    Some((label, year))
}

fn pivot_results(
    record: &JSMap<String, JSValue>,
    options: &NormalizeOptions,
) -> BTreeMap<u32, ElectionResult> {
    let mut results: BTreeMap<u32, ElectionResult> = options
        .years
        .iter()
        .map(|y| (*y, ElectionResult::empty(*y)))
        .collect();

    for (key, value) in record.iter() {
        if let Some((label, year)) = split_share_key(key) {
            if let Some(res) = results.get_mut(&year) {
                // A share that cannot be read counts as no vote, but the party is kept.
                let share = read_number(value).unwrap_or(0.0);
                res.candidates.insert(label.to_string(), share);
            }
        }
    }

    for (year, res) in results.iter_mut() {
        res.total_votes_polled =
            read_count_column(record, format!("{}{}", POLLED_PREFIX, year).as_str());
        res.electors = read_count_column(record, format!("{}{}", VOTERS_PREFIX, year).as_str());
        if is_percent_scale(&res.candidates, options.share_scale) {
            debug!("pivot_results: year {} uses the percent scale", year);
            for share in res.candidates.values_mut() {
                *share /= 100.0;
            }
        }
    }
    results
}

fn is_percent_scale(candidates: &BTreeMap<String, f64>, scale: ShareScale) -> bool {
    match scale {
        ShareScale::Fraction => false,
        ShareScale::Percent => true,
        ShareScale::Auto => candidates.values().any(|s| *s > 1.0),
    }
}

fn read_scores(record: &JSMap<String, JSValue>) -> BTreeMap<String, f64> {
    record
        .iter()
        .filter_map(|(key, value)| {
            let label = key.strip_suffix(SCORE_SUFFIX)?;
            if label.is_empty() {
                return None;
            }
            read_number(value).map(|x| (label.to_string(), x))
        })
        .collect()
}

fn read_string_column(record: &JSMap<String, JSValue>, column: &str) -> Option<String> {
    record.get(column).and_then(read_string)
}

fn read_number_column(record: &JSMap<String, JSValue>, column: &str) -> Option<f64> {
    record.get(column).and_then(read_number)
}

fn read_count_column(record: &JSMap<String, JSValue>, column: &str) -> Option<u64> {
    read_number_column(record, column)
        .filter(|x| *x >= 0.0)
        .map(|x| x.round() as u64)
}

/// Reads a cell as text. Integral numbers are written without a decimal part,
/// so that a station number `12.0` becomes `"12"`.
pub(crate) fn read_string(value: &JSValue) -> Option<String> {
    let s = match value {
        JSValue::String(s) => s.trim().to_string(),
        JSValue::Number(n) => match n.as_f64() {
            Some(x) if x.fract() == 0.0 && x.abs() < 1e15 => format!("{}", x as i64),
            _ => n.to_string(),
        },
        JSValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Reads a cell as a number. Numeric strings are accepted, as spreadsheets
/// exported to JSON often carry them.
pub(crate) fn read_number(value: &JSValue) -> Option<f64> {
    let x = match value {
        JSValue::Number(n) => n.as_f64(),
        JSValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if x.is_finite() {
        Some(x)
    } else {
        None
    }
}

fn json_kind(value: &JSValue) -> &'static str {
    match value {
        JSValue::Null => "null",
        JSValue::Bool(_) => "a boolean",
        JSValue::Number(_) => "a number",
        JSValue::String(_) => "a string",
        JSValue::Array(_) => "an array",
        JSValue::Object(_) => "an object",
    }
}
