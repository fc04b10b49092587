use log::{debug, info, warn};
use serde_json::Value as JSValue;
use std::collections::{BTreeMap, HashSet};

pub use crate::config::*;
use crate::normalize::{normalize_with, station_number};

/// A builder for ingesting the records of whole assemblies.
///
/// The records of an assembly are normalized together, so that a single id
/// convention is used for the whole assembly.
///
/// ```
/// use booth_analytics::builder::StationsBuilder;
/// use booth_analytics::NormalizeOptions;
/// use serde_json::json;
///
/// let mut builder = StationsBuilder::new(&NormalizeOptions::default());
/// builder.add_record("3", json!({"PS_NO_2021": 1, "BJP_2021_pct": 0.4}));
/// let (stations, report) = builder.build();
///
/// assert_eq!(stations[0].id, "3_1");
/// assert!(report.skipped.is_empty());
/// ```
pub struct StationsBuilder {
    pub(crate) _options: NormalizeOptions,
    pub(crate) _assembly_names: BTreeMap<String, String>,
    // Assemblies in insertion order.
    pub(crate) _records: Vec<(String, Vec<JSValue>)>,
}

/// What happened during a build, beside the stations themselves.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct BuildReport {
    /// Records that could not be normalized. They are not part of the output.
    pub skipped: Vec<IngestError>,
    /// The id convention used for each assembly, in insertion order.
    pub conventions: Vec<(String, IdConvention)>,
    /// (assembly id, station id) of the stations whose id was already taken
    /// in their assembly. Once stored, only one of them remains.
    pub duplicate_ids: Vec<(String, String)>,
}

impl StationsBuilder {
    pub fn new(options: &NormalizeOptions) -> StationsBuilder {
        StationsBuilder {
            _options: options.clone(),
            _assembly_names: BTreeMap::new(),
            _records: Vec::new(),
        }
    }

    /// The display names of the assemblies, usually read from the mapping sheet.
    pub fn assembly_names(self, names: &BTreeMap<String, String>) -> StationsBuilder {
        StationsBuilder {
            _assembly_names: names.clone(),
            ..self
        }
    }

    pub fn add_record(&mut self, assembly_id: &str, raw: JSValue) {
        self.records_mut(assembly_id).push(raw);
    }

    /// Adds all the records of a sheet. Records of the same assembly may be
    /// added in several calls, they keep their order.
    pub fn add_records(&mut self, assembly_id: &str, raws: &[JSValue]) {
        self.records_mut(assembly_id).extend(raws.iter().cloned());
    }

    fn records_mut(&mut self, assembly_id: &str) -> &mut Vec<JSValue> {
        let pos = match self._records.iter().position(|(ac, _)| ac == assembly_id) {
            Some(pos) => pos,
            None => {
                self._records.push((assembly_id.to_string(), Vec::new()));
                self._records.len() - 1
            }
        };
        &mut self._records[pos].1
    }

    /// Normalizes all the records.
    ///
    /// Malformed records are skipped and listed in the report: one bad row does
    /// not abort the import of a sheet.
    pub fn build(&self) -> (Vec<PollingStation>, BuildReport) {
        let mut stations: Vec<PollingStation> = Vec::new();
        let mut report = BuildReport::default();
        for (assembly_id, raws) in self._records.iter() {
            let convention = match self._options.id_convention {
                IdConvention::Auto => resolve_convention(assembly_id, raws),
                c => c,
            };
            report.conventions.push((assembly_id.clone(), convention));
            let options = NormalizeOptions {
                id_convention: convention,
                ..self._options.clone()
            };
            let assembly_name = self._assembly_names.get(assembly_id);
            let before = stations.len();
            let mut ids: HashSet<String> = HashSet::new();
            for (index, raw) in raws.iter().enumerate() {
                match normalize_with(raw, assembly_id, index, &options) {
                    Ok(mut ps) => {
                        ps.assembly_name = assembly_name.cloned();
                        if !ids.insert(ps.id.clone()) {
                            warn!(
                                "build: assembly {}: id {} of record {} is already taken",
                                assembly_id, ps.id, index
                            );
                            report
                                .duplicate_ids
                                .push((assembly_id.clone(), ps.id.clone()));
                        }
                        stations.push(ps);
                    }
                    Err(e) => {
                        warn!("build: skipping record: {}", e);
                        report.skipped.push(e);
                    }
                }
            }
            info!(
                "build: assembly {}: {} stations out of {} records ({:?} ids)",
                assembly_id,
                stations.len() - before,
                raws.len(),
                convention
            );
        }
        (stations, report)
    }
}

// Natural keys are used when every record carries a station number, and no
// number is repeated. Otherwise the ids would collide and overwrite each other.
fn resolve_convention(assembly_id: &str, raws: &[JSValue]) -> IdConvention {
    let mut seen: HashSet<String> = HashSet::new();
    for (index, raw) in raws.iter().enumerate() {
        let record = match raw.as_object() {
            Some(r) => r,
            None => continue,
        };
        match station_number(record) {
            Some(no) => {
                if !seen.insert(no.clone()) {
                    warn!(
                        "resolve_convention: assembly {}: station number {} is repeated (record {}), using positional ids. These ids change if the rows are reordered.",
                        assembly_id, no, index
                    );
                    return IdConvention::Positional;
                }
            }
            None => {
                warn!(
                    "resolve_convention: assembly {}: record {} has no station number, using positional ids. These ids change if the rows are reordered.",
                    assembly_id, index
                );
                return IdConvention::Positional;
            }
        }
    }
    debug!(
        "resolve_convention: assembly {}: {} distinct station numbers",
        assembly_id,
        seen.len()
    );
    IdConvention::NaturalKey
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn auto() -> NormalizeOptions {
        NormalizeOptions {
            id_convention: IdConvention::Auto,
            ..Default::default()
        }
    }

    #[test]
    fn natural_keys_when_unique() {
        init_logger();
        let mut builder = StationsBuilder::new(&auto());
        builder.add_records(
            "4",
            &[json!({"PS_NO_2021": "1"}), json!({"PS_NO_2021": "2"})],
        );
        let (stations, report) = builder.build();
        let ids: Vec<&str> = stations.iter().map(|ps| ps.id.as_str()).collect();
        assert_eq!(ids, vec!["4_1", "4_2"]);
        assert_eq!(
            report.conventions,
            vec![("4".to_string(), IdConvention::NaturalKey)]
        );
    }

    #[test]
    fn positional_when_numbers_repeat() {
        init_logger();
        let mut builder = StationsBuilder::new(&auto());
        builder.add_records(
            "4",
            &[
                json!({"PS_NO_2021": "1"}),
                json!({"PS_NO_2021": "1"}),
                json!({"PS_NO_2021": "3"}),
            ],
        );
        let (stations, _) = builder.build();
        let ids: Vec<&str> = stations.iter().map(|ps| ps.id.as_str()).collect();
        assert_eq!(ids, vec!["4-1", "4-2", "4-3"]);
    }

    #[test]
    fn positional_when_a_number_is_missing() {
        let mut builder = StationsBuilder::new(&auto());
        builder.add_records("4", &[json!({"PS_NO_2021": "1"}), json!({})]);
        builder.add_records("5", &[json!({"PS_NO": 9})]);
        let (stations, report) = builder.build();
        let ids: Vec<&str> = stations.iter().map(|ps| ps.id.as_str()).collect();
        assert_eq!(ids, vec!["4-1", "4-2", "5_9"]);
        assert_eq!(report.conventions[0].1, IdConvention::Positional);
        assert_eq!(report.conventions[1].1, IdConvention::NaturalKey);
    }

    #[test]
    fn colliding_natural_keys_are_reported() {
        init_logger();
        let mut builder = StationsBuilder::new(&NormalizeOptions::default());
        builder.add_records("4", &[json!({"PS_NO_2021": "1"}), json!({"PS_NO_2021": "1"})]);
        // The second record has no number and falls back to its index.
        builder.add_records("5", &[json!({"PS_NO_2021": "1"}), json!({})]);
        builder.add_records("6", &[json!({"PS_NO_2021": "1"}), json!({"PS_NO_2021": "2"})]);
        let (stations, report) = builder.build();
        let ids: Vec<&str> = stations.iter().map(|ps| ps.id.as_str()).collect();
        assert_eq!(ids, vec!["4_1", "4_1", "5_1", "5_1", "6_1", "6_2"]);
        assert_eq!(report.conventions[0].1, IdConvention::NaturalKey);
        assert_eq!(
            report.duplicate_ids,
            vec![
                ("4".to_string(), "4_1".to_string()),
                ("5".to_string(), "5_1".to_string())
            ]
        );
    }

    #[test]
    fn same_number_in_two_assemblies() {
        let mut builder = StationsBuilder::new(&NormalizeOptions::default());
        builder.add_record("1", json!({"PS_NO_2021": "7"}));
        builder.add_record("2", json!({"PS_NO_2021": "7"}));
        let (_, report) = builder.build();
        assert!(report.duplicate_ids.is_empty());
    }

    #[test]
    fn malformed_records_are_skipped() {
        init_logger();
        let mut builder = StationsBuilder::new(&auto());
        builder.add_record("2", json!({"PS_NO_2021": "1"}));
        builder.add_record("2", json!("not a row"));
        builder.add_record("2", json!({"PS_NO_2021": "3"}));
        let (stations, report) = builder.build();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[1].id, "2_3");
        assert_eq!(
            report.skipped,
            vec![IngestError::MalformedRecord {
                assembly_id: "2".to_string(),
                index: 1,
                found: "a string".to_string()
            }]
        );
    }

    #[test]
    fn fills_assembly_names() {
        let names: BTreeMap<String, String> =
            [("1".to_string(), "Mannadipet".to_string())].into_iter().collect();
        let mut builder = StationsBuilder::new(&NormalizeOptions::default()).assembly_names(&names);
        builder.add_record("1", json!({}));
        builder.add_record("2", json!({}));
        let (stations, _) = builder.build();
        assert_eq!(stations[0].assembly_name.as_deref(), Some("Mannadipet"));
        assert_eq!(stations[1].assembly_name, None);
    }

    #[test]
    fn keeps_assembly_order() {
        let mut builder = StationsBuilder::new(&NormalizeOptions::default());
        builder.add_record("9", json!({}));
        builder.add_record("1", json!({}));
        builder.add_record("9", json!({}));
        let (stations, _) = builder.build();
        let acs: Vec<&str> = stations.iter().map(|ps| ps.assembly_id.as_str()).collect();
        assert_eq!(acs, vec!["9", "9", "1"]);
    }
}
