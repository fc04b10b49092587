use crate::dash::io_common::{DEFAULT_MAPPING_SHEET, DEFAULT_SHEET_PREFIX};
use crate::dash::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use std::path::PathBuf;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "assemblySheetPrefix")]
    pub assembly_sheet_prefix: Option<String>,
    #[serde(rename = "mappingSheet")]
    pub mapping_sheet: Option<String>,
}

impl DataSource {
    pub fn new(provider: &str, file_path: &str) -> DataSource {
        DataSource {
            provider: provider.to_string(),
            file_path: file_path.to_string(),
            assembly_sheet_prefix: None,
            mapping_sheet: None,
        }
    }

    pub fn sheet_prefix(&self) -> &str {
        self.assembly_sheet_prefix
            .as_deref()
            .unwrap_or(DEFAULT_SHEET_PREFIX)
    }

    pub fn mapping_sheet(&self) -> &str {
        self.mapping_sheet.as_deref().unwrap_or(DEFAULT_MAPPING_SHEET)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreSettings {
    pub path: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisSettings {
    pub years: Option<Vec<u32>>,
    /// The election of the assembly figures. Defaults to the last of `years`.
    pub year: Option<JSValue>,
    #[serde(rename = "assumedTurnoutRate")]
    pub assumed_turnout_rate: Option<JSValue>,
    #[serde(rename = "idConvention")]
    pub id_convention: Option<IdConvention>,
    #[serde(rename = "shareScale")]
    pub share_scale: Option<ShareScale>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct DashConfig {
    #[serde(rename = "dataSources", default)]
    pub data_sources: Vec<DataSource>,
    pub store: Option<StoreSettings>,
    pub analysis: Option<AnalysisSettings>,
    pub output: Option<OutputSettings>,
}

/// Everything a run needs, once the configuration file and the command line are merged.
#[derive(PartialEq, Debug, Clone)]
pub struct RunSettings {
    pub sources: Vec<DataSource>,
    pub store_path: Option<String>,
    pub import: bool,
    pub years: Vec<u32>,
    pub year: u32,
    pub normalize: NormalizeOptions,
    pub aggregate: AggregateOptions,
    pub assemblies: Vec<String>,
    pub user_path: Option<String>,
    pub output_path: Option<String>,
    pub reference_path: Option<String>,
}

/// Reads the run configuration. The relative paths of the data sources and
/// of the store are resolved against the directory of the configuration file.
pub fn read_config(path: &str) -> DashResult<DashConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let mut config: DashConfig = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    let root_p = Path::new(path).parent().context(MissingParentDirSnafu {})?;
    for cfs in config.data_sources.iter_mut() {
        cfs.file_path = resolve_path(root_p, &cfs.file_path);
    }
    if let Some(store) = config.store.as_mut() {
        store.path = store.path.as_ref().map(|p| resolve_path(root_p, p));
    }
    debug!("read_config: {:?}", config);
    Ok(config)
}

fn resolve_path(root: &Path, p: &str) -> String {
    let rel = Path::new(p);
    if rel.is_absolute() {
        p.to_string()
    } else {
        let full: PathBuf = root.join(rel);
        full.display().to_string()
    }
}

pub fn read_json(path: &str) -> DashResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// The provider of a file, from its extension.
pub fn guess_provider(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("xlsx") | Some("xlsm") => "xlsx",
        _ => "json",
    }
}

impl RunSettings {
    /// Merges the configuration and the command line. The command line wins.
    pub fn resolve(config: &DashConfig, args: &Args) -> DashResult<RunSettings> {
        let sources: Vec<DataSource> = match args.input.as_ref() {
            Some(input) => {
                let provider = match args.input_type.as_deref() {
                    Some(t) => t.to_string(),
                    None => guess_provider(input).to_string(),
                };
                vec![DataSource::new(&provider, input)]
            }
            None => config.data_sources.clone(),
        };

        let analysis = config.analysis.clone().unwrap_or_default();
        let mut years: Vec<u32> = analysis
            .years
            .clone()
            .unwrap_or_else(|| ELECTION_YEARS.to_vec());
        years.sort_unstable();
        years.dedup();
        let year = match (args.year, read_js_int(&analysis.year)?) {
            (Some(y), _) => y,
            (None, Some(y)) => u32::try_from(y).ok().context(ParsingJsonNumberSnafu {})?,
            (None, None) => match years.last() {
                Some(y) => *y,
                None => whatever!("No election year configured"),
            },
        };
        if !years.contains(&year) {
            years.push(year);
            years.sort_unstable();
        }
        let assumed_turnout_rate =
            read_js_float(&analysis.assumed_turnout_rate)?.unwrap_or(DEFAULT_TURNOUT_RATE);
        if !(assumed_turnout_rate > 0.0 && assumed_turnout_rate <= 1.0) {
            whatever!(
                "assumedTurnoutRate must be in (0, 1], found {}",
                assumed_turnout_rate
            )
        }

        Ok(RunSettings {
            sources,
            store_path: args
                .store
                .clone()
                .or_else(|| config.store.as_ref().and_then(|s| s.path.clone())),
            import: args.import,
            normalize: NormalizeOptions {
                years: years.clone(),
                id_convention: analysis.id_convention.unwrap_or(IdConvention::Auto),
                share_scale: analysis.share_scale.unwrap_or(ShareScale::Auto),
            },
            years,
            year,
            aggregate: AggregateOptions {
                assumed_turnout_rate,
            },
            assemblies: args.assembly.clone(),
            user_path: args.user.clone(),
            output_path: args
                .out
                .clone()
                .or_else(|| config.output.as_ref().and_then(|o| o.output_path.clone())),
            reference_path: args.reference.clone(),
        })
    }
}

fn read_js_int(x: &Option<JSValue>) -> DashResult<Option<u64>> {
    match x {
        None | Some(JSValue::Null) => Ok(None),
        Some(JSValue::Number(n)) => n.as_u64().map(Some).context(ParsingJsonNumberSnafu {}),
        Some(JSValue::String(s)) => s
            .trim()
            .parse::<u64>()
            .ok()
            .map(Some)
            .context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}

fn read_js_float(x: &Option<JSValue>) -> DashResult<Option<f64>> {
    match x {
        None | Some(JSValue::Null) => Ok(None),
        Some(JSValue::Number(n)) => n.as_f64().map(Some).context(ParsingJsonNumberSnafu {}),
        Some(JSValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .map(Some)
            .context(ParsingJsonNumberSnafu {}),
        _ => None.context(ParsingJsonNumberSnafu {}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "dataSources": [{"provider": "xlsx", "filePath": "data/Form20.xlsx", "mappingSheet": "Names"}],
        "store": {"path": "store.json"},
        "analysis": {"years": [2021, 2016], "assumedTurnoutRate": "0.8", "idConvention": "naturalKey"},
        "output": {"outputPath": "stdout"}
    }"#;

    #[test]
    fn reads_and_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dash.json");
        fs::write(&path, CONFIG).unwrap();
        let config = read_config(path.to_str().unwrap()).unwrap();
        let cfs = &config.data_sources[0];
        assert_eq!(cfs.provider, "xlsx");
        assert_eq!(
            cfs.file_path,
            dir.path().join("data/Form20.xlsx").display().to_string()
        );
        assert_eq!(cfs.mapping_sheet(), "Names");
        assert_eq!(cfs.sheet_prefix(), "AC_");
        assert_eq!(
            config.store.unwrap().path,
            Some(dir.path().join("store.json").display().to_string())
        );
    }

    #[test]
    fn command_line_wins() {
        let config: DashConfig = serde_json::from_str(CONFIG).unwrap();
        let args = Args {
            input: Some("booths.json".to_string()),
            year: Some(2016),
            out: Some("report.json".to_string()),
            ..Default::default()
        };
        let settings = RunSettings::resolve(&config, &args).unwrap();
        assert_eq!(settings.sources, vec![DataSource::new("json", "booths.json")]);
        assert_eq!(settings.year, 2016);
        assert_eq!(settings.years, vec![2016, 2021]);
        assert_eq!(settings.aggregate.assumed_turnout_rate, 0.8);
        assert_eq!(settings.normalize.id_convention, IdConvention::NaturalKey);
        assert_eq!(settings.output_path.as_deref(), Some("report.json"));
        assert_eq!(settings.store_path.as_deref(), Some("store.json"));
    }

    #[test]
    fn defaults_without_configuration() {
        let args = Args {
            input: Some("Form20.xlsx".to_string()),
            ..Default::default()
        };
        let settings = RunSettings::resolve(&DashConfig::default(), &args).unwrap();
        assert_eq!(settings.sources[0].provider, "xlsx");
        assert_eq!(settings.years, ELECTION_YEARS.to_vec());
        assert_eq!(settings.year, 2021);
        assert_eq!(settings.normalize.id_convention, IdConvention::Auto);
        assert_eq!(settings.aggregate.assumed_turnout_rate, DEFAULT_TURNOUT_RATE);
        assert_eq!(settings.output_path, None);
    }

    #[test]
    fn invalid_turnout_rate() {
        let config: DashConfig =
            serde_json::from_str(r#"{"analysis": {"assumedTurnoutRate": 1.5}}"#).unwrap();
        assert!(RunSettings::resolve(&config, &Args::default()).is_err());
        let config: DashConfig =
            serde_json::from_str(r#"{"analysis": {"assumedTurnoutRate": "high"}}"#).unwrap();
        assert!(RunSettings::resolve(&config, &Args::default()).is_err());
    }

    #[test]
    fn year_out_of_range() {
        let config: DashConfig =
            serde_json::from_str(r#"{"analysis": {"year": 4294967297}}"#).unwrap();
        assert!(RunSettings::resolve(&config, &Args::default()).is_err());
        let config: DashConfig =
            serde_json::from_str(r#"{"analysis": {"year": "2016"}}"#).unwrap();
        let settings = RunSettings::resolve(&config, &Args::default()).unwrap();
        assert_eq!(settings.year, 2016);
    }
}
