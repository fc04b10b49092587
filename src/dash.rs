use log::{debug, info, warn};

use booth_analytics::access::*;
use booth_analytics::builder::StationsBuilder;
use booth_analytics::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use calamine::{open_workbook, Reader, Xlsx};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::dash::config_reader::*;
use crate::dash::io_common::RawSource;
use crate::dash::report::{build_assembly_report, ReportSettings};
use crate::dash::store::*;

pub mod config_reader;
pub mod io_common;
pub mod io_excel;
pub mod io_json;
pub mod report;
pub mod store;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DashError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No assembly sheet in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Expected a number"))]
    ParsingJsonNumber {},
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("The document store cannot be reached"))]
    StoreUnreachable {},
    #[snafu(display("Invalid document path {path}"))]
    InvalidPath { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type DashResult<T> = Result<T, DashError>;

const SURVEY_PAGE: &str = "survey";

fn read_source(cfs: &DataSource) -> DashResult<RawSource> {
    info!("Attempting to read booth file {:?}", cfs.file_path);
    match cfs.provider.as_str() {
        "json" => io_json::read_json_source(&cfs.file_path, cfs),
        "xlsx" | "excel" => io_excel::read_excel_source(&cfs.file_path, cfs),
        x => whatever!("Provider not implemented {:?}", x),
    }
}

/// Reads all the data sources and normalizes their rows.
fn build_snapshot(settings: &RunSettings) -> DashResult<Vec<PollingStation>> {
    let mut raw = RawSource::default();
    for cfs in settings.sources.iter() {
        raw.merge(read_source(cfs)?);
    }
    let builder = raw.feed(StationsBuilder::new(&settings.normalize));
    let (stations, report) = builder.build();
    if !report.skipped.is_empty() {
        warn!(
            "build_snapshot: {} records could not be read and were skipped",
            report.skipped.len()
        );
    }
    if !report.duplicate_ids.is_empty() {
        warn!(
            "build_snapshot: {} stations share their id with another station of their assembly, only one of each is kept in the store",
            report.duplicate_ids.len()
        );
    }
    info!(
        "build_snapshot: {} stations in {} assemblies",
        stations.len(),
        raw.assemblies.len()
    );
    Ok(stations)
}

/// The assemblies known to the store, completed with the ones of the snapshot.
fn known_assemblies<S: DocumentStore>(
    gateway: &Gateway<S>,
    snapshot: &[PollingStation],
) -> Vec<Assembly> {
    let mut res: Vec<Assembly> = match gateway.list_assemblies() {
        Ok(l) => l,
        Err(e) => {
            warn!("known_assemblies: could not read the assemblies: {}", e);
            Vec::new()
        }
    };
    for ps in snapshot.iter() {
        if !res.iter().any(|a| a.id == ps.assembly_id) {
            let name = ps.assembly_name.clone().unwrap_or_default();
            res.push(Assembly::new(&ps.assembly_id, &name));
        }
    }
    res.sort_by_key(|a| (a.number.unwrap_or(u32::MAX), a.id.clone()));
    res
}

fn import_snapshot<S: DocumentStore>(
    gateway: &mut Gateway<S>,
    snapshot: &[PollingStation],
) -> DashResult<()> {
    let mut assemblies: Vec<Assembly> = Vec::new();
    for ps in snapshot.iter() {
        if !assemblies.iter().any(|a| a.id == ps.assembly_id) {
            let name = ps.assembly_name.clone().unwrap_or_default();
            assemblies.push(Assembly::new(&ps.assembly_id, &name));
        }
    }
    for a in assemblies.iter() {
        gateway.upsert_assembly(a)?;
    }
    gateway.upsert_stations(snapshot, SetMode::Replace)?;
    info!(
        "import_snapshot: {} stations of {} assemblies written",
        snapshot.len(),
        assemblies.len()
    );
    Ok(())
}

/// The user is either a JSON profile on disk, or the uid of a user of the store.
fn resolve_user<S: DocumentStore>(
    gateway: &Gateway<S>,
    user: Option<&str>,
) -> DashResult<UserProfile> {
    let user = match user {
        Some(u) => u,
        None => return Ok(UserProfile::super_admin("boothdash")),
    };
    if Path::new(user).is_file() {
        let js = read_json(user)?;
        return serde_json::from_value(js).context(ParsingJsonSnafu {});
    }
    match gateway.load_user(user)? {
        Some(profile) => Ok(profile),
        None => whatever!("Unknown user {}", user),
    }
}

/// Builds the reports of all the requested assemblies the user may see.
pub fn run_with_store<S: DocumentStore>(
    store: S,
    snapshot: Vec<PollingStation>,
    settings: &RunSettings,
) -> DashResult<JSValue> {
    if settings.import && snapshot.is_empty() {
        whatever!("Nothing to import: no station was read from the input")
    }
    let mut gateway = Gateway::new(store, snapshot.clone());
    if settings.import {
        import_snapshot(&mut gateway, &snapshot)?;
    }
    let stations = gateway.list_stations(None);

    // Loaded once, and only read afterwards.
    let widgets = gateway.load_widget_config()?;
    let user = resolve_user(&gateway, settings.user_path.as_deref())?;
    let all = known_assemblies(&gateway, &stations);
    let visible = visible_assemblies(&user, &all);
    let restricted = is_access_restricted(&user, &all);
    if restricted {
        warn!(
            "run_with_store: user {} has no access to any assembly",
            user.uid
        );
    }

    let selected: Vec<&Assembly> = if settings.assemblies.is_empty() {
        visible.iter().collect()
    } else {
        settings
            .assemblies
            .iter()
            .filter_map(|id| match visible.iter().find(|a| &a.id == id) {
                Some(a) => Some(a),
                None if all.iter().any(|a| &a.id == id) => {
                    warn!("run_with_store: user {} may not see assembly {}", user.uid, id);
                    None
                }
                None => {
                    warn!("run_with_store: unknown assembly {}", id);
                    None
                }
            })
            .collect()
    };

    let mut reports: Vec<JSValue> = Vec::new();
    for assembly in selected {
        let stations = gateway.list_stations(Some(&assembly.id));
        let page = gateway.load_page_config(&assembly.id, RETRO_BOOTHS_PAGE)?;
        let history = gateway.load_political_history_config(&assembly.id)?;
        let cards = gateway.list_custom_cards(Some(&assembly.id), None)?;
        let report_settings = ReportSettings {
            year: settings.year,
            years: &settings.years,
            widgets: &widgets,
            page: &page,
            history: &history,
            cards: &cards,
            aggregate: &settings.aggregate,
        };
        reports.push(build_assembly_report(assembly, &stations, &report_settings));
    }
    debug!("run_with_store: {} reports", reports.len());

    let pages: Vec<String> = visible_pages(&user, &default_pages())
        .into_iter()
        .map(|p| p.id)
        .collect();
    // The survey is not tied to an assembly.
    let survey = if pages.iter().any(|p| p == SURVEY_PAGE) {
        gateway.load_survey_data()?
    } else {
        JSValue::Null
    };
    Ok(json!({
        "user": user.uid,
        "role": user.role,
        "accessRestricted": restricted,
        "pages": pages,
        "widgets": widgets,
        "survey": survey,
        "assemblies": reports,
    }))
}

fn write_output(output_path: Option<&str>, contents: &str) -> DashResult<()> {
    match output_path {
        None | Some("") | Some("stdout") => {
            println!("{}", contents);
            Ok(())
        }
        Some(p) => {
            info!("write_output: writing the report to {}", p);
            fs::write(p, contents).context(WritingFileSnafu { path: p })
        }
    }
}

fn check_reference(reference_path: &str, pretty_report: &str) -> DashResult<()> {
    let reference = read_json(reference_path)?;
    let pretty_reference = serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {})?;
    if pretty_reference != pretty_report {
        warn!("Found differences with the reference report");
        print_diff(pretty_reference.as_str(), pretty_report, "\n");
        whatever!("Difference detected between the report and the reference report")
    }
    Ok(())
}

pub fn run_dashboard(args: &Args) -> DashResult<()> {
    let config = match args.config.as_deref() {
        Some(p) => read_config(p)?,
        None => DashConfig::default(),
    };
    let settings = RunSettings::resolve(&config, args)?;
    info!("run_dashboard: settings: {:?}", settings);
    if settings.sources.is_empty() && settings.store_path.is_none() {
        whatever!("No booth data: pass --input, --store, or a configuration with dataSources")
    }

    let snapshot = build_snapshot(&settings)?;
    let report = match settings.store_path.as_deref() {
        Some(p) => run_with_store(JsonFileStore::open(p)?, snapshot, &settings)?,
        None => run_with_store(MemoryStore::new(), snapshot, &settings)?,
    };

    let pretty_report = serde_json::to_string_pretty(&report).context(ParsingJsonSnafu {})?;
    write_output(settings.output_path.as_deref(), &pretty_report)?;

    // The reference report, if provided for comparison
    if let Some(reference_path) = settings.reference_path.as_deref() {
        check_reference(reference_path, &pretty_report)?;
    }
    Ok(())
}
