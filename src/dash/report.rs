use booth_analytics::booths::*;

use crate::dash::*;

const WEAK_BOOTH_PARTIES: usize = 3;
const WEAK_BOOTH_LIMIT: usize = 10;
const HOTSPOT_LABEL: &str = "IND";
const HOTSPOT_THRESHOLD: f64 = 0.1;
const HOTSPOT_LIMIT: usize = 20;

/// What shapes the report of an assembly, beside its stations.
pub struct ReportSettings<'a> {
    /// The election of the assembly figures.
    pub year: u32,
    pub years: &'a [u32],
    pub widgets: &'a WidgetConfig,
    pub page: &'a PageConfig,
    pub history: &'a PoliticalHistoryConfig,
    /// The custom cards of the assembly, all sections together.
    pub cards: &'a [CustomCard],
    pub aggregate: &'a AggregateOptions,
}

/// Assembles everything the dashboard shows for one assembly.
///
/// The sections turned off in the widget settings or in the page settings
/// are left out.
pub fn build_assembly_report(
    assembly: &Assembly,
    stations: &[PollingStation],
    settings: &ReportSettings,
) -> JSValue {
    let summary = aggregate_with(stations, settings.year, settings.aggregate);
    let trend = analyze_trend(stations, settings.years);
    debug!(
        "build_assembly_report: assembly {}: {} stations, {} cards",
        assembly.id,
        stations.len(),
        settings.cards.len()
    );

    json!({
        "assembly": {"id": assembly.id, "name": assembly.name},
        "year": settings.year,
        "overview": overview(stations, &summary, settings),
        "politicalHistory": political_history(&trend, settings),
        "retroBooths": retro_booths_page(stations, &summary, settings),
    })
}

fn section_cards(cards: &[CustomCard], section: CardSection) -> Vec<&CustomCard> {
    cards.iter().filter(|c| c.section == section).collect()
}

fn overview(
    stations: &[PollingStation],
    summary: &AssemblySummary,
    settings: &ReportSettings,
) -> JSValue {
    let widgets = settings.widgets;
    let mut res: JSMap<String, JSValue> = JSMap::new();
    res.insert("totalStations".to_string(), json!(summary.total_stations));
    res.insert(
        "reportingStations".to_string(),
        json!(summary.reporting_stations),
    );
    res.insert("mappedStations".to_string(), json!(summary.mapped_stations));
    res.insert("boothWins".to_string(), json!(summary.booth_wins));
    if widgets.show_voter_turnout {
        res.insert(
            "voterTurnout".to_string(),
            json!({
                "totalPolled": summary.total_polled,
                "electorate": summary.electorate,
                "turnoutPct": summary.turnout_pct,
            }),
        );
    }
    if widgets.show_party_performance {
        res.insert(
            "partyPerformance".to_string(),
            json!({
                "chartType": widgets.party_performance_chart_type,
                "parties": summary.party_shares,
            }),
        );
    }
    if widgets.show_category_distribution {
        res.insert(
            "categoryDistribution".to_string(),
            json!({
                "chartType": widgets.category_distribution_chart_type,
                "categories": summary.categories,
            }),
        );
    }
    if widgets.show_polling_station_map {
        res.insert("map".to_string(), json!(map_points(stations)));
    }
    let cards = section_cards(settings.cards, CardSection::Overview);
    if !cards.is_empty() {
        res.insert("customCards".to_string(), json!(cards));
    }
    JSValue::Object(res)
}

fn political_history(trend: &TrendReport, settings: &ReportSettings) -> JSValue {
    let history = settings.history;
    let mut res: JSMap<String, JSValue> = JSMap::new();
    if history.show_electoral_trends {
        res.insert("series".to_string(), json!(trend.series));
    }
    if history.show_vote_swing {
        res.insert("swings".to_string(), json!(trend.swings));
    }
    if history.show_insights {
        res.insert("insights".to_string(), json!(history.insights));
    }
    if !history.custom_narrative.is_empty() {
        res.insert(
            "customNarrative".to_string(),
            json!(history.custom_narrative),
        );
    }
    let cards = section_cards(settings.cards, CardSection::PoliticalHistory);
    if !cards.is_empty() {
        res.insert("customCards".to_string(), json!(cards));
    }
    JSValue::Object(res)
}

/// The booths with known coordinates.
pub fn map_points(stations: &[PollingStation]) -> Vec<JSValue> {
    stations
        .iter()
        .filter_map(|ps| {
            let (lat, lng) = ps.coordinates()?;
            Some(json!({
                "id": ps.id,
                "name": ps.station_name,
                "locality": ps.locality,
                "latitude": lat,
                "longitude": lng,
                "category": ps.category,
                "strongestParty": ps.strongest_party,
            }))
        })
        .collect()
}

fn retro_booths_page(
    stations: &[PollingStation],
    summary: &AssemblySummary,
    settings: &ReportSettings,
) -> JSValue {
    let (year, years, page) = (settings.year, settings.years, settings.page);
    let previous_year = years.iter().filter(|y| **y < year).max().cloned();
    let mut res: JSMap<String, JSValue> = JSMap::new();

    if page.show_polling_table {
        let criteria = RetroCriteria {
            latest_year: year,
            previous_year,
            ..RetroCriteria::DEFAULT
        };
        res.insert(
            "retroBooths".to_string(),
            json!({
                "title": page.retro_booths_title,
                "description": page.retro_booths_description,
                "booths": retro_booths(stations, &criteria),
            }),
        );
    }
    if page.show_heat_map {
        res.insert(
            "heatMap".to_string(),
            json!({
                "title": page.heat_map_title,
                "description": page.heat_map_description,
                "points": heat_map_points(stations, year),
            }),
        );
    }
    if page.show_weak_booths {
        let fallback_year = previous_year.unwrap_or(year);
        let weak: JSMap<String, JSValue> = summary
            .party_shares
            .iter()
            .take(WEAK_BOOTH_PARTIES)
            .map(|ps| {
                let booths = weak_booths(stations, &ps.party, year, fallback_year, WEAK_BOOTH_LIMIT);
                (ps.party.clone(), json!(booths))
            })
            .collect();
        res.insert("weakBooths".to_string(), JSValue::Object(weak));
    }
    if page.show_independent_hotspots {
        if let Some(first_year) = years.first() {
            res.insert(
                "independentHotspots".to_string(),
                json!(independent_hotspots(
                    stations,
                    HOTSPOT_LABEL,
                    *first_year,
                    HOTSPOT_THRESHOLD,
                    HOTSPOT_LIMIT
                )),
            );
        }
    }
    if page.show_custom_cards {
        res.insert(
            "customCards".to_string(),
            json!(section_cards(settings.cards, CardSection::Retro)),
        );
    }
    JSValue::Object(res)
}

// One point per booth, with the shares of all the parties in percent.
fn heat_map_points(stations: &[PollingStation], year: u32) -> Vec<JSValue> {
    stations
        .iter()
        .filter_map(|ps| {
            let r = ps.result(year)?;
            if r.candidates.is_empty() {
                return None;
            }
            let shares: JSMap<String, JSValue> = r
                .candidates
                .iter()
                .map(|(party, share)| (party.clone(), json!(share * 100.0)))
                .collect();
            Some(json!({
                "id": ps.id,
                "locality": ps.locality,
                "category": ps.category,
                "shares": shares,
            }))
        })
        .collect()
}
