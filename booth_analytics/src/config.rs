// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JSValue;

/// The elections covered by the source spreadsheets.
pub const ELECTION_YEARS: [u32; 3] = [2011, 2016, 2021];

/// Turnout assumed when no voter roll is available to derive the electorate.
pub const DEFAULT_TURNOUT_RATE: f64 = 0.82;

/// Bucket for booths without a category.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// The result of one election in one polling booth.
///
/// The shares in `candidates` are always fractions (0-1), whatever the scale
/// of the source columns.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionResult {
    #[serde(default)]
    pub year: u32,
    #[serde(
        rename = "total_votes",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_votes_polled: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electors: Option<u64>,
    #[serde(default)]
    pub candidates: BTreeMap<String, f64>,
}

impl ElectionResult {
    pub fn empty(year: u32) -> ElectionResult {
        ElectionResult {
            year,
            total_votes_polled: None,
            electors: None,
            candidates: BTreeMap::new(),
        }
    }

    /// The votes polled, counting a missing value as zero.
    pub fn polled(&self) -> u64 {
        self.total_votes_polled.unwrap_or(0)
    }

    pub fn share(&self, party: &str) -> Option<f64> {
        self.candidates.get(party).cloned()
    }
}

/// A polling station (booth), the unit of analysis.
///
/// Stored documents keep the casing of the source system (`ac_id`, `ps_no`,
/// `election2021`, ...). In memory the results are keyed by year.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StationDocument", into = "StationDocument")]
pub struct PollingStation {
    pub id: String,
    pub assembly_id: String,
    pub assembly_name: Option<String>,
    pub station_number: String,
    pub station_name: String,
    pub locality: String,
    /// 0 means unknown. Use `coordinates()`.
    pub latitude: f64,
    /// 0 means unknown. Use `coordinates()`.
    pub longitude: f64,
    pub category: Option<String>,
    pub strongest_party: Option<String>,
    pub scores: BTreeMap<String, f64>,
    pub election_results: BTreeMap<u32, ElectionResult>,
}

impl PollingStation {
    /// The location of the booth, if it is known.
    ///
    /// A zero latitude or longitude is a missing value in the source sheets,
    /// not a point on the equator.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let known = |x: f64| x.is_finite() && x != 0.0;
        if known(self.latitude) && known(self.longitude) {
            Some((self.latitude, self.longitude))
        } else {
            None
        }
    }

    pub fn result(&self, year: u32) -> Option<&ElectionResult> {
        self.election_results.get(&year)
    }

    pub fn share(&self, party: &str, year: u32) -> Option<f64> {
        self.result(year).and_then(|r| r.share(party))
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
struct StationDocument {
    id: String,
    ac_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ac_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    ps_no: String,
    #[serde(default, deserialize_with = "lenient_string")]
    ps_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    locality: String,
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(
        rename = "strongestParty",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    strongest_party: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    election2011: Option<ElectionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    election2016: Option<ElectionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    election2021: Option<ElectionResult>,
    // Elections outside of the usual years, and any field written by other tools.
    #[serde(flatten)]
    other: BTreeMap<String, JSValue>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = JSValue::deserialize(deserializer)?;
    Ok(match v {
        JSValue::String(s) => s,
        JSValue::Null => String::new(),
        other => other.to_string(),
    })
}

impl From<StationDocument> for PollingStation {
    fn from(doc: StationDocument) -> PollingStation {
        let mut election_results: BTreeMap<u32, ElectionResult> = BTreeMap::new();
        let fixed = [
            (2011, doc.election2011),
            (2016, doc.election2016),
            (2021, doc.election2021),
        ];
        for (year, res) in fixed {
            if let Some(mut r) = res {
                r.year = year;
                election_results.insert(year, r);
            }
        }
        for (key, value) in doc.other {
            let year = match key.strip_prefix("election").map(|y| y.parse::<u32>()) {
                Some(Ok(y)) => y,
                _ => continue,
            };
            if let Ok(mut r) = serde_json::from_value::<ElectionResult>(value) {
                r.year = year;
                election_results.insert(year, r);
            }
        }
        PollingStation {
            id: doc.id,
            assembly_id: doc.ac_id,
            assembly_name: doc.ac_name,
            station_number: doc.ps_no,
            station_name: doc.ps_name,
            locality: doc.locality,
            latitude: doc.latitude,
            longitude: doc.longitude,
            category: doc.category.filter(|c| !c.is_empty()),
            strongest_party: doc.strongest_party.filter(|p| !p.is_empty()),
            scores: doc.scores,
            election_results,
        }
    }
}

impl From<PollingStation> for StationDocument {
    fn from(ps: PollingStation) -> StationDocument {
        let mut results = ps.election_results;
        let election2011 = results.remove(&2011);
        let election2016 = results.remove(&2016);
        let election2021 = results.remove(&2021);
        let mut other: BTreeMap<String, JSValue> = BTreeMap::new();
        for (year, r) in results {
            if let Ok(v) = serde_json::to_value(r) {
                other.insert(format!("election{}", year), v);
            }
        }
        StationDocument {
            id: ps.id,
            ac_id: ps.assembly_id,
            ac_name: ps.assembly_name,
            ps_no: ps.station_number,
            ps_name: ps.station_name,
            locality: ps.locality,
            latitude: ps.latitude,
            longitude: ps.longitude,
            category: ps.category,
            strongest_party: ps.strongest_party,
            scores: ps.scores,
            election2011,
            election2016,
            election2021,
            other,
        }
    }
}

/// An assembly constituency.
///
/// Only `id` and `name` matter for the analytics. The narrative content edited
/// in the admin pages (scenario cards, ground reports, ...) is kept as is in `meta`.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Assembly {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(
        rename = "mapImageUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub map_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    #[serde(rename = "sheetName", default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    #[serde(flatten)]
    pub meta: BTreeMap<String, JSValue>,
}

impl Assembly {
    pub fn new(id: &str, name: &str) -> Assembly {
        Assembly {
            id: id.to_string(),
            name: name.to_string(),
            district: None,
            map_image_url: None,
            number: id.parse::<u32>().ok(),
            sheet_name: None,
            meta: BTreeMap::new(),
        }
    }
}

/// A candidate profile with its SWOT analysis.
///
/// The SWOT entries may contain rich-text markup. They are never interpreted here.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Candidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub assembly_id: String,
    pub name: String,
    pub party: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    pub education: String,
    pub experience: String,
    pub constituency: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub advantages: Vec<String>,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
    pub custom_cards: Vec<JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    /// Also the role of profiles with a missing or unknown role.
    #[default]
    #[serde(other)]
    Client,
}

/// A user profile, as resolved by the authentication layer.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessible_assemblies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessible_pages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessible_admin_sections: Option<Vec<String>>,
}

impl UserProfile {
    pub fn super_admin(uid: &str) -> UserProfile {
        UserProfile {
            uid: uid.to_string(),
            role: Role::SuperAdmin,
            ..Default::default()
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Dashboard,
    AdminSection,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub label: String,
    pub kind: PageKind,
}

impl Page {
    pub fn new(id: &str, label: &str, kind: PageKind) -> Page {
        Page {
            id: id.to_string(),
            label: label.to_string(),
            kind,
        }
    }
}

/// The pages of the public dashboard and the sections of the admin area.
pub fn default_pages() -> Vec<Page> {
    vec![
        Page::new("overview", "Assembly Overview", PageKind::Dashboard),
        Page::new(
            "political-history",
            "Political History & Dynamics",
            PageKind::Dashboard,
        ),
        Page::new("retro-booths", "Retro-Booths & Heat Maps", PageKind::Dashboard),
        Page::new("candidates", "Candidate Panel", PageKind::Dashboard),
        Page::new(
            "current-scenario",
            "Current Political Scenario",
            PageKind::Dashboard,
        ),
        Page::new("survey", "Survey", PageKind::Dashboard),
        Page::new("assemblies", "Assembly Content", PageKind::AdminSection),
        Page::new("candidate-editor", "Candidate Editor", PageKind::AdminSection),
        Page::new("users", "User Management", PageKind::AdminSection),
        Page::new("widgets", "Widget Settings", PageKind::AdminSection),
    ]
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Pie,
    Line,
}

/// Which widgets of the overview page are rendered.
///
/// Loaded once per session and passed by reference to whatever renders.
/// Missing keys in a stored document take the default value.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetConfig {
    pub show_polling_station_map: bool,
    pub show_party_performance: bool,
    pub show_category_distribution: bool,
    pub show_voter_turnout: bool,
    pub party_performance_chart_type: ChartType,
    pub category_distribution_chart_type: ChartType,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        WidgetConfig {
            show_polling_station_map: true,
            show_party_performance: true,
            show_category_distribution: true,
            show_voter_turnout: true,
            party_performance_chart_type: ChartType::Bar,
            category_distribution_chart_type: ChartType::Pie,
        }
    }
}

pub const RETRO_BOOTHS_PAGE: &str = "retrobooths";

/// Per-assembly settings of the booth analysis page.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub assembly_id: String,
    pub page_type: String,
    pub show_polling_table: bool,
    pub show_heat_map: bool,
    pub show_weak_booths: bool,
    pub show_independent_hotspots: bool,
    pub show_custom_cards: bool,
    pub heat_map_title: String,
    pub heat_map_description: String,
    pub retro_booths_title: String,
    pub retro_booths_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Default for PageConfig {
    fn default() -> Self {
        PageConfig {
            id: None,
            assembly_id: String::new(),
            page_type: RETRO_BOOTHS_PAGE.to_string(),
            show_polling_table: true,
            show_heat_map: true,
            show_weak_booths: true,
            show_independent_hotspots: true,
            show_custom_cards: true,
            heat_map_title: "Vote Share Analysis (2021)".to_string(),
            heat_map_description:
                "Visualizing booth-wise performance distribution. Each point represents a polling booth."
                    .to_string(),
            retro_booths_title: "Retro Booths".to_string(),
            retro_booths_description: "Booths with consistent strong performance for a party"
                .to_string(),
            updated_at: None,
        }
    }
}

impl PageConfig {
    pub fn default_for(assembly_id: &str, page_type: &str) -> PageConfig {
        PageConfig {
            assembly_id: assembly_id.to_string(),
            page_type: page_type.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    #[default]
    Text,
    Note,
    Info,
}

/// The page section a custom card is shown in.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CardSection {
    #[default]
    Overview,
    Retro,
    PoliticalHistory,
    Survey,
}

/// A free-form card written by the staff for a section of an assembly.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomCard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub assembly_id: String,
    pub heading: String,
    pub content: String,
    pub card_type: CardType,
    pub section: CardSection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Cards are shown by increasing order.
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Highlight,
    Trend,
    Warning,
    #[default]
    Info,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Insight {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub assembly_id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub order: i64,
}

/// Per-assembly settings of the political history page, with its insights.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoliticalHistoryConfig {
    pub assembly_id: String,
    pub show_electoral_trends: bool,
    pub show_vote_swing: bool,
    pub show_insights: bool,
    pub custom_narrative: String,
    /// Ordered by `order`. Stored apart from the settings.
    pub insights: Vec<Insight>,
}

impl Default for PoliticalHistoryConfig {
    fn default() -> Self {
        PoliticalHistoryConfig {
            assembly_id: String::new(),
            show_electoral_trends: true,
            show_vote_swing: true,
            show_insights: true,
            custom_narrative: String::new(),
            insights: Vec::new(),
        }
    }
}

impl PoliticalHistoryConfig {
    pub fn default_for(assembly_id: &str) -> PoliticalHistoryConfig {
        PoliticalHistoryConfig {
            assembly_id: assembly_id.to_string(),
            ..Default::default()
        }
    }
}

/// A sitting or former member of the legislative assembly.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Mla {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub assembly_id: String,
    /// The election year, as text ("2021").
    pub year: String,
    pub name: String,
    pub party: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_share: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

// ********* Options **********

/// How station ids are derived.
///
/// Ids are upsert keys: a whole assembly must be imported with one convention,
/// otherwise the same booth ends up stored twice.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IdConvention {
    /// `{assembly}_{station number}`, or `{assembly}_{index}` without a station number.
    NaturalKey,
    /// `{assembly}-{index + 1}`. Not stable if the rows of the source are reordered.
    Positional,
    /// Natural keys when they are present and unique within the assembly,
    /// positional otherwise. Only meaningful for a whole batch (see `StationsBuilder`).
    Auto,
}

/// The scale of the `_pct` columns in the source.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShareScale {
    /// Percentages when any share of a year is above 1, fractions otherwise.
    Auto,
    Fraction,
    Percent,
}

#[derive(PartialEq, Debug, Clone)]
pub struct NormalizeOptions {
    pub years: Vec<u32>,
    pub id_convention: IdConvention,
    pub share_scale: ShareScale,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            years: ELECTION_YEARS.to_vec(),
            id_convention: IdConvention::NaturalKey,
            share_scale: ShareScale::Auto,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct AggregateOptions {
    /// Used to estimate the electorate when the booths carry no voter roll.
    pub assumed_turnout_rate: f64,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        AggregateOptions {
            assumed_turnout_rate: DEFAULT_TURNOUT_RATE,
        }
    }
}

// ******** Output data structures *********

#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyShare {
    pub party: String,
    /// Votes attributed to the party: booth share times booth votes, summed.
    pub votes: f64,
    pub share_pct: f64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub stations: usize,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct BoothWins {
    pub party: String,
    pub booths: usize,
    /// Share of all the booths of the assembly.
    pub pct: f64,
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ElectorateSource {
    /// Sum of the voter rolls of the booths.
    VoterRoll,
    /// Votes polled divided by an assumed turnout rate. This is an
    /// approximation, not an electoral roll.
    #[serde(rename_all = "camelCase")]
    Estimated { assumed_turnout_rate: f64 },
}

#[derive(PartialEq, Debug, Clone, Copy, Serialize)]
pub struct Electorate {
    pub count: u64,
    pub source: ElectorateSource,
}

/// Statistics of one assembly for one election.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblySummary {
    pub year: u32,
    pub total_stations: usize,
    /// Stations that have a result for the year.
    pub reporting_stations: usize,
    /// Stations with known coordinates.
    pub mapped_stations: usize,
    pub total_polled: u64,
    pub electorate: Electorate,
    pub turnout_pct: f64,
    pub party_shares: Vec<PartyShare>,
    pub categories: Vec<CategoryCount>,
    pub booth_wins: Vec<BoothWins>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct YearSeries {
    pub year: u32,
    /// Mean booth share of each party, in percent.
    pub shares: BTreeMap<String, f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct PartySwing {
    pub party: String,
    /// Percentage points.
    pub swing: f64,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct SwingPeriod {
    pub from: u32,
    pub to: u32,
    pub swings: Vec<PartySwing>,
}

#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct TrendReport {
    pub series: Vec<YearSeries>,
    pub swings: Vec<SwingPeriod>,
}

impl TrendReport {
    pub fn mean_share(&self, year: u32, party: &str) -> Option<f64> {
        self.series
            .iter()
            .find(|ys| ys.year == year)
            .and_then(|ys| ys.shares.get(party).cloned())
    }

    pub fn swing(&self, from: u32, to: u32, party: &str) -> Option<f64> {
        self.swings
            .iter()
            .find(|sp| sp.from == from && sp.to == to)
            .and_then(|sp| sp.swings.iter().find(|ps| ps.party == party))
            .map(|ps| ps.swing)
    }
}

/// A booth flagged for a party by one of the booth classifications.
#[derive(PartialEq, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedBooth {
    pub station_id: String,
    pub locality: String,
    pub party: String,
    /// Fraction, 0-1.
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

// ******** Errors *********

/// Errors raised while ingesting raw records.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum IngestError {
    /// The record is not a JSON object.
    MalformedRecord {
        assembly_id: String,
        index: usize,
        found: String,
    },
}

impl Error for IngestError {}

impl Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::MalformedRecord {
                assembly_id,
                index,
                found,
            } => write!(
                f,
                "malformed record #{} in assembly {}: expected an object, found {}",
                index, assembly_id, found
            ),
        }
    }
}
