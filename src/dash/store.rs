//! Persistence of the dashboard documents.
//!
//! Documents live at slash-separated paths (`assemblies/3/polling_stations/3_17`):
//! collections and document ids alternate, as in the hosted document database
//! the dashboard was built on. Two backends are provided, an in-memory one and
//! one backed by a single JSON file.
//!
//! Writes replace the whole document unless a merge is requested. Two
//! concurrent edits of the same station are last-writer-wins.

use std::collections::{BTreeMap, HashSet};

use crate::dash::*;

pub const ASSEMBLIES: &str = "assemblies";
pub const POLLING_STATIONS: &str = "polling_stations";
/// The flat collection of stations used before stations were nested under assemblies.
pub const FLAT_POLLING_STATIONS: &str = "pollingStations";
pub const CANDIDATES: &str = "candidates";
pub const USERS: &str = "users";
pub const PAGE_CONFIGS: &str = "pageConfigs";
pub const WIDGET_CONFIG_PATH: &str = "system_config/dashboard_v1";
pub const SURVEY_DATA_PATH: &str = "surveyData/general";
pub const CUSTOM_CARDS: &str = "customCards";
pub const POLITICAL_HISTORY_CONFIG: &str = "politicalHistoryConfig";
pub const INSIGHTS: &str = "insights";
pub const MLAS: &str = "mlas";

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SetMode {
    /// The document is replaced as a whole.
    Replace,
    /// The fields of the new document are merged into the existing one.
    Merge,
}

pub trait DocumentStore {
    fn get(&self, path: &str) -> DashResult<Option<JSValue>>;

    fn set(&mut self, path: &str, doc: JSValue, mode: SetMode) -> DashResult<()>;

    /// Writes several documents. Nothing is written if one of the paths is invalid.
    fn set_many(&mut self, docs: Vec<(String, JSValue)>, mode: SetMode) -> DashResult<()> {
        for (path, _) in docs.iter() {
            check_doc_path(path)?;
        }
        for (path, doc) in docs {
            self.set(&path, doc, mode)?;
        }
        Ok(())
    }

    /// Returns true if the document existed.
    fn delete(&mut self, path: &str) -> DashResult<bool>;

    /// The documents directly inside a collection, as (id, document) pairs, ordered by id.
    fn list(&self, collection: &str) -> DashResult<Vec<(String, JSValue)>>;

    /// The documents of all the collections with this name, wherever they are
    /// nested, as (full path, document) pairs.
    fn collection_group(&self, name: &str) -> DashResult<Vec<(String, JSValue)>>;
}

fn check_doc_path(path: &str) -> DashResult<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
        return InvalidPathSnafu { path }.fail();
    }
    Ok(())
}

fn check_collection_path(path: &str) -> DashResult<()> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() % 2 != 1 || segments.iter().any(|s| s.is_empty()) {
        return InvalidPathSnafu { path }.fail();
    }
    Ok(())
}

/// Merges `patch` into `target`. Nested objects are merged, everything else is replaced.
pub fn merge_json(target: &mut JSValue, patch: JSValue) {
    match (target, patch) {
        (JSValue::Object(t), JSValue::Object(p)) => {
            for (k, v) in p {
                match t.get_mut(&k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        t.insert(k, v);
                    }
                }
            }
        }
        (t, p) => *t = p,
    }
}

/// The documents, keyed by path. Shared by the two backends.
#[derive(PartialEq, Debug, Clone, Default)]
struct Documents(BTreeMap<String, JSValue>);

impl Documents {
    fn get(&self, path: &str) -> DashResult<Option<JSValue>> {
        check_doc_path(path)?;
        Ok(self.0.get(path).cloned())
    }

    fn set(&mut self, path: &str, doc: JSValue, mode: SetMode) -> DashResult<()> {
        check_doc_path(path)?;
        match (mode, self.0.get_mut(path)) {
            (SetMode::Merge, Some(existing)) => merge_json(existing, doc),
            _ => {
                self.0.insert(path.to_string(), doc);
            }
        }
        Ok(())
    }

    fn set_many(&mut self, docs: Vec<(String, JSValue)>, mode: SetMode) -> DashResult<()> {
        for (path, _) in docs.iter() {
            check_doc_path(path)?;
        }
        for (path, doc) in docs {
            self.set(&path, doc, mode)?;
        }
        Ok(())
    }

    fn delete(&mut self, path: &str) -> DashResult<bool> {
        check_doc_path(path)?;
        Ok(self.0.remove(path).is_some())
    }

    fn list(&self, collection: &str) -> DashResult<Vec<(String, JSValue)>> {
        check_collection_path(collection)?;
        let prefix = format!("{}/", collection);
        Ok(self
            .0
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, v)| {
                let id = &k[prefix.len()..];
                if id.contains('/') {
                    None
                } else {
                    Some((id.to_string(), v.clone()))
                }
            })
            .collect())
    }

    fn collection_group(&self, name: &str) -> DashResult<Vec<(String, JSValue)>> {
        Ok(self
            .0
            .iter()
            .filter(|(k, _)| {
                let segments: Vec<&str> = k.split('/').collect();
                segments.len() >= 2 && segments[segments.len() - 2] == name
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// A store kept in memory, for tests and for runs without a store.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Documents,
    unreachable: bool,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// A store that fails every call, as a database that cannot be reached.
    pub fn unreachable() -> MemoryStore {
        MemoryStore {
            docs: Documents::default(),
            unreachable: true,
        }
    }

    fn check(&self) -> DashResult<()> {
        if self.unreachable {
            return StoreUnreachableSnafu {}.fail();
        }
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &str) -> DashResult<Option<JSValue>> {
        self.check()?;
        self.docs.get(path)
    }

    fn set(&mut self, path: &str, doc: JSValue, mode: SetMode) -> DashResult<()> {
        self.check()?;
        self.docs.set(path, doc, mode)
    }

    fn delete(&mut self, path: &str) -> DashResult<bool> {
        self.check()?;
        self.docs.delete(path)
    }

    fn list(&self, collection: &str) -> DashResult<Vec<(String, JSValue)>> {
        self.check()?;
        self.docs.list(collection)
    }

    fn collection_group(&self, name: &str) -> DashResult<Vec<(String, JSValue)>> {
        self.check()?;
        self.docs.collection_group(name)
    }
}

/// A store saved as a single JSON object `{path: document}`.
///
/// The file is rewritten after every write call. Use `set_many` for bulk
/// writes, which rewrites it once.
#[derive(PartialEq, Debug, Clone)]
pub struct JsonFileStore {
    path: String,
    docs: Documents,
    // Number of times the file was written.
    flushes: usize,
}

impl JsonFileStore {
    /// Opens the store. A missing file is an empty store, created at the first write.
    pub fn open(path: &str) -> DashResult<JsonFileStore> {
        let docs = if Path::new(path).exists() {
            let js = read_json(path)?;
            match js {
                JSValue::Object(m) => Documents(m.into_iter().collect()),
                _ => whatever!("The store {} is not a JSON object", path),
            }
        } else {
            info!("JsonFileStore::open: {} does not exist, starting empty", path);
            Documents::default()
        };
        debug!("JsonFileStore::open: {}: {} documents", path, docs.0.len());
        Ok(JsonFileStore {
            path: path.to_string(),
            docs,
            flushes: 0,
        })
    }

    fn flush(&mut self) -> DashResult<()> {
        self.flushes += 1;
        let js: JSMap<String, JSValue> = self
            .docs
            .0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let s = serde_json::to_string_pretty(&JSValue::Object(js)).context(ParsingJsonSnafu {})?;
        debug!(
            "flush: {}: {} documents (write {})",
            self.path,
            self.docs.0.len(),
            self.flushes
        );
        fs::write(&self.path, s).context(WritingFileSnafu {
            path: self.path.clone(),
        })
    }
}

impl DocumentStore for JsonFileStore {
    fn get(&self, path: &str) -> DashResult<Option<JSValue>> {
        self.docs.get(path)
    }

    fn set(&mut self, path: &str, doc: JSValue, mode: SetMode) -> DashResult<()> {
        self.docs.set(path, doc, mode)?;
        self.flush()
    }

    fn set_many(&mut self, docs: Vec<(String, JSValue)>, mode: SetMode) -> DashResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        self.docs.set_many(docs, mode)?;
        self.flush()
    }

    fn delete(&mut self, path: &str) -> DashResult<bool> {
        let existed = self.docs.delete(path)?;
        if existed {
            self.flush()?;
        }
        Ok(existed)
    }

    fn list(&self, collection: &str) -> DashResult<Vec<(String, JSValue)>> {
        self.docs.list(collection)
    }

    fn collection_group(&self, name: &str) -> DashResult<Vec<(String, JSValue)>> {
        self.docs.collection_group(name)
    }
}

/// Typed access to the dashboard documents.
///
/// Station reads never fail: when the store has no station for the request,
/// or cannot be read, the stations of the bundled snapshot are returned.
pub struct Gateway<S: DocumentStore> {
    store: S,
    snapshot: Vec<PollingStation>,
}

impl<S: DocumentStore> Gateway<S> {
    pub fn new(store: S, snapshot: Vec<PollingStation>) -> Gateway<S> {
        Gateway { store, snapshot }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ******** Stations ********

    pub fn list_stations(&self, assembly_id: Option<&str>) -> Vec<PollingStation> {
        match self.stored_stations(assembly_id) {
            Ok(l) if !l.is_empty() => l,
            Ok(_) => {
                debug!(
                    "list_stations: no stored station for {:?}, using the snapshot",
                    assembly_id
                );
                self.snapshot_stations(assembly_id)
            }
            Err(e) => {
                warn!(
                    "list_stations: could not read the store ({}), using the snapshot",
                    e
                );
                self.snapshot_stations(assembly_id)
            }
        }
    }

    fn snapshot_stations(&self, assembly_id: Option<&str>) -> Vec<PollingStation> {
        self.snapshot
            .iter()
            .filter(|ps| assembly_id.map_or(true, |ac| ps.assembly_id == ac))
            .cloned()
            .collect()
    }

    fn stored_stations(&self, assembly_id: Option<&str>) -> DashResult<Vec<PollingStation>> {
        let nested: Vec<(String, JSValue)> = match assembly_id {
            Some(ac) => self
                .store
                .list(&format!("{}/{}/{}", ASSEMBLIES, ac, POLLING_STATIONS))?,
            None => self.store.collection_group(POLLING_STATIONS)?,
        };
        let flat = self.store.list(FLAT_POLLING_STATIONS)?;

        let mut res: Vec<PollingStation> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for (key, doc) in nested.into_iter().chain(flat.into_iter()) {
            let ps = match parse_station(&key, doc) {
                Some(ps) => ps,
                None => continue,
            };
            if assembly_id.map_or(false, |ac| ps.assembly_id != ac) {
                continue;
            }
            // The nested documents come first and win over the flat ones.
            if !seen.insert((ps.assembly_id.clone(), ps.id.clone())) {
                continue;
            }
            res.push(ps);
        }
        Ok(res)
    }

    pub fn upsert_station(&mut self, station: &PollingStation, mode: SetMode) -> DashResult<()> {
        let path = station_path(&station.assembly_id, &station.id);
        let doc = serde_json::to_value(station).context(ParsingJsonSnafu {})?;
        debug!("upsert_station: {} ({:?})", path, mode);
        self.store.set(&path, doc, mode)
    }

    /// Writes many stations in a single store call.
    pub fn upsert_stations(&mut self, stations: &[PollingStation], mode: SetMode) -> DashResult<()> {
        let mut docs: Vec<(String, JSValue)> = Vec::with_capacity(stations.len());
        for ps in stations.iter() {
            let doc = serde_json::to_value(ps).context(ParsingJsonSnafu {})?;
            docs.push((station_path(&ps.assembly_id, &ps.id), doc));
        }
        info!("upsert_stations: {} stations ({:?})", docs.len(), mode);
        self.store.set_many(docs, mode)
    }

    // ******** Assemblies ********

    pub fn list_assemblies(&self) -> DashResult<Vec<Assembly>> {
        let docs = self.store.list(ASSEMBLIES)?;
        Ok(docs
            .into_iter()
            .filter_map(|(id, doc)| parse_with_id::<Assembly>(&id, doc))
            .collect())
    }

    pub fn get_assembly(&self, id: &str) -> DashResult<Option<Assembly>> {
        let doc = self.store.get(&format!("{}/{}", ASSEMBLIES, id))?;
        Ok(doc.and_then(|d| parse_with_id::<Assembly>(id, d)))
    }

    /// Assemblies are always merged, so that the narrative content edited
    /// elsewhere is kept.
    pub fn upsert_assembly(&mut self, assembly: &Assembly) -> DashResult<()> {
        let doc = serde_json::to_value(assembly).context(ParsingJsonSnafu {})?;
        self.store
            .set(&format!("{}/{}", ASSEMBLIES, assembly.id), doc, SetMode::Merge)
    }

    // ******** Candidates ********

    pub fn list_candidates(&self, assembly_id: Option<&str>) -> DashResult<Vec<Candidate>> {
        let docs = self.store.list(CANDIDATES)?;
        Ok(docs
            .into_iter()
            .filter_map(|(id, doc)| parse_with_id::<Candidate>(&id, doc))
            .filter(|c| assembly_id.map_or(true, |ac| c.assembly_id == ac))
            .collect())
    }

    /// Saves a candidate, and returns its id. A candidate without an id gets one.
    pub fn save_candidate(&mut self, candidate: &Candidate) -> DashResult<String> {
        let id = match candidate.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.new_candidate_id(candidate)?,
        };
        let mut c = candidate.clone();
        c.id = Some(id.clone());
        let doc = serde_json::to_value(&c).context(ParsingJsonSnafu {})?;
        self.store
            .set(&format!("{}/{}", CANDIDATES, id), doc, SetMode::Replace)?;
        Ok(id)
    }

    fn new_candidate_id(&self, candidate: &Candidate) -> DashResult<String> {
        let key = format!(
            "{}|{}|{}",
            candidate.assembly_id, candidate.party, candidate.name
        );
        self.new_doc_id(CANDIDATES, &key)
    }

    // The id is derived from the content of the document, and lengthened until
    // it is not taken.
    fn new_doc_id(&self, collection: &str, key: &str) -> DashResult<String> {
        let digest = sha256::digest(key);
        for len in (12..=digest.len()).step_by(4) {
            let id = digest[..len].to_string();
            if self
                .store
                .get(&format!("{}/{}", collection, id))?
                .is_none()
            {
                return Ok(id);
            }
        }
        whatever!("Could not find a free id in {} for {}", collection, key)
    }

    pub fn delete_candidate(&mut self, id: &str) -> DashResult<bool> {
        self.store.delete(&format!("{}/{}", CANDIDATES, id))
    }

    // ******** Users ********

    pub fn load_user(&self, uid: &str) -> DashResult<Option<UserProfile>> {
        let doc = self.store.get(&format!("{}/{}", USERS, uid))?;
        Ok(doc.and_then(|d| {
            let mut user = parse_with_id::<UserProfile>(uid, d)?;
            if user.uid.is_empty() {
                user.uid = uid.to_string();
            }
            Some(user)
        }))
    }

    pub fn save_user(&mut self, user: &UserProfile) -> DashResult<()> {
        let doc = serde_json::to_value(user).context(ParsingJsonSnafu {})?;
        self.store
            .set(&format!("{}/{}", USERS, user.uid), doc, SetMode::Replace)
    }

    // ******** Survey ********

    /// The survey results, as entered by the staff. An empty object when there are none.
    pub fn load_survey_data(&self) -> DashResult<JSValue> {
        Ok(self
            .store
            .get(SURVEY_DATA_PATH)?
            .unwrap_or_else(|| JSValue::Object(JSMap::new())))
    }

    pub fn save_survey_data(&mut self, data: &JSValue) -> DashResult<()> {
        self.store
            .set(SURVEY_DATA_PATH, data.clone(), SetMode::Replace)
    }

    // ******** Custom cards ********

    /// The cards of an assembly and a section, by increasing order.
    pub fn list_custom_cards(
        &self,
        assembly_id: Option<&str>,
        section: Option<CardSection>,
    ) -> DashResult<Vec<CustomCard>> {
        let mut cards: Vec<CustomCard> = self
            .store
            .list(CUSTOM_CARDS)?
            .into_iter()
            .filter_map(|(id, doc)| parse_with_id::<CustomCard>(&id, doc))
            .filter(|c| assembly_id.map_or(true, |ac| c.assembly_id == ac))
            .filter(|c| section.map_or(true, |s| c.section == s))
            .collect();
        cards.sort_by_key(|c| c.order);
        Ok(cards)
    }

    /// Creates a card without id, or updates the fields of an existing one.
    pub fn save_custom_card(&mut self, card: &CustomCard) -> DashResult<String> {
        let (id, mode) = match card.id.as_deref() {
            Some(id) if !id.is_empty() => (id.to_string(), SetMode::Merge),
            _ => {
                let key = format!(
                    "{}|{:?}|{}|{}",
                    card.assembly_id, card.section, card.heading, card.content
                );
                (self.new_doc_id(CUSTOM_CARDS, &key)?, SetMode::Replace)
            }
        };
        let mut c = card.clone();
        c.id = None;
        let doc = serde_json::to_value(&c).context(ParsingJsonSnafu {})?;
        self.store
            .set(&format!("{}/{}", CUSTOM_CARDS, id), doc, mode)?;
        Ok(id)
    }

    pub fn delete_custom_card(&mut self, id: &str) -> DashResult<bool> {
        self.store.delete(&format!("{}/{}", CUSTOM_CARDS, id))
    }

    // ******** Political history ********

    /// The settings of the political history page of an assembly, with its
    /// insights by increasing order. Defaults when nothing is stored.
    pub fn load_political_history_config(
        &self,
        assembly_id: &str,
    ) -> DashResult<PoliticalHistoryConfig> {
        let path = political_history_path(assembly_id);
        let mut config = match self.store.get(&path)? {
            Some(doc) => serde_json::from_value(doc).context(ParsingJsonSnafu {})?,
            None => PoliticalHistoryConfig::default_for(assembly_id),
        };
        if config.assembly_id.is_empty() {
            config.assembly_id = assembly_id.to_string();
        }
        let mut insights: Vec<Insight> = self
            .store
            .list(&format!("{}/{}", path, INSIGHTS))?
            .into_iter()
            .filter_map(|(id, doc)| parse_with_id::<Insight>(&id, doc))
            .collect();
        insights.sort_by_key(|i| i.order);
        config.insights = insights;
        Ok(config)
    }

    /// Merges the settings, and replaces all the insights. The insights are
    /// renumbered in the order given.
    pub fn save_political_history_config(
        &mut self,
        config: &PoliticalHistoryConfig,
    ) -> DashResult<()> {
        let path = political_history_path(&config.assembly_id);
        let mut doc = serde_json::to_value(config).context(ParsingJsonSnafu {})?;
        if let JSValue::Object(m) = &mut doc {
            m.remove(INSIGHTS);
        }
        self.store.set(&path, doc, SetMode::Merge)?;

        let collection = format!("{}/{}", path, INSIGHTS);
        for (id, _) in self.store.list(&collection)? {
            self.store.delete(&format!("{}/{}", collection, id))?;
        }
        let mut docs: Vec<(String, JSValue)> = Vec::new();
        for (index, insight) in config.insights.iter().enumerate() {
            let mut i = insight.clone();
            i.id = None;
            i.order = index as i64;
            i.assembly_id = config.assembly_id.clone();
            let doc = serde_json::to_value(&i).context(ParsingJsonSnafu {})?;
            docs.push((format!("{}/insight_{}", collection, index), doc));
        }
        debug!(
            "save_political_history_config: {}: {} insights",
            config.assembly_id,
            docs.len()
        );
        self.store.set_many(docs, SetMode::Replace)
    }

    // ******** MLAs ********

    pub fn list_mlas(&self, assembly_id: Option<&str>, year: Option<&str>) -> DashResult<Vec<Mla>> {
        Ok(self
            .store
            .list(MLAS)?
            .into_iter()
            .filter_map(|(id, doc)| parse_with_id::<Mla>(&id, doc))
            .filter(|m| assembly_id.map_or(true, |ac| m.assembly_id == ac))
            .filter(|m| year.map_or(true, |y| m.year == y))
            .collect())
    }

    /// Creates an MLA without id, or updates the fields of an existing one.
    pub fn save_mla(&mut self, mla: &Mla) -> DashResult<String> {
        let (id, mode) = match mla.id.as_deref() {
            Some(id) if !id.is_empty() => (id.to_string(), SetMode::Merge),
            _ => {
                let key = format!("{}|{}|{}", mla.assembly_id, mla.year, mla.name);
                (self.new_doc_id(MLAS, &key)?, SetMode::Replace)
            }
        };
        let mut m = mla.clone();
        m.id = None;
        let doc = serde_json::to_value(&m).context(ParsingJsonSnafu {})?;
        self.store.set(&format!("{}/{}", MLAS, id), doc, mode)?;
        Ok(id)
    }

    pub fn delete_mla(&mut self, id: &str) -> DashResult<bool> {
        self.store.delete(&format!("{}/{}", MLAS, id))
    }

    // ******** Configuration ********

    /// The widget settings. Missing settings take their default value.
    pub fn load_widget_config(&self) -> DashResult<WidgetConfig> {
        match self.store.get(WIDGET_CONFIG_PATH)? {
            Some(doc) => serde_json::from_value(doc).context(ParsingJsonSnafu {}),
            None => Ok(WidgetConfig::default()),
        }
    }

    pub fn save_widget_config(&mut self, config: &WidgetConfig) -> DashResult<()> {
        let doc = serde_json::to_value(config).context(ParsingJsonSnafu {})?;
        self.store.set(WIDGET_CONFIG_PATH, doc, SetMode::Replace)
    }

    /// The settings of a page of an assembly, or the defaults if there are none.
    pub fn load_page_config(&self, assembly_id: &str, page_type: &str) -> DashResult<PageConfig> {
        let docs = self.store.list(PAGE_CONFIGS)?;
        let found = docs
            .into_iter()
            .filter_map(|(id, doc)| {
                let mut pc: PageConfig = serde_json::from_value(doc).ok()?;
                pc.id = Some(id);
                Some(pc)
            })
            .find(|pc| pc.assembly_id == assembly_id && pc.page_type == page_type);
        Ok(found.unwrap_or_else(|| PageConfig::default_for(assembly_id, page_type)))
    }

    pub fn save_page_config(&mut self, config: &PageConfig) -> DashResult<String> {
        let id = match config.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("{}_{}", config.assembly_id, config.page_type),
        };
        let mut pc = config.clone();
        pc.id = None;
        let doc = serde_json::to_value(&pc).context(ParsingJsonSnafu {})?;
        self.store
            .set(&format!("{}/{}", PAGE_CONFIGS, id), doc, SetMode::Replace)?;
        Ok(id)
    }
}

fn political_history_path(assembly_id: &str) -> String {
    format!("{}/config_{}", POLITICAL_HISTORY_CONFIG, assembly_id)
}

pub fn station_path(assembly_id: &str, station_id: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        ASSEMBLIES, assembly_id, POLLING_STATIONS, station_id
    )
}

// The id of a document is its key in the store, when the document has none.
fn parse_station(key: &str, mut doc: JSValue) -> Option<PollingStation> {
    let id = key.rsplit('/').next().unwrap_or(key);
    if let JSValue::Object(m) = &mut doc {
        m.entry("id").or_insert_with(|| JSValue::String(id.to_string()));
    }
    match serde_json::from_value::<PollingStation>(doc) {
        Ok(ps) => Some(ps),
        Err(e) => {
            warn!("parse_station: skipping document {}: {}", key, e);
            None
        }
    }
}

fn parse_with_id<T: serde::de::DeserializeOwned>(id: &str, mut doc: JSValue) -> Option<T> {
    if let JSValue::Object(m) = &mut doc {
        m.entry("id").or_insert_with(|| JSValue::String(id.to_string()));
    }
    match serde_json::from_value::<T>(doc) {
        Ok(x) => Some(x),
        Err(e) => {
            warn!("parse_with_id: skipping document {}: {}", id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booth_analytics::builder::StationsBuilder;
    use serde_json::json;

    fn snapshot() -> Vec<PollingStation> {
        let mut builder = StationsBuilder::new(&NormalizeOptions::default());
        builder.add_records(
            "1",
            &[
                json!({"PS_NO_2021": "1", "BJP_2021_pct": 0.4, "DMK_2021_pct": 0.6, "POLLED_2021": 800}),
                json!({"PS_NO_2021": "2", "BJP_2021_pct": 0.5, "DMK_2021_pct": 0.5, "POLLED_2021": 200}),
            ],
        );
        builder.add_records("2", &[json!({"PS_NO_2021": "1", "NRC_2021_pct": 0.7})]);
        builder.build().0
    }

    #[test]
    fn falls_back_to_the_snapshot() {
        let gateway = Gateway::new(MemoryStore::new(), snapshot());
        assert_eq!(gateway.list_stations(Some("1")).len(), 2);
        assert_eq!(gateway.list_stations(None).len(), 3);
        assert!(gateway.list_stations(Some("99")).is_empty());

        let gateway = Gateway::new(MemoryStore::unreachable(), snapshot());
        assert_eq!(gateway.list_stations(Some("2")).len(), 1);
        assert!(gateway.list_stations(Some("99")).is_empty());
    }

    #[test]
    fn stored_stations_win_over_the_snapshot() {
        let mut gateway = Gateway::new(MemoryStore::new(), snapshot());
        let mut ps = snapshot()[0].clone();
        ps.locality = "Bahour".to_string();
        gateway.upsert_station(&ps, SetMode::Replace).unwrap();

        let stations = gateway.list_stations(Some("1"));
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].locality, "Bahour");
        // The other assemblies still come from the snapshot.
        assert_eq!(gateway.list_stations(Some("2")).len(), 1);
        assert!(gateway
            .store()
            .get("assemblies/1/polling_stations/1_1")
            .unwrap()
            .is_some());
    }

    #[test]
    fn flat_and_nested_stations() {
        let mut store = MemoryStore::new();
        store
            .set(
                "pollingStations/1-1",
                json!({"ac_id": "1", "ps_no": 1, "ps_name": "Old school", "latitude": 11.9, "longitude": 79.7}),
                SetMode::Replace,
            )
            .unwrap();
        store
            .set(
                "pollingStations/2-1",
                json!({"ac_id": "2", "ps_no": "1"}),
                SetMode::Replace,
            )
            .unwrap();
        store
            .set(
                "assemblies/1/polling_stations/1-1",
                json!({"ac_id": "1", "ps_no": "1", "ps_name": "New school"}),
                SetMode::Replace,
            )
            .unwrap();
        let gateway = Gateway::new(store, Vec::new());

        let stations = gateway.list_stations(Some("1"));
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, "1-1");
        assert_eq!(stations[0].station_name, "New school");
        assert_eq!(gateway.list_stations(None).len(), 2);
        assert_eq!(gateway.list_stations(Some("2"))[0].station_number, "1");
    }

    #[test]
    fn last_writer_wins() {
        let mut gateway = Gateway::new(MemoryStore::new(), Vec::new());
        let base = snapshot()[0].clone();

        // Two sessions read the same station and edit different fields.
        let mut first = base.clone();
        first.locality = "Ariyur".to_string();
        let mut second = base.clone();
        second.category = Some("C".to_string());

        gateway.upsert_station(&first, SetMode::Replace).unwrap();
        gateway.upsert_station(&second, SetMode::Replace).unwrap();

        let stored = gateway.list_stations(Some("1"));
        assert_eq!(stored.len(), 1);
        // The edit of the first session is lost.
        assert_eq!(stored[0].locality, base.locality);
        assert_eq!(stored[0].category.as_deref(), Some("C"));
    }

    #[test]
    fn merge_keeps_other_fields() {
        let mut store = MemoryStore::new();
        store
            .set(
                "assemblies/4",
                json!({"id": "4", "name": "Mudaliarpet", "scenario": {"cards": [1, 2]}}),
                SetMode::Replace,
            )
            .unwrap();
        let mut gateway = Gateway::new(store, Vec::new());
        let mut a = Assembly::new("4", "Mudaliarpet (SC)");
        a.district = Some("Puducherry".to_string());
        gateway.upsert_assembly(&a).unwrap();

        let stored = gateway.get_assembly("4").unwrap().unwrap();
        assert_eq!(stored.name, "Mudaliarpet (SC)");
        assert_eq!(stored.district.as_deref(), Some("Puducherry"));
        assert_eq!(stored.meta["scenario"], json!({"cards": [1, 2]}));
        assert_eq!(gateway.list_assemblies().unwrap().len(), 1);
        assert_eq!(gateway.get_assembly("5").unwrap(), None);
    }

    #[test]
    fn merge_json_is_deep() {
        let mut a = json!({"x": {"y": 1, "z": 2}, "w": [1]});
        merge_json(&mut a, json!({"x": {"y": 3}, "w": [2, 3]}));
        assert_eq!(a, json!({"x": {"y": 3, "z": 2}, "w": [2, 3]}));
    }

    #[test]
    fn candidates() {
        let mut gateway = Gateway::new(MemoryStore::new(), Vec::new());
        let c = Candidate {
            assembly_id: "3".to_string(),
            name: "R. Selvam".to_string(),
            party: "DMK".to_string(),
            strengths: vec!["<b>Grassroots</b> network".to_string()],
            ..Default::default()
        };
        let id = gateway.save_candidate(&c).unwrap();
        assert_eq!(id.len(), 12);
        // Same profile, new id.
        let id2 = gateway.save_candidate(&c).unwrap();
        assert_ne!(id, id2);
        assert!(id2.starts_with(&id));

        let other = Candidate {
            assembly_id: "4".to_string(),
            ..c.clone()
        };
        gateway.save_candidate(&other).unwrap();

        let listed = gateway.list_candidates(Some("3")).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].strengths, c.strengths);
        assert_eq!(gateway.list_candidates(None).unwrap().len(), 3);

        assert!(gateway.delete_candidate(&id).unwrap());
        assert!(!gateway.delete_candidate(&id).unwrap());
        assert_eq!(gateway.list_candidates(Some("3")).unwrap().len(), 1);
    }

    #[test]
    fn users() {
        let mut gateway = Gateway::new(MemoryStore::new(), Vec::new());
        assert_eq!(gateway.load_user("u1").unwrap(), None);
        let user = UserProfile {
            uid: "u1".to_string(),
            role: Role::Admin,
            accessible_admin_sections: Some(vec!["users".to_string()]),
            ..Default::default()
        };
        gateway.save_user(&user).unwrap();
        assert_eq!(gateway.load_user("u1").unwrap(), Some(user));
    }

    #[test]
    fn widget_config_defaults() {
        let mut store = MemoryStore::new();
        store
            .set(
                WIDGET_CONFIG_PATH,
                json!({"showVoterTurnout": false, "partyPerformanceChartType": "pie"}),
                SetMode::Replace,
            )
            .unwrap();
        let mut gateway = Gateway::new(store, Vec::new());
        let wc = gateway.load_widget_config().unwrap();
        assert!(!wc.show_voter_turnout);
        assert!(wc.show_polling_station_map);
        assert_eq!(wc.party_performance_chart_type, ChartType::Pie);
        assert_eq!(wc.category_distribution_chart_type, ChartType::Pie);

        gateway.save_widget_config(&WidgetConfig::default()).unwrap();
        assert_eq!(gateway.load_widget_config().unwrap(), WidgetConfig::default());

        let empty = Gateway::new(MemoryStore::new(), Vec::new());
        assert_eq!(empty.load_widget_config().unwrap(), WidgetConfig::default());
    }

    #[test]
    fn page_configs() {
        let mut gateway = Gateway::new(MemoryStore::new(), Vec::new());
        let pc = gateway.load_page_config("3", RETRO_BOOTHS_PAGE).unwrap();
        assert_eq!(pc, PageConfig::default_for("3", RETRO_BOOTHS_PAGE));

        let edited = PageConfig {
            show_heat_map: false,
            heat_map_title: "Booth map".to_string(),
            ..pc
        };
        let id = gateway.save_page_config(&edited).unwrap();
        assert_eq!(id, "3_retrobooths");
        let loaded = gateway.load_page_config("3", RETRO_BOOTHS_PAGE).unwrap();
        assert_eq!(loaded.id.as_deref(), Some("3_retrobooths"));
        assert!(!loaded.show_heat_map);
        assert!(loaded.show_weak_booths);
        assert!(gateway
            .load_page_config("4", RETRO_BOOTHS_PAGE)
            .unwrap()
            .show_heat_map);
    }

    #[test]
    fn invalid_paths() {
        let mut store = MemoryStore::new();
        assert!(store.set("assemblies", json!({}), SetMode::Replace).is_err());
        assert!(store.set("assemblies//x", json!({}), SetMode::Replace).is_err());
        assert!(store.list("assemblies/1").is_err());
    }

    #[test]
    fn json_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let path = path.to_str().unwrap();
        {
            let mut store = JsonFileStore::open(path).unwrap();
            store
                .set("assemblies/1", json!({"name": "Mannadipet"}), SetMode::Replace)
                .unwrap();
            store
                .set("assemblies/1/polling_stations/1_1", json!({"ac_id": "1"}), SetMode::Replace)
                .unwrap();
            store
                .set("assemblies/2", json!({"name": "Thirubhuvanai"}), SetMode::Replace)
                .unwrap();
            assert!(store.delete("assemblies/2").unwrap());
        }
        let store = JsonFileStore::open(path).unwrap();
        let listed = store.list(ASSEMBLIES).unwrap();
        assert_eq!(listed, vec![("1".to_string(), json!({"name": "Mannadipet"}))]);
        assert_eq!(store.collection_group(POLLING_STATIONS).unwrap().len(), 1);

        let gateway = Gateway::new(store, Vec::new());
        let stations = gateway.list_stations(Some("1"));
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, "1_1");
    }

    #[test]
    fn json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(JsonFileStore::open(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn bulk_writes_rewrite_the_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let path = path.to_str().unwrap();
        let stations: Vec<PollingStation> = (1..=50)
            .map(|no| {
                let mut ps = snapshot()[0].clone();
                ps.id = format!("1_{}", no);
                ps.station_number = no.to_string();
                ps
            })
            .collect();

        let mut gateway = Gateway::new(JsonFileStore::open(path).unwrap(), Vec::new());
        gateway.upsert_stations(&stations, SetMode::Replace).unwrap();
        assert_eq!(gateway.store().flushes, 1);
        gateway.upsert_stations(&[], SetMode::Replace).unwrap();
        assert_eq!(gateway.store().flushes, 1);

        let reopened = Gateway::new(JsonFileStore::open(path).unwrap(), Vec::new());
        assert_eq!(reopened.list_stations(Some("1")).len(), 50);
    }

    #[test]
    fn bulk_writes_check_all_paths_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let mut store = JsonFileStore::open(path.to_str().unwrap()).unwrap();
        let docs = vec![
            ("assemblies/1".to_string(), json!({"name": "Mannadipet"})),
            ("assemblies".to_string(), json!({})),
        ];
        assert!(store.set_many(docs.clone(), SetMode::Replace).is_err());
        assert_eq!(store.get("assemblies/1").unwrap(), None);
        assert!(!path.exists());

        let mut memory = MemoryStore::new();
        assert!(memory.set_many(docs, SetMode::Replace).is_err());
        assert!(memory.list(ASSEMBLIES).unwrap().is_empty());
    }

    #[test]
    fn survey_data() {
        let mut gateway = Gateway::new(MemoryStore::new(), Vec::new());
        assert_eq!(gateway.load_survey_data().unwrap(), json!({}));
        let data = json!({"yesno_survey": {"yes": 412, "no": 188}});
        gateway.save_survey_data(&data).unwrap();
        assert_eq!(gateway.load_survey_data().unwrap(), data);
    }

    #[test]
    fn custom_cards() {
        let mut gateway = Gateway::new(MemoryStore::new(), Vec::new());
        let card = |heading: &str, section: CardSection, order: i64| CustomCard {
            assembly_id: "3".to_string(),
            heading: heading.to_string(),
            content: "<p>notes</p>".to_string(),
            section,
            order,
            ..Default::default()
        };
        let late = gateway
            .save_custom_card(&card("Ground report", CardSection::Overview, 2))
            .unwrap();
        gateway
            .save_custom_card(&card("Key issues", CardSection::Overview, 1))
            .unwrap();
        gateway
            .save_custom_card(&card("Old strongholds", CardSection::Retro, 0))
            .unwrap();
        gateway
            .save_custom_card(&CustomCard {
                assembly_id: "4".to_string(),
                ..card("Elsewhere", CardSection::Overview, 0)
            })
            .unwrap();

        let overview = gateway
            .list_custom_cards(Some("3"), Some(CardSection::Overview))
            .unwrap();
        let headings: Vec<&str> = overview.iter().map(|c| c.heading.as_str()).collect();
        assert_eq!(headings, vec!["Key issues", "Ground report"]);
        assert_eq!(overview[1].id.as_deref(), Some(late.as_str()));
        assert_eq!(gateway.list_custom_cards(Some("3"), None).unwrap().len(), 3);
        assert_eq!(gateway.list_custom_cards(None, None).unwrap().len(), 4);

        // Updates keep the fields that are not sent again.
        let mut edited = overview[1].clone();
        edited.order = 0;
        gateway.save_custom_card(&edited).unwrap();
        let overview = gateway
            .list_custom_cards(Some("3"), Some(CardSection::Overview))
            .unwrap();
        assert_eq!(overview[0].heading, "Ground report");

        assert!(gateway.delete_custom_card(&late).unwrap());
        assert_eq!(gateway.list_custom_cards(Some("3"), None).unwrap().len(), 2);
    }

    #[test]
    fn stored_card_documents() {
        let mut store = MemoryStore::new();
        store
            .set(
                "customCards/abc",
                json!({"assemblyId": "3", "heading": "Scenario", "content": "", "cardType": "note",
                       "section": "politicalhistory", "order": 1, "createdAt": "2024-01-05T10:00:00Z"}),
                SetMode::Replace,
            )
            .unwrap();
        let gateway = Gateway::new(store, Vec::new());
        let cards = gateway
            .list_custom_cards(Some("3"), Some(CardSection::PoliticalHistory))
            .unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].id.as_deref(), Some("abc"));
        assert_eq!(cards[0].card_type, CardType::Note);
    }

    #[test]
    fn political_history_config() {
        let mut gateway = Gateway::new(MemoryStore::new(), Vec::new());
        assert_eq!(
            gateway.load_political_history_config("3").unwrap(),
            PoliticalHistoryConfig::default_for("3")
        );

        let insight = |title: &str| Insight {
            title: title.to_string(),
            insight_type: InsightType::Trend,
            order: 7,
            ..Default::default()
        };
        let config = PoliticalHistoryConfig {
            show_vote_swing: false,
            custom_narrative: "Three-cornered contests since 2011.".to_string(),
            insights: vec![insight("BJP rising"), insight("DMK steady")],
            ..PoliticalHistoryConfig::default_for("3")
        };
        gateway.save_political_history_config(&config).unwrap();
        let loaded = gateway.load_political_history_config("3").unwrap();
        assert!(!loaded.show_vote_swing);
        assert!(loaded.show_insights);
        assert_eq!(loaded.custom_narrative, config.custom_narrative);
        let titles: Vec<&str> = loaded.insights.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["BJP rising", "DMK steady"]);
        assert_eq!(loaded.insights[1].order, 1);
        assert_eq!(loaded.insights[1].assembly_id, "3");

        // Saving again replaces the insights.
        let fewer = PoliticalHistoryConfig {
            insights: vec![insight("Turnout up")],
            ..loaded
        };
        gateway.save_political_history_config(&fewer).unwrap();
        let loaded = gateway.load_political_history_config("3").unwrap();
        assert_eq!(loaded.insights.len(), 1);
        assert_eq!(loaded.insights[0].title, "Turnout up");
        assert!(gateway
            .store()
            .get("politicalHistoryConfig/config_3")
            .unwrap()
            .unwrap()
            .get("insights")
            .is_none());
    }

    #[test]
    fn mlas() {
        let mut gateway = Gateway::new(MemoryStore::new(), Vec::new());
        let mla = Mla {
            assembly_id: "3".to_string(),
            year: "2021".to_string(),
            name: "A. Kumar".to_string(),
            party: "AINRC".to_string(),
            vote_share: Some(48.2),
            ..Default::default()
        };
        let id = gateway.save_mla(&mla).unwrap();
        gateway
            .save_mla(&Mla {
                year: "2016".to_string(),
                name: "S. Devi".to_string(),
                party: "INC".to_string(),
                ..mla.clone()
            })
            .unwrap();

        assert_eq!(gateway.list_mlas(Some("3"), None).unwrap().len(), 2);
        let sitting = gateway.list_mlas(Some("3"), Some("2021")).unwrap();
        assert_eq!(sitting.len(), 1);
        assert_eq!(sitting[0].id.as_deref(), Some(id.as_str()));

        let update = Mla {
            id: Some(id.clone()),
            assembly_id: "3".to_string(),
            year: "2021".to_string(),
            name: "A. Kumar".to_string(),
            party: "BJP".to_string(),
            ..Default::default()
        };
        gateway.save_mla(&update).unwrap();
        let sitting = gateway.list_mlas(Some("3"), Some("2021")).unwrap();
        assert_eq!(sitting[0].party, "BJP");
        // Merged with the stored document.
        assert_eq!(sitting[0].vote_share, Some(48.2));

        assert!(gateway.delete_mla(&id).unwrap());
        assert!(gateway.list_mlas(None, Some("2021")).unwrap().is_empty());
    }
}
