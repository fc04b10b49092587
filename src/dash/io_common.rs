use std::collections::BTreeMap;
use std::path::Path;

use booth_analytics::builder::StationsBuilder;
use log::debug;
use serde_json::Value as JSValue;

pub const DEFAULT_SHEET_PREFIX: &str = "AC_";
pub const DEFAULT_MAPPING_SHEET: &str = "Sheet2";

/// The rows of a booth data file, before normalization.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RawSource {
    /// The rows of each assembly, in the order of the sheets.
    pub assemblies: Vec<(String, Vec<JSValue>)>,
    /// Assembly id -> name, from the mapping sheets.
    pub names: BTreeMap<String, String>,
    /// Assembly id -> name of its first sheet, for the assemblies left out of the mapping.
    pub sheet_names: BTreeMap<String, String>,
}

impl RawSource {
    /// Adds the rows of a sheet. The sheet name is the name of the assembly
    /// unless a mapping sheet gives one.
    pub fn add_sheet(&mut self, sheet_name: &str, assembly_id: &str, rows: Vec<JSValue>) {
        debug!(
            "add_sheet: sheet {} -> assembly {}: {} rows",
            sheet_name,
            assembly_id,
            rows.len()
        );
        self.sheet_names
            .entry(assembly_id.to_string())
            .or_insert_with(|| sheet_name.to_string());
        match self.assemblies.iter_mut().find(|(ac, _)| ac == assembly_id) {
            Some((_, existing)) => existing.extend(rows),
            None => self.assemblies.push((assembly_id.to_string(), rows)),
        }
    }

    pub fn add_names(&mut self, names: BTreeMap<String, String>) {
        self.names.extend(names);
    }

    pub fn merge(&mut self, other: RawSource) {
        for (ac, rows) in other.assemblies {
            match self.assemblies.iter_mut().find(|(a, _)| *a == ac) {
                Some((_, existing)) => existing.extend(rows),
                None => self.assemblies.push((ac, rows)),
            }
        }
        self.names.extend(other.names);
        for (ac, name) in other.sheet_names {
            self.sheet_names.entry(ac).or_insert(name);
        }
    }

    /// The name of every assembly: the mapped name, or else the sheet name.
    pub fn assembly_names(&self) -> BTreeMap<String, String> {
        let mut res = self.sheet_names.clone();
        res.extend(self.names.clone());
        res
    }

    pub fn num_rows(&self) -> usize {
        self.assemblies.iter().map(|(_, rows)| rows.len()).sum()
    }

    /// Hands all the rows to a builder.
    pub fn feed(&self, builder: StationsBuilder) -> StationsBuilder {
        let mut builder = builder.assembly_names(&self.assembly_names());
        for (ac, rows) in self.assemblies.iter() {
            builder.add_records(ac, rows);
        }
        builder
    }
}

/// The assembly id in a sheet name such as `AC_12_FINAL`.
///
/// The id is the run of digits right after the prefix, and it must be followed
/// by an underscore.
pub fn assembly_id_of_sheet(sheet_name: &str, prefix: &str) -> Option<String> {
    let rest = sheet_name.strip_prefix(prefix)?;
    let (id, _) = rest.split_once('_')?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// Reads the rows of the mapping sheet: `[id, name]` arrays, or objects with
/// `id` and `name` fields. Rows without both values are ignored.
pub fn read_name_rows(rows: &[JSValue]) -> BTreeMap<String, String> {
    rows.iter()
        .filter_map(|row| {
            let (id, name) = match row {
                JSValue::Array(cells) => (cells.first()?, cells.get(1)?),
                JSValue::Object(m) => (m.get("id")?, m.get("name")?),
                _ => return None,
            };
            let id = cell_text(id)?;
            let name = cell_text(name)?;
            Some((id, name))
        })
        .collect()
}

fn cell_text(v: &JSValue) -> Option<String> {
    let s = match v {
        JSValue::String(s) => s.trim().to_string(),
        JSValue::Number(n) => match n.as_f64() {
            Some(x) if x.fract() == 0.0 => format!("{}", x as i64),
            _ => n.to_string(),
        },
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Converts a spreadsheet cell. Empty cells and errors are missing values.
pub fn cell_to_json(cell: &calamine::DataType) -> Option<JSValue> {
    match cell {
        calamine::DataType::Int(i) => Some(JSValue::from(*i)),
        calamine::DataType::Float(f) => serde_json::Number::from_f64(*f).map(JSValue::Number),
        calamine::DataType::String(s) => Some(JSValue::String(s.clone())),
        calamine::DataType::Bool(b) => Some(JSValue::Bool(*b)),
        calamine::DataType::DateTime(f) => serde_json::Number::from_f64(*f).map(JSValue::Number),
        _ => None,
    }
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}
