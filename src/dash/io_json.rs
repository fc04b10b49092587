use crate::dash::io_common::*;
use crate::dash::*;

/// Reads booth data exported as a single JSON document:
/// `{"AC_<id>_FINAL": [row, ...], "Sheet2": [[id, name], ...]}`.
pub fn read_json_source(path: &str, cfs: &DataSource) -> DashResult<RawSource> {
    let js = read_json(path)?;
    let source = read_json_document(&js, cfs.sheet_prefix(), cfs.mapping_sheet())?;
    info!(
        "read_json_source: {}: {} assemblies, {} rows",
        simplify_file_name(path),
        source.assemblies.len(),
        source.num_rows()
    );
    Ok(source)
}

pub fn read_json_document(js: &JSValue, prefix: &str, mapping_sheet: &str) -> DashResult<RawSource> {
    let sheets = match js.as_object() {
        Some(m) => m,
        None => whatever!("read_json_document: expected an object of sheets, found {}", js),
    };
    let mut res = RawSource::default();
    for (sheet_name, value) in sheets.iter() {
        if sheet_name == mapping_sheet {
            match value.as_array() {
                Some(rows) => res.add_names(read_name_rows(rows)),
                None => warn!(
                    "read_json_document: mapping sheet {} is not an array, ignoring it",
                    sheet_name
                ),
            }
            continue;
        }
        let assembly_id = match assembly_id_of_sheet(sheet_name, prefix) {
            Some(ac) => ac,
            None => {
                debug!("read_json_document: skipping sheet {}", sheet_name);
                continue;
            }
        };
        match value.as_array() {
            Some(rows) => res.add_sheet(sheet_name, &assembly_id, rows.clone()),
            None => warn!(
                "read_json_document: sheet {} is not an array of rows, ignoring it",
                sheet_name
            ),
        }
    }
    Ok(res)
}
