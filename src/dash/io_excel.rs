use calamine::DataType;

use crate::dash::io_common::*;
use crate::dash::*;

/// Reads booth data from an Excel workbook.
///
/// Every sheet named `AC_<id>_...` holds the rows of one assembly, with the
/// column names in the first row. The mapping sheet gives the assembly names.
pub fn read_excel_source(path: &str, cfs: &DataSource) -> DashResult<RawSource> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_owned();
    debug!("read_excel_source: {}: sheets {:?}", path, sheet_names);

    let mut res = RawSource::default();
    for sheet_name in sheet_names.iter() {
        let assembly_id = assembly_id_of_sheet(sheet_name, cfs.sheet_prefix());
        let is_mapping = sheet_name == cfs.mapping_sheet();
        if assembly_id.is_none() && !is_mapping {
            debug!("read_excel_source: skipping sheet {}", sheet_name);
            continue;
        }
        let wrange = workbook
            .worksheet_range(sheet_name)
            .context(EmptyExcelSnafu { path })?
            .context(OpeningExcelSnafu { path })?;
        match assembly_id {
            Some(ac) => res.add_sheet(sheet_name, &ac, read_rows(&wrange)),
            None => res.add_names(read_name_rows(&read_cells(&wrange))),
        }
    }

    if res.assemblies.is_empty() {
        return EmptyExcelSnafu { path }.fail();
    }
    info!(
        "read_excel_source: {}: {} assemblies, {} rows",
        simplify_file_name(path),
        res.assemblies.len(),
        res.num_rows()
    );
    Ok(res)
}

/// The rows of a sheet as objects keyed by the header. Blank rows are dropped.
pub fn read_rows(wrange: &calamine::Range<DataType>) -> Vec<JSValue> {
    let mut iter = wrange.rows();
    let header: Vec<Option<String>> = match iter.next() {
        Some(h) => h
            .iter()
            .map(|c| match c {
                DataType::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect(),
        None => return Vec::new(),
    };
    debug!("read_rows: header: {:?}", header);

    let mut res: Vec<JSValue> = Vec::new();
    for row in iter {
        let mut m: JSMap<String, JSValue> = JSMap::new();
        for (name, cell) in header.iter().zip(row.iter()) {
            if let (Some(name), Some(v)) = (name, cell_to_json(cell)) {
                m.insert(name.clone(), v);
            }
        }
        if !m.is_empty() {
            res.push(JSValue::Object(m));
        }
    }
    res
}

/// The rows of a sheet as arrays of cells, for the mapping sheet which has no header.
fn read_cells(wrange: &calamine::Range<DataType>) -> Vec<JSValue> {
    wrange
        .rows()
        .map(|row| {
            JSValue::Array(
                row.iter()
                    .map(|c| cell_to_json(c).unwrap_or(JSValue::Null))
                    .collect(),
            )
        })
        .collect()
}
