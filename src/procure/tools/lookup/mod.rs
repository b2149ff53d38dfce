use tracing::{debug, instrument};

use crate::procure::tools::model::{CellValue, LookupOutcome, LookupQuery, MasterData};

/// Answers a single lookup against the master data.
///
/// Rows are scanned in table order and the first row whose `lookup_column`
/// text contains `lookup_value`, ignoring case, wins. Blank cells read as
/// empty text, so an empty `lookup_value` matches the first row. Multiple
/// matches are not disambiguated. Every miss is returned as a descriptive
/// outcome instead of an error so it can be relayed to the caller verbatim.
#[instrument(
    level = "debug",
    skip(master),
    fields(
        table = %query.table_key,
        column = %query.lookup_column,
        value = %query.lookup_value
    )
)]
pub fn lookup(master: &MasterData, query: &LookupQuery) -> LookupOutcome {
    let Some(table) = master.get(&query.table_key) else {
        return LookupOutcome::UnknownTable {
            requested: query.table_key.clone(),
            available: master.keys().into_iter().map(str::to_string).collect(),
        };
    };

    let lookup_column = query.lookup_column.trim();
    let return_column = query.return_column.trim();

    let unknown_column = |column: &str| LookupOutcome::UnknownColumn {
        table: query.table_key.clone(),
        column: column.to_string(),
        available: table.columns.clone(),
    };
    let Some(lookup_idx) = table.column_index(lookup_column) else {
        return unknown_column(lookup_column);
    };
    let Some(return_idx) = table.column_index(return_column) else {
        return unknown_column(return_column);
    };

    let needle = query.lookup_value.to_lowercase();
    for (row_idx, row) in table.rows.iter().enumerate() {
        if !cell_text(row, lookup_idx).to_lowercase().contains(&needle) {
            continue;
        }
        let value = cell_text(row, return_idx);
        debug!(row = row_idx, %value, "lookup matched");
        return LookupOutcome::Found(value);
    }

    debug!("lookup found no matching row");
    LookupOutcome::NoMatch {
        table: query.table_key.clone(),
        column: lookup_column.to_string(),
        value: query.lookup_value.clone(),
    }
}

/// Text of a cell; cells beyond the end of a short row read as blank.
fn cell_text(row: &[CellValue], idx: usize) -> String {
    row.get(idx).map(CellValue::as_text).unwrap_or_default()
}
