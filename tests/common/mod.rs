#![allow(dead_code)]

use std::path::Path;

use procure_tools::io::excel_read::MasterSource;
use rust_xlsxwriter::Workbook;

/// A cell written into a fixture sheet.
pub enum Cell<'a> {
    Text(&'a str),
    Number(f64),
}

/// Builds an in-memory xlsx workbook; each sheet is a name plus rows, the
/// first row being the header.
pub fn workbook(sheets: &[(&str, Vec<Vec<Cell<'_>>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).expect("sheet name accepted");
        for (row_idx, row) in rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                match cell {
                    Cell::Text(text) => worksheet
                        .write_string(row_idx as u32, col_idx as u16, *text)
                        .expect("string written"),
                    Cell::Number(number) => worksheet
                        .write_number(row_idx as u32, col_idx as u16, *number)
                        .expect("number written"),
                };
            }
        }
    }
    workbook.save_to_buffer().expect("workbook serialised")
}

pub fn text_rows<'a>(rows: &[&[&'a str]]) -> Vec<Vec<Cell<'a>>> {
    rows.iter()
        .map(|row| row.iter().map(|text| Cell::Text(*text)).collect())
        .collect()
}

/// Vendor master data with the ACME row in third position.
pub fn vendors_source() -> MasterSource {
    let bytes = workbook(&[(
        "Vendors",
        text_rows(&[
            &[" Name ", "Code "],
            &["Globex Ltd", "V001"],
            &["Initech", "V002"],
            &["ACME Corp", "V100"],
            &["Acme Holdings", "V200"],
        ]),
    )]);
    MasterSource::new("vendors.xlsx", bytes)
}

/// Two-sheet source where both sheets declare a `Code` column.
pub fn codes_source() -> MasterSource {
    let bytes = workbook(&[
        (
            "Sheet1",
            text_rows(&[&["Description", "Code"], &["Housekeeping Service", "GL-1"]]),
        ),
        (
            "Sheet2",
            text_rows(&[&["Description", " Tax Code", "Code"], &["GST 18%", "I4", "T-18"]]),
        ),
    ]);
    MasterSource::new("codes.xlsx", bytes)
}

/// Loads a checked-in spreadsheet from `tests/fixtures`.
pub fn fixture(name: &str) -> MasterSource {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    MasterSource::from_path(&path).expect("fixture readable")
}
