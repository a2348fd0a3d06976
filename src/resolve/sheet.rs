// src/resolve/sheet.rs
use calamine::{open_workbook_auto_from_rs, Data, DataType, Range, Reader};
use chrono::Timelike;
use std::io::Cursor;
use tracing::debug;

use crate::normalize::CellSyntax;
use crate::table::{CandidateOrigin, CandidateTable};

/// Open `content` as any spreadsheet container calamine understands
/// (xls, xlsx, xlsm, xlsb, ods) and turn each non-empty worksheet into a
/// candidate. `None` means the bytes are not a workbook at all.
pub fn extract_sheets(content: &[u8]) -> Option<Vec<CandidateTable>> {
    let mut workbook = match open_workbook_auto_from_rs(Cursor::new(content.to_vec())) {
        Ok(wb) => wb,
        Err(e) => {
            debug!(error = %e, "not a spreadsheet container");
            return None;
        }
    };

    let tables = workbook
        .worksheets()
        .into_iter()
        .filter_map(|(name, range)| {
            let rows = range_rows(&range);
            if rows.iter().all(|r| r.iter().all(String::is_empty)) {
                debug!(sheet = %name, "skipping empty sheet");
                return None;
            }
            Some(CandidateTable::new(
                CandidateOrigin::Sheet(name),
                CellSyntax::Canonical,
                rows,
            ))
        })
        .collect();
    Some(tables)
}

/// Rows of a worksheet with absolute positions: calamine trims leading empty
/// rows and columns, so they are put back here.
fn range_rows(range: &Range<Data>) -> Vec<Vec<String>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let pad_cols = start_col as usize;
    let mut rows: Vec<Vec<String>> = (0..start_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut out = vec![String::new(); pad_cols];
        out.extend(row.iter().map(cell_text));
        rows.push(out);
    }
    rows
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) if dt.num_seconds_from_midnight() == 0 => dt.format("%d/%m/%Y").to_string(),
            Some(dt) => dt.format("%d/%m/%Y %H:%M:%S").to_string(),
            None => cell.to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}
