// src/output.rs
use anyhow::{ensure, Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::document::ReportId;
use crate::normalize::{NumberParser, Value};
use crate::table::ResolvedTable;

/// The two resolved reports of one run.
#[derive(Debug, Clone)]
pub struct ReportPair {
    pub entrada: ResolvedTable,
    pub consumo: ResolvedTable,
}

impl ReportPair {
    /// Sheets in workbook order: Consumo first, then Entrada.
    pub fn sheets(&self) -> [(ReportId, &ResolvedTable); 2] {
        [
            (ReportId::Consumo, &self.consumo),
            (ReportId::Entrada, &self.entrada),
        ]
    }
}

/// Serialize the pair into an in-memory `.xlsx`.
pub fn workbook_bytes(pair: &ReportPair, parser: &NumberParser) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    for (report, table) in pair.sheets() {
        let sheet = workbook.add_worksheet();
        sheet
            .set_name(report.as_str())
            .with_context(|| format!("naming sheet {report}"))?;
        write_table(sheet, table, parser).with_context(|| format!("writing sheet {report}"))?;
    }
    workbook.save_to_buffer().context("serializing workbook")
}

fn write_table(sheet: &mut Worksheet, table: &ResolvedTable, parser: &NumberParser) -> Result<()> {
    for (col, name) in table.disambiguated_columns().iter().enumerate() {
        sheet.write_string(0, col_num(col)?, name)?;
    }
    for (r, row) in table.typed_rows(parser).iter().enumerate() {
        let row_num = u32::try_from(r + 1).context("too many rows for a worksheet")?;
        for (c, value) in row.iter().enumerate() {
            match value {
                Value::Empty => {}
                Value::Number(n) => {
                    sheet.write_number(row_num, col_num(c)?, *n)?;
                }
                Value::Text(s) => {
                    sheet.write_string(row_num, col_num(c)?, s)?;
                }
            }
        }
    }
    Ok(())
}

fn col_num(col: usize) -> Result<u16> {
    u16::try_from(col).context("too many columns for a worksheet")
}

/// Write the workbook to `path`. The file is written next to the target and
/// renamed into place, so a failed run never leaves a partial workbook.
pub fn write_report_pair(pair: &ReportPair, parser: &NumberParser, path: &Path) -> Result<()> {
    let bytes = workbook_bytes(pair, parser)?;
    ensure!(!bytes.is_empty(), "workbook serialized to zero bytes");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let tmp = path.with_extension("xlsx.tmp");
    fs::write(&tmp, &bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;

    info!(
        path = %path.display(),
        consumo_rows = pair.consumo.row_count(),
        entrada_rows = pair.entrada.row_count(),
        "wrote workbook"
    );
    Ok(())
}
