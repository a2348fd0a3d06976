// src/resolve/mod.rs
//! Turns one raw portal document into one clean, header-promoted table.

pub mod decode;
pub mod markup;
pub mod select;
pub mod sheet;
pub mod sniff;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolverConfig;
use crate::document::RawDocument;
use crate::error::{ResolveError, ResolveWarning};
use crate::table::{CandidateTable, ResolvedTable};

pub use decode::{Decoder, DecoderChain, MarkupDecoder, SpreadsheetDecoder};
pub use select::{HeaderStrategy, SelectionStrategy};
pub use sniff::DetectedFormat;

/// The table plus an account of how it was found.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub table: ResolvedTable,
    pub detected: DetectedFormat,
    pub decoder: &'static str,
    pub candidates: usize,
    pub selection: SelectionStrategy,
    pub header: HeaderStrategy,
    pub warnings: Vec<ResolveWarning>,
}

/// Stateless apart from its configuration; safe to share across threads.
pub struct TableResolver {
    config: ResolverConfig,
    keywords: Vec<String>,
    decoders: DecoderChain,
}

impl TableResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let keywords = config.normalized_keywords();
        Self {
            config,
            keywords,
            decoders: DecoderChain::default(),
        }
    }

    pub fn with_decoders(mut self, decoders: DecoderChain) -> Self {
        self.decoders = decoders;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn scan(&self) -> select::Scan<'_> {
        select::Scan {
            keywords: &self.keywords,
            selection_rows: self.config.selection_scan_rows,
            header_rows: self.config.header_scan_rows,
            fallback_offset: self.config.fallback_header_offset,
        }
    }

    /// Decode only; every candidate table found in the document.
    pub fn candidates(
        &self,
        doc: &RawDocument,
    ) -> Result<(&'static str, Vec<CandidateTable>), ResolveError> {
        self.decoders.decode(doc)
    }

    #[tracing::instrument(
        level = "info",
        skip(self, doc),
        fields(report = %doc.report, claimed = ?doc.claimed_format, bytes = doc.content.len())
    )]
    pub fn resolve(&self, doc: &RawDocument) -> Result<Resolution, ResolveError> {
        let detected = sniff::sniff(&doc.content);
        if !detected.agrees_with(doc.claimed_format) {
            warn!(?detected, "content does not match claimed format");
        }

        let (decoder, candidates) = self.decoders.decode(doc)?;
        let candidate_count = candidates.len();
        info!(decoder, candidates = candidate_count, "decoded document");

        let scan = self.scan();
        let (idx, selection) =
            select::select_table(&candidates, &scan).ok_or(ResolveError::NoTableFound {
                report: doc.report,
                decoder,
            })?;
        let Some(candidate) = candidates.into_iter().nth(idx) else {
            return Err(ResolveError::NoTableFound {
                report: doc.report,
                decoder,
            });
        };
        info!(
            strategy = ?selection,
            origin = %candidate.origin,
            rows = candidate.row_count(),
            "selected table"
        );

        let rows = candidate.row_count();
        let (header_index, header) = select::locate_header(&candidate, &scan);
        let mut warnings = Vec::new();
        let table = match header_index {
            Some(h) => {
                match header {
                    HeaderStrategy::FixedOffset => warn!(
                        offset = h,
                        "no header keyword found; promoted fixed-offset row (report layout may have changed)"
                    ),
                    _ => info!(strategy = ?header, index = h, "located header"),
                }
                ResolvedTable::promote(doc.report, candidate, h)
            }
            None => {
                let warning = ResolveWarning::HeaderNotFound {
                    report: doc.report,
                    rows,
                    fallback_offset: self.config.fallback_header_offset,
                };
                warn!("{}", warning);
                warnings.push(warning);
                ResolvedTable::unpromoted(doc.report, candidate)
            }
        };

        info!(
            columns = table.columns.len(),
            rows = table.row_count(),
            "resolved table"
        );
        Ok(Resolution {
            table,
            detected,
            decoder,
            candidates: candidate_count,
            selection,
            header,
            warnings,
        })
    }
}

impl Default for TableResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ClaimedFormat, ReportId};
    use crate::normalize::CellSyntax;
    use crate::table::CandidateOrigin;
    use anyhow::Result;
    use proptest::prelude::*;
    use rust_xlsxwriter::Workbook;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,portal_reports::resolve=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn html_table(rows: &[Vec<String>]) -> String {
        let mut s = String::from("<table>");
        for r in rows {
            s.push_str("<tr>");
            for c in r {
                s.push_str(&format!("<td>{c}</td>"));
            }
            s.push_str("</tr>");
        }
        s.push_str("</table>");
        s
    }

    fn html_doc(tables: &[Vec<Vec<String>>]) -> String {
        let body: String = tables.iter().map(|t| html_table(t)).collect();
        format!("<html><body>{body}</body></html>")
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn numbered(n: usize, width: usize) -> Vec<Vec<String>> {
        (0..n)
            .map(|i| (0..width).map(|j| format!("{}", i * width + j)).collect())
            .collect()
    }

    fn markup(report: ReportId, html: &str) -> RawDocument {
        RawDocument::new(report, ClaimedFormat::Markup, html.as_bytes())
    }

    #[test]
    fn junk_rows_above_header_are_dropped() -> Result<()> {
        init_test_logging();
        let mut t = vec![
            row(&["Relatório PCP347", "", ""]),
            row(&["Período: 01/05/2024 a 31/05/2024", "", ""]),
            row(&["", "", ""]),
            row(&["Cod", "Produto", "Custo Moeda 1"]),
        ];
        for i in 0..5 {
            t.push(row(&[&format!("{i}"), &format!("Peça {i}"), "1.234,56"]));
        }
        let res = TableResolver::default().resolve(&markup(ReportId::Entrada, &html_doc(&[t])))?;

        assert_eq!(res.table.columns, vec!["Cod", "Produto", "Custo Moeda 1"]);
        assert_eq!(res.table.row_count(), 5);
        assert_eq!(res.table.rows[0], vec!["0", "Peça 0", "1.234,56"]);
        assert_eq!(res.table.header_index, Some(3));
        assert_eq!(res.selection, SelectionStrategy::Keyword);
        assert_eq!(res.header, HeaderStrategy::Keyword);
        assert_eq!(res.decoder, "markup");
        assert!(res.warnings.is_empty());
        Ok(())
    }

    #[test]
    fn keyword_table_beats_larger_table() -> Result<()> {
        let small = vec![row(&["Produto", "Descrição"]), row(&["A", "Eixo"])];
        let big = numbered(60, 3);
        let res = TableResolver::default()
            .resolve(&markup(ReportId::Entrada, &html_doc(&[big, small])))?;
        assert_eq!(res.selection, SelectionStrategy::Keyword);
        assert_eq!(res.table.origin, CandidateOrigin::MarkupTable(1));
        assert_eq!(res.table.row_count(), 1);
        Ok(())
    }

    #[test]
    fn largest_table_and_fixed_offset_without_keywords() -> Result<()> {
        let res = TableResolver::default().resolve(&markup(
            ReportId::Entrada,
            &html_doc(&[numbered(2, 2), numbered(40, 4)]),
        ))?;
        assert_eq!(res.selection, SelectionStrategy::LargestTable);
        assert_eq!(res.header, HeaderStrategy::FixedOffset);
        assert_eq!(res.table.origin, CandidateOrigin::MarkupTable(1));
        assert_eq!(res.table.header_index, Some(2));
        assert_eq!(res.table.columns, vec!["8", "9", "10", "11"]);
        assert_eq!(res.table.row_count(), 37);
        Ok(())
    }

    #[test]
    fn clean_input_keeps_every_row() -> Result<()> {
        let t = vec![row(&["Produto", "Qtd"]), row(&["A", "1"]), row(&["B", "2"])];
        let res = TableResolver::default().resolve(&markup(ReportId::Consumo, &html_doc(&[t])))?;
        assert_eq!(res.table.header_index, Some(0));
        assert_eq!(res.table.row_count(), 2);
        Ok(())
    }

    #[test]
    fn degenerate_input_is_returned_unpromoted() -> Result<()> {
        let t = vec![row(&["a", "b"]), row(&["c", "d"])];
        let res = TableResolver::default().resolve(&markup(ReportId::Consumo, &html_doc(&[t])))?;
        assert_eq!(res.header, HeaderStrategy::NotFound);
        assert_eq!(res.table.header_index, None);
        assert_eq!(res.table.columns, vec!["0", "1"]);
        assert_eq!(res.table.row_count(), 2);
        assert_eq!(
            res.warnings,
            vec![ResolveWarning::HeaderNotFound {
                report: ReportId::Consumo,
                rows: 2,
                fallback_offset: 2
            }]
        );
        Ok(())
    }

    #[test]
    fn markup_saved_as_xls_still_resolves() -> Result<()> {
        let t = vec![row(&["Produto", "Custo"]), row(&["A", "10,5"])];
        let doc = RawDocument::new(
            ReportId::Consumo,
            ClaimedFormat::LegacySpreadsheet,
            html_doc(&[t]).into_bytes(),
        );
        let res = TableResolver::default().resolve(&doc)?;
        assert_eq!(res.detected, DetectedFormat::Markup);
        assert_eq!(res.decoder, "markup");
        assert_eq!(res.table.syntax, CellSyntax::Locale);
        assert_eq!(res.table.rows, vec![vec!["A", "10,5"]]);
        Ok(())
    }

    #[test]
    fn real_workbook_resolves_through_spreadsheet_path() -> Result<()> {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        ws.write_string(0, 0, "WHB - Consumo SD3")?;
        ws.write_string(1, 0, "Emitido em 01/06/2024")?;
        for (c, h) in ["Cod", "Descrição", "Custo Moeda 1"].iter().enumerate() {
            ws.write_string(3, c as u16, *h)?;
        }
        for r in 0..4u32 {
            ws.write_string(4 + r, 0, format!("P{r}"))?;
            ws.write_string(4 + r, 1, "Eixo")?;
            ws.write_number(4 + r, 2, 1000.5 + r as f64)?;
        }
        let doc = RawDocument::new(ReportId::Consumo, ClaimedFormat::LegacySpreadsheet, wb.save_to_buffer()?);

        let res = TableResolver::default().resolve(&doc)?;
        assert_eq!(res.detected, DetectedFormat::Ooxml);
        assert_eq!(res.decoder, "spreadsheet");
        assert_eq!(res.table.header_index, Some(3));
        assert_eq!(res.table.columns, vec!["Cod", "Descrição", "Custo Moeda 1"]);
        assert_eq!(res.table.row_count(), 4);
        assert_eq!(res.table.rows[0], vec!["P0", "Eixo", "1000.5"]);
        assert_eq!(res.table.syntax, CellSyntax::Canonical);
        Ok(())
    }

    #[test]
    fn fatal_errors_are_typed() {
        let resolver = TableResolver::default();
        let noise = RawDocument::new(ReportId::Entrada, ClaimedFormat::ModernSpreadsheet, vec![0u8, 1, 2, 3]);
        assert_eq!(
            resolver.resolve(&noise).unwrap_err(),
            ResolveError::UnparsableDocument {
                report: ReportId::Entrada
            }
        );

        let empty = markup(ReportId::Entrada, "<html><body><div>Nenhum registro</div></body></html>");
        assert_eq!(
            resolver.resolve(&empty).unwrap_err(),
            ResolveError::NoTableFound {
                report: ReportId::Entrada,
                decoder: "markup"
            }
        );
    }

    #[test]
    fn keyword_set_is_configurable() -> Result<()> {
        let t = vec![row(&["x"]), row(&["Lote", "Quantidade"]), row(&["1", "2"])];
        let cfg = ResolverConfig::default().with_keywords(["quantidade"]);
        let res = TableResolver::new(cfg).resolve(&markup(ReportId::Entrada, &html_doc(&[t])))?;
        assert_eq!(res.header, HeaderStrategy::Keyword);
        assert_eq!(res.table.columns, vec!["Lote", "Quantidade"]);
        Ok(())
    }

    #[test]
    fn data_table_inside_layout_table_is_selected() -> Result<()> {
        let html = r#"<html><body><table>
            <tr><td>Relatorio</td><td></td></tr>
            <tr><td colspan="2"><table>
              <tr><td>Emitido em 10/06/2024</td><td></td><td></td></tr>
              <tr><td>Cod</td><td>Produto</td><td>Custo Moeda 1</td></tr>
              <tr><td>1</td><td>Eixo</td><td>1,5</td></tr>
              <tr><td>2</td><td>Mola</td><td>2,5</td></tr>
            </table></td></tr>
            <tr><td>rodape</td><td></td></tr>
        </table></body></html>"#;
        let res = TableResolver::default().resolve(&markup(ReportId::Entrada, html))?;
        assert_eq!(res.selection, SelectionStrategy::Keyword);
        assert_eq!(res.table.origin, CandidateOrigin::MarkupTable(1));
        assert_eq!(res.table.columns, vec!["Cod", "Produto", "Custo Moeda 1"]);
        assert_eq!(res.table.rows, vec![row(&["1", "Eixo", "1,5"]), row(&["2", "Mola", "2,5"])]);
        Ok(())
    }

    #[test]
    fn resolver_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TableResolver>();
    }

    fn filler_table(n: usize) -> Vec<Vec<String>> {
        (0..n).map(|i| vec![format!("v{i}")]).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn keyword_table_wins_whatever_its_size(
            fillers in prop::collection::vec(1usize..80, 0..6),
            keyword_rows in 1usize..5,
            pos_seed in any::<usize>(),
        ) {
            let pos = pos_seed % (fillers.len() + 1);
            let mut tables: Vec<Vec<Vec<String>>> = fillers.iter().map(|&n| filler_table(n)).collect();
            let mut keyword_table = vec![row(&["Produto", "Custo"])];
            keyword_table.extend((1..keyword_rows).map(|i| vec![format!("p{i}"), format!("{i}")]));
            tables.insert(pos, keyword_table);

            let res = TableResolver::default()
                .resolve(&markup(ReportId::Entrada, &html_doc(&tables)))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(res.selection, SelectionStrategy::Keyword);
            prop_assert_eq!(&res.table.origin, &CandidateOrigin::MarkupTable(pos));
            prop_assert_eq!(res.header, HeaderStrategy::Keyword);
            prop_assert_eq!(res.table.row_count(), keyword_rows - 1);
        }

        #[test]
        fn largest_table_is_strict_max_first_seen(sizes in prop::collection::vec(1usize..40, 1..8)) {
            let tables: Vec<Vec<Vec<String>>> = sizes.iter().map(|&n| filler_table(n)).collect();
            let max = sizes.iter().copied().max().unwrap_or(0);
            let expected = sizes.iter().position(|&n| n == max).unwrap_or(0);

            let res = TableResolver::default()
                .resolve(&markup(ReportId::Consumo, &html_doc(&tables)))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(res.selection, SelectionStrategy::LargestTable);
            prop_assert_eq!(res.table.origin, CandidateOrigin::MarkupTable(expected));
        }

        #[test]
        fn short_tables_are_never_fatal(
            (rows, offset) in (1usize..6).prop_flat_map(|n| (Just(n), n..8)),
        ) {
            let cfg = ResolverConfig::default().with_fallback_offset(offset);
            let res = TableResolver::new(cfg)
                .resolve(&markup(ReportId::Consumo, &html_doc(&[filler_table(rows)])))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(res.header, HeaderStrategy::NotFound);
            prop_assert_eq!(res.table.row_count(), rows);
            prop_assert_eq!(
                res.warnings,
                vec![ResolveWarning::HeaderNotFound {
                    report: ReportId::Consumo,
                    rows,
                    fallback_offset: offset,
                }]
            );
        }
    }
}
