// src/resolve/markup.rs
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};

use crate::normalize::CellSyntax;
use crate::table::{CandidateOrigin, CandidateTable};

static TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("CSS selector for tables should be valid"));

/// Upper bound for `colspan`/`rowspan`, so a bogus attribute can't blow up the grid.
const MAX_SPAN: usize = 1000;

struct RawCell {
    text: String,
    colspan: usize,
    rowspan: usize,
}

/// Every non-empty `<table>` in the document, in document order.
/// Nested tables are reported on their own; an outer table only sees its direct rows.
pub fn extract_tables(html: &str) -> Vec<CandidateTable> {
    let doc = Html::parse_document(html);
    doc.select(&TABLE)
        .enumerate()
        .filter_map(|(idx, table)| {
            let rows = expand_spans(table_rows(table));
            if rows.is_empty() {
                return None;
            }
            Some(CandidateTable::new(
                CandidateOrigin::MarkupTable(idx),
                CellSyntax::Locale,
                rows,
            ))
        })
        .collect()
}

/// Direct `<tr>` rows of a table, looking through `thead`/`tbody`/`tfoot`.
fn table_rows(table: ElementRef<'_>) -> Vec<Vec<RawCell>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(row_cells(child)),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|e| e.value().name() == "tr")
                    .map(row_cells),
            ),
            _ => {}
        }
    }
    rows
}

fn row_cells(tr: ElementRef<'_>) -> Vec<RawCell> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| matches!(e.value().name(), "td" | "th"))
        .map(|cell| RawCell {
            text: normalize_ws(&own_text(cell)),
            colspan: span_attr(cell, "colspan"),
            rowspan: span_attr(cell, "rowspan"),
        })
        .collect()
}

/// Text of a cell, leaving out anything inside a nested table. Text nodes are
/// joined with a space so adjacent inline elements don't run together.
fn own_text(cell: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    collect_text(cell, &mut parts);
    parts.join(" ")
}

fn collect_text<'a>(el: ElementRef<'a>, parts: &mut Vec<&'a str>) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => parts.push(&**t),
            Node::Element(e) if e.name() == "table" => {}
            Node::Element(_) => {
                if let Some(inner) = ElementRef::wrap(child) {
                    collect_text(inner, parts);
                }
            }
            _ => {}
        }
    }
}

fn span_attr(cell: ElementRef<'_>, name: &str) -> usize {
    cell.value()
        .attr(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
        .min(MAX_SPAN)
}

/// Lay cells onto a grid, repeating spanned text into every covered slot.
fn expand_spans(rows: Vec<Vec<RawCell>>) -> Vec<Vec<String>> {
    // carried[col] = (text, rows still covered below the current one)
    let mut carried: Vec<Option<(String, usize)>> = Vec::new();
    let mut grid = Vec::with_capacity(rows.len());

    for cells in rows {
        let mut out = Vec::new();
        let mut cells = cells.into_iter();
        let mut col = 0;
        loop {
            if let Some((text, left)) = carried.get(col).cloned().flatten() {
                carried[col] = if left > 1 { Some((text.clone(), left - 1)) } else { None };
                out.push(text);
                col += 1;
                continue;
            }
            if let Some(cell) = cells.next() {
                for _ in 0..cell.colspan {
                    if cell.rowspan > 1 {
                        if carried.len() <= col {
                            carried.resize(col + 1, None);
                        }
                        carried[col] = Some((cell.text.clone(), cell.rowspan - 1));
                    }
                    out.push(cell.text.clone());
                    col += 1;
                }
                continue;
            }
            // cells exhausted; keep going only while spans from above reach further right
            if carried.iter().skip(col).any(Option::is_some) {
                out.push(String::new());
                col += 1;
                continue;
            }
            break;
        }
        if !out.is_empty() {
            grid.push(out);
        }
    }
    grid
}

/// Collapse runs of whitespace (including `&nbsp;`) into one space and trim.
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
