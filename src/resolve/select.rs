// src/resolve/select.rs
//! Choosing the authoritative table and its header row.
//!
//! Both decisions run an ordered list of strategies; the first one that
//! yields an answer wins. Content (keyword) strategies always come before
//! positional ones.

use serde::Serialize;

use crate::table::CandidateTable;

/// Which rule picked the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SelectionStrategy {
    Keyword,
    LargestTable,
}

/// Which rule picked the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderStrategy {
    Keyword,
    FixedOffset,
    NotFound,
}

/// Inputs shared by every strategy.
#[derive(Debug, Clone)]
pub struct Scan<'a> {
    /// Already uppercased.
    pub keywords: &'a [String],
    pub selection_rows: usize,
    pub header_rows: usize,
    pub fallback_offset: usize,
}

type PickTable = fn(&[CandidateTable], &Scan<'_>) -> Option<usize>;
type PickHeader = fn(&CandidateTable, &Scan<'_>) -> Option<usize>;

const SELECTION_ORDER: [(SelectionStrategy, PickTable); 2] = [
    (SelectionStrategy::Keyword, table_by_keyword),
    (SelectionStrategy::LargestTable, largest_table),
];

const HEADER_ORDER: [(HeaderStrategy, PickHeader); 2] = [
    (HeaderStrategy::Keyword, header_by_keyword),
    (HeaderStrategy::FixedOffset, header_by_offset),
];

pub fn contains_keyword(upper_text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| upper_text.contains(k.as_str()))
}

/// Index of the chosen candidate, or `None` when there are none.
pub fn select_table(
    candidates: &[CandidateTable],
    scan: &Scan<'_>,
) -> Option<(usize, SelectionStrategy)> {
    SELECTION_ORDER
        .iter()
        .find_map(|(strategy, pick)| pick(candidates, scan).map(|idx| (idx, *strategy)))
}

/// Header row of the chosen candidate. `(None, NotFound)` when no rule applies.
pub fn locate_header(candidate: &CandidateTable, scan: &Scan<'_>) -> (Option<usize>, HeaderStrategy) {
    HEADER_ORDER
        .iter()
        .find_map(|(strategy, pick)| pick(candidate, scan).map(|idx| (Some(idx), *strategy)))
        .unwrap_or((None, HeaderStrategy::NotFound))
}

fn table_by_keyword(candidates: &[CandidateTable], scan: &Scan<'_>) -> Option<usize> {
    candidates.iter().position(|c| {
        let window = c.row_count().min(scan.selection_rows);
        let text = (0..window)
            .map(|i| c.row_text(i))
            .collect::<Vec<_>>()
            .join(" ");
        contains_keyword(&text, scan.keywords)
    })
}

/// Largest by row count; the first one seen wins a tie.
fn largest_table(candidates: &[CandidateTable], _scan: &Scan<'_>) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, c) in candidates.iter().enumerate() {
        match best {
            Some((_, rows)) if rows >= c.row_count() => {}
            _ => best = Some((idx, c.row_count())),
        }
    }
    best.map(|(idx, _)| idx)
}

fn header_by_keyword(candidate: &CandidateTable, scan: &Scan<'_>) -> Option<usize> {
    (0..candidate.row_count().min(scan.header_rows))
        .find(|&i| contains_keyword(&candidate.row_text(i), scan.keywords))
}

fn header_by_offset(candidate: &CandidateTable, scan: &Scan<'_>) -> Option<usize> {
    (candidate.row_count() > scan.fallback_offset).then_some(scan.fallback_offset)
}
