// src/table.rs
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::document::ReportId;
use crate::normalize::{CellSyntax, NumberParser, Value};

/// Where in the document a candidate came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CandidateOrigin {
    /// N-th `<table>` element in document order.
    MarkupTable(usize),
    /// A worksheet, by name.
    Sheet(String),
}

impl fmt::Display for CandidateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateOrigin::MarkupTable(i) => write!(f, "table #{i}"),
            CandidateOrigin::Sheet(name) => write!(f, "sheet {name:?}"),
        }
    }
}

/// One rectangular region pulled out of a document. No header assumed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateTable {
    pub origin: CandidateOrigin,
    pub syntax: CellSyntax,
    pub rows: Vec<Vec<String>>,
}

impl CandidateTable {
    /// Build a candidate, padding ragged rows to the widest one.
    pub fn new(origin: CandidateOrigin, syntax: CellSyntax, mut rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self {
            origin,
            syntax,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    /// Uppercased text of one row, cells separated by a space.
    pub fn row_text(&self, idx: usize) -> String {
        self.rows
            .get(idx)
            .map(|r| r.join(" ").to_uppercase())
            .unwrap_or_default()
    }
}

/// The authoritative table of a report, header promoted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTable {
    pub report: ReportId,
    pub origin: CandidateOrigin,
    pub syntax: CellSyntax,
    /// Header cells as found, or positional names when nothing was promoted.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Index of the promoted row inside the candidate, if any.
    pub header_index: Option<usize>,
}

impl ResolvedTable {
    /// Promote `header_index` to column names; everything above it is dropped.
    pub fn promote(report: ReportId, candidate: CandidateTable, header_index: usize) -> Self {
        let CandidateTable {
            origin,
            syntax,
            rows,
        } = candidate;
        let mut iter = rows.into_iter().skip(header_index);
        let columns = iter.next().unwrap_or_default();
        Self {
            report,
            origin,
            syntax,
            columns,
            rows: iter.collect(),
            header_index: Some(header_index),
        }
    }

    /// Keep every row; columns are named by position.
    pub fn unpromoted(report: ReportId, candidate: CandidateTable) -> Self {
        let columns = (0..candidate.width()).map(|i| i.to_string()).collect();
        Self {
            report,
            origin: candidate.origin,
            syntax: candidate.syntax,
            columns,
            rows: candidate.rows,
            header_index: None,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names made unique: blanks become `Unnamed: i`, repeats get
    /// a `.1`, `.2`, ... suffix.
    pub fn disambiguated_columns(&self) -> Vec<String> {
        let mut used: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(self.columns.len());
        for (i, raw) in self.columns.iter().enumerate() {
            let base = match raw.trim() {
                "" => format!("Unnamed: {i}"),
                name => name.to_string(),
            };
            let mut name = base.clone();
            let mut n = 0;
            while used.contains(&name) {
                n += 1;
                name = format!("{base}.{n}");
            }
            used.insert(name.clone());
            out.push(name);
        }
        out
    }

    /// Cells typed according to the table's syntax.
    pub fn typed_rows(&self, parser: &NumberParser) -> Vec<Vec<Value>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|c| parser.value(c, self.syntax)).collect())
            .collect()
    }
}
