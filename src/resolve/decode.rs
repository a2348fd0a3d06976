// src/resolve/decode.rs
use tracing::debug;

use super::{markup, sheet, sniff};
use crate::document::RawDocument;
use crate::error::ResolveError;
use crate::table::CandidateTable;

/// One way of reading a document's bytes.
pub trait Decoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the content is not in this decoder's format.
    /// `Some(vec![])` when it is, but holds no table.
    fn decode(&self, content: &[u8]) -> Option<Vec<CandidateTable>>;
}

/// HTML (or anything carrying HTML tags), whatever the file claims to be.
pub struct MarkupDecoder;

impl Decoder for MarkupDecoder {
    fn name(&self) -> &'static str {
        "markup"
    }

    fn decode(&self, content: &[u8]) -> Option<Vec<CandidateTable>> {
        let text = sniff::decode_text(content)?;
        if !sniff::looks_like_markup(&text) {
            return None;
        }
        Some(markup::extract_tables(&text))
    }
}

/// Binary or zipped workbooks.
pub struct SpreadsheetDecoder;

impl Decoder for SpreadsheetDecoder {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn decode(&self, content: &[u8]) -> Option<Vec<CandidateTable>> {
        sheet::extract_sheets(content)
    }
}

/// Decoders tried in order; the first one that produces tables wins.
pub struct DecoderChain {
    decoders: Vec<Box<dyn Decoder>>,
}

impl Default for DecoderChain {
    fn default() -> Self {
        Self::new(vec![Box::new(MarkupDecoder), Box::new(SpreadsheetDecoder)])
    }
}

impl DecoderChain {
    pub fn new(decoders: Vec<Box<dyn Decoder>>) -> Self {
        Self { decoders }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Run the chain. A decoder that recognises the content but finds no table
    /// does not stop the chain; if nothing else produces tables the result is
    /// `NoTableFound` naming that decoder. If no decoder recognises the content
    /// at all, the document is unparsable.
    pub fn decode(
        &self,
        doc: &RawDocument,
    ) -> Result<(&'static str, Vec<CandidateTable>), ResolveError> {
        let mut recognised_by: Option<&'static str> = None;
        for decoder in &self.decoders {
            match decoder.decode(&doc.content) {
                Some(tables) if !tables.is_empty() => return Ok((decoder.name(), tables)),
                Some(_) => {
                    debug!(report = %doc.report, decoder = decoder.name(), "decoded but no tables");
                    recognised_by.get_or_insert(decoder.name());
                }
                None => {
                    debug!(report = %doc.report, decoder = decoder.name(), "decoder rejected content");
                }
            }
        }
        match recognised_by {
            Some(decoder) => Err(ResolveError::NoTableFound {
                report: doc.report,
                decoder,
            }),
            None => Err(ResolveError::UnparsableDocument { report: doc.report }),
        }
    }
}
