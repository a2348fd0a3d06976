// src/normalize.rs
use anyhow::{bail, Result};
use regex::Regex;
use serde::Serialize;

use crate::config::NumberLocale;

/// How the numbers inside a table's cells are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellSyntax {
    /// Rendered text (markup); numbers follow the configured locale.
    Locale,
    /// Spreadsheet values; numbers are already machine-formatted.
    Canonical,
}

/// A cell after typing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Empty,
    Number(f64),
    Text(String),
}

/// Parses locale-formatted numbers such as `1.234,56`.
#[derive(Debug, Clone)]
pub struct NumberParser {
    locale: NumberLocale,
    pattern: Regex,
}

impl NumberParser {
    pub fn new(locale: NumberLocale) -> Result<Self> {
        if locale.decimal == locale.thousands {
            bail!(
                "decimal and thousands separators must differ (both are {:?})",
                locale.decimal
            );
        }
        let dec = regex::escape(&locale.decimal.to_string());
        let th = regex::escape(&locale.thousands.to_string());
        // grouped digits, or a plain run of digits, each with an optional fraction
        let pattern = Regex::new(&format!(
            r"^[+-]?(?:\d{{1,3}}(?:{th}\d{{3}})+|\d+)(?:{dec}\d+)?$"
        ))?;
        Ok(Self { locale, pattern })
    }

    pub fn locale(&self) -> NumberLocale {
        self.locale
    }

    /// Returns `None` for anything that is not a well-formed number.
    pub fn parse(&self, raw: &str) -> Option<f64> {
        let s = raw.trim();
        if !self.pattern.is_match(s) {
            return None;
        }
        let canonical: String = s
            .chars()
            .filter(|c| *c != self.locale.thousands)
            .map(|c| if c == self.locale.decimal { '.' } else { c })
            .collect();
        canonical.parse().ok()
    }

    /// Type one raw cell according to its table's syntax.
    pub fn value(&self, raw: &str, syntax: CellSyntax) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Empty;
        }
        let number = match syntax {
            CellSyntax::Locale => self.parse(trimmed),
            CellSyntax::Canonical => trimmed.parse::<f64>().ok().filter(|v| v.is_finite()),
        };
        match number {
            Some(n) => Value::Number(n),
            None => Value::Text(raw.to_string()),
        }
    }
}
