// 📂 CSV Reader - streams raw permit rows and yields cleaned records
//
// Bad rows never abort the read: a row without a business name or a row the
// CSV decoder rejects is logged, counted and skipped. An I/O error on the
// underlying stream ends the read and is surfaced by `finish`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

use crate::cleaning::{
    clean_address_line, clean_business_name, clean_full_address, clean_phone_number,
    clean_rating, extract_suburb, parse_original_index, parse_permit_types,
};

// ============================================================================
// RAW ROW (as exported)
// ============================================================================

/// One untyped row of the permit export. Every column is optional so that a
/// missing or empty cell is never a decode error.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct RawRow {
    #[serde(rename = "Index", default)]
    pub index: Option<String>,

    #[serde(rename = "Business Name", default)]
    pub business_name: Option<String>,

    #[serde(rename = "Business Address", default)]
    pub business_address: Option<String>,

    #[serde(rename = "Business Address(Line 1)", default)]
    pub address_line_1: Option<String>,

    #[serde(rename = "Business Address(Line 2)", default)]
    pub address_line_2: Option<String>,

    #[serde(rename = "Business Address Suburb", default)]
    pub suburb: Option<String>,

    #[serde(rename = "Business Phone Number", default)]
    pub phone_number: Option<String>,

    #[serde(rename = "Eat Safe Rating", default)]
    pub eat_safe_rating: Option<String>,

    #[serde(rename = "Permit Name", default)]
    pub permit_name: Option<String>,

    #[serde(rename = "Business Address Suburb List", default)]
    pub suburb_list: Option<String>,
}

// ============================================================================
// CLEANED RECORD
// ============================================================================

/// A row after normalization, ready for import
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRecord {
    pub business_name: String,
    pub full_address: String,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub phone_number: Option<String>,
    pub eat_safe_rating: Option<u8>,
    pub permit_types: Vec<String>,
    pub suburb_name: Option<String>,
    pub original_index: i64,
}

impl CleanedRecord {
    /// Clean a raw row. Returns None when the row has no usable business name.
    pub fn from_raw(raw: &RawRow) -> Option<Self> {
        let business_name = clean_business_name(raw.business_name.as_deref())?;

        Some(CleanedRecord {
            business_name,
            full_address: clean_full_address(raw.business_address.as_deref()),
            address_line_1: clean_address_line(raw.address_line_1.as_deref()),
            address_line_2: clean_address_line(raw.address_line_2.as_deref()),
            phone_number: clean_phone_number(raw.phone_number.as_deref()),
            eat_safe_rating: clean_rating(raw.eat_safe_rating.as_deref()),
            permit_types: parse_permit_types(raw.permit_name.as_deref()),
            suburb_name: extract_suburb(raw.suburb_list.as_deref()),
            original_index: parse_original_index(raw.index.as_deref()),
        })
    }
}

// ============================================================================
// STREAMING READER
// ============================================================================

/// Counters kept while streaming
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    /// Rows seen, including skipped ones
    pub rows: usize,
    pub emitted: usize,
    pub skipped_blank_name: usize,
    pub malformed: usize,
}

impl ReadStats {
    pub fn skipped(&self) -> usize {
        self.skipped_blank_name + self.malformed
    }
}

/// Lazy iterator over the cleaned records of a permit CSV.
///
/// Single pass: once exhausted it stays exhausted. Open the file again to
/// re-read it.
pub struct CsvRecords<R = File> {
    rows: csv::DeserializeRecordsIntoIter<R, RawRow>,
    stats: ReadStats,
    io_error: Option<csv::Error>,
}

impl CsvRecords<File> {
    pub fn open(csv_path: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(csv_path)
            .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;
        // The header read is the first real read; a path that opens but can't
        // be read (a directory, say) fails here.
        rdr.headers()
            .with_context(|| format!("Failed to read CSV file {}", csv_path.display()))?;
        Ok(Self::new(rdr))
    }
}

impl<R: std::io::Read> CsvRecords<R> {
    pub fn from_reader(reader: R) -> Self {
        Self::new(csv::ReaderBuilder::new().flexible(true).from_reader(reader))
    }

    fn new(rdr: csv::Reader<R>) -> Self {
        CsvRecords {
            rows: rdr.into_deserialize(),
            stats: ReadStats::default(),
            io_error: None,
        }
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Final counters, or the stream error that cut the read short
    pub fn finish(self) -> Result<ReadStats> {
        match self.io_error {
            Some(e) => Err(anyhow::Error::new(e).context("Failed to read CSV stream")),
            None => Ok(self.stats),
        }
    }
}

impl<R: std::io::Read> Iterator for CsvRecords<R> {
    type Item = CleanedRecord;

    fn next(&mut self) -> Option<CleanedRecord> {
        if self.io_error.is_some() {
            return None;
        }

        loop {
            let result = self.rows.next()?;

            let raw = match result {
                Ok(raw) => {
                    self.stats.rows += 1;
                    raw
                }
                Err(e) if e.is_io_error() => {
                    warn!(error = %e, "CSV stream failed");
                    self.io_error = Some(e);
                    return None;
                }
                Err(e) => {
                    self.stats.rows += 1;
                    self.stats.malformed += 1;
                    let line = e.position().map(|p| p.line());
                    warn!(?line, error = %e, "Skipping malformed CSV row");
                    continue;
                }
            };

            match CleanedRecord::from_raw(&raw) {
                Some(record) => {
                    self.stats.emitted += 1;
                    return Some(record);
                }
                None => {
                    self.stats.skipped_blank_name += 1;
                    debug!(
                        index = raw.index.as_deref().unwrap_or(""),
                        "Skipping row without business name"
                    );
                }
            }
        }
    }
}

/// Read and clean a whole CSV file into memory
pub fn load_csv(csv_path: &Path) -> Result<(Vec<CleanedRecord>, ReadStats)> {
    let mut records = CsvRecords::open(csv_path)?;
    let cleaned: Vec<CleanedRecord> = records.by_ref().collect();
    let stats = records.finish()?;
    Ok((cleaned, stats))
}
