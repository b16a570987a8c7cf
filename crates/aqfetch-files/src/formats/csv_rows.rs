use csv::{ReaderBuilder, Trim};
use serde_json::Value;

use crate::errors::ParserError;
use crate::model::Row;
use crate::registry::RowParser;

use super::strip_bom;

/// Delimited text with a header row. Every cell is kept as a string; numeric
/// interpretation is left to the caller.
pub struct CsvRowsParser {
    delimiter: u8,
}

impl Default for CsvRowsParser {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl CsvRowsParser {
    const NAME: &'static str = "CSV";

    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl RowParser for CsvRowsParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, content: &str) -> Result<Vec<Row>, ParserError> {
        let content = strip_bom(content);
        if content.trim().is_empty() {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "payload is empty".to_string(),
            });
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::Headers)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|source| ParserError::Csv {
                parser: Self::NAME,
                source,
            })?
            .clone();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(ParserError::InvalidHeader {
                parser: Self::NAME,
                message: "header row has no column names".to_string(),
            });
        }

        let mut rows = Vec::new();
        for (row_index, record) in reader.records().enumerate() {
            let record = record.map_err(|source| ParserError::Csv {
                parser: Self::NAME,
                source,
            })?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            if record.len() > headers.len() {
                return Err(ParserError::DataRow {
                    parser: Self::NAME,
                    row_index,
                    message: format!(
                        "row has {} cells but the header has {} columns",
                        record.len(),
                        headers.len()
                    ),
                });
            }
            // Short rows leave trailing columns absent rather than empty.
            let row: Row = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| (header.to_string(), Value::String(cell.to_string())))
                .collect();
            rows.push(row);
        }

        Ok(rows)
    }
}
