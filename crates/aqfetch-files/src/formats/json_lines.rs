use serde_json::Value;

use crate::errors::ParserError;
use crate::model::Row;
use crate::registry::RowParser;

use super::{object_to_row, strip_bom};

/// Newline-delimited JSON objects, one record per line.
pub struct JsonLinesParser;

impl JsonLinesParser {
    const NAME: &'static str = "JSON_LINES";
}

impl RowParser for JsonLinesParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, content: &str) -> Result<Vec<Row>, ParserError> {
        let content = strip_bom(content);
        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .map(|(index, line)| (index, line.trim()))
            .filter(|(_, line)| !line.is_empty())
            .collect();

        if lines.is_empty() || !lines.iter().all(|(_, line)| line.starts_with('{')) {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "not every non-blank line starts with '{'".to_string(),
            });
        }

        let mut rows = Vec::with_capacity(lines.len());
        for (row_index, (line_index, line)) in lines.into_iter().enumerate() {
            let value: Value = serde_json::from_str(line).map_err(|source| ParserError::Json {
                parser: Self::NAME,
                line: line_index + 1,
                source,
            })?;
            rows.push(object_to_row(Self::NAME, row_index, value)?);
        }
        Ok(rows)
    }
}
