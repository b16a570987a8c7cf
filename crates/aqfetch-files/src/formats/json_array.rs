use serde_json::Value;

use crate::errors::ParserError;
use crate::model::Row;
use crate::registry::RowParser;

use super::{object_to_row, strip_bom};

/// A JSON document holding an array of flat objects.
pub struct JsonArrayParser;

impl JsonArrayParser {
    const NAME: &'static str = "JSON_ARRAY";
}

impl RowParser for JsonArrayParser {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn parse(&self, content: &str) -> Result<Vec<Row>, ParserError> {
        let trimmed = strip_bom(content).trim_start();
        if !trimmed.starts_with('[') {
            return Err(ParserError::FormatMismatch {
                parser: Self::NAME,
                reason: "payload does not start with '['".to_string(),
            });
        }

        let values: Vec<Value> =
            serde_json::from_str(trimmed).map_err(|source| ParserError::Json {
                parser: Self::NAME,
                line: 1,
                source,
            })?;

        values
            .into_iter()
            .enumerate()
            .map(|(index, value)| object_to_row(Self::NAME, index, value))
            .collect()
    }
}
