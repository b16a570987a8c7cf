use serde_json::Value;

use crate::errors::ParserError;
use crate::model::Row;

pub(crate) fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}

pub(crate) fn object_to_row(
    parser: &'static str,
    row_index: usize,
    value: Value,
) -> Result<Row, ParserError> {
    match value {
        Value::Object(map) => Ok(Row::from(map)),
        other => Err(ParserError::DataRow {
            parser,
            row_index,
            message: format!("expected an object, found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
