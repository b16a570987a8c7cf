use crate::errors::{ParserAttempt, ParserError};
use crate::formats::{CsvRowsParser, JsonArrayParser, JsonLinesParser};
use crate::model::Row;

pub trait RowParser {
    fn name(&self) -> &'static str;
    fn parse(&self, content: &str) -> Result<Vec<Row>, ParserError>;
}

/// Decodes a provider export into rows, trying JSON array, JSON lines and
/// finally CSV.
pub fn parse_rows(content: &str) -> Result<Vec<Row>, ParserError> {
    let json_array = JsonArrayParser;
    let json_lines = JsonLinesParser;
    let csv_rows = CsvRowsParser::default();
    let parsers: [&dyn RowParser; 3] = [&json_array, &json_lines, &csv_rows];
    parse_with_parsers(content, &parsers)
}

pub fn parse_with_parsers(
    content: &str,
    parsers: &[&dyn RowParser],
) -> Result<Vec<Row>, ParserError> {
    let mut attempts = Vec::new();

    for parser in parsers {
        match parser.parse(content) {
            Ok(parsed) => return Ok(parsed),
            Err(ParserError::FormatMismatch { reason, .. }) => {
                attempts.push(ParserAttempt::new(parser.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(ParserError::NoMatchingParser { attempts })
}
