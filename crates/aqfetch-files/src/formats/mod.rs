mod common;
mod csv_rows;
mod json_array;
mod json_lines;

pub use csv_rows::CsvRowsParser;
pub use json_array::JsonArrayParser;
pub use json_lines::JsonLinesParser;

pub(crate) use common::{object_to_row, strip_bom};
