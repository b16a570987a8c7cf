pub mod errors;
pub mod formats;
pub mod model;
mod registry;

pub use errors::{ParserAttempt, ParserError};
pub use model::{CellError, Row};
pub use registry::{parse_rows, parse_with_parsers, RowParser};
