//! fetcher-ingest: institution parsers and normalization into canonical records.

pub mod locale;
pub mod normalize;
pub mod parsers;
pub mod types;

pub use locale::{DateFormat, NumberFormat};
pub use normalize::normalize;
pub use parsers::{parse_and_normalize, StatementParser};
pub use types::{BalanceUnit, Conventions, Direction, ParsedBalance, ParsedRow, ParsedStatement, SignConvention};
