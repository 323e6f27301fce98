//! fetcher-core: canonical records, error taxonomy and output for the fetch pipeline

pub mod credentials;
pub mod document;
pub mod emitter;
pub mod error;
pub mod model;
pub mod period;

pub use credentials::{CredentialStore, Credentials};
pub use document::{DocumentPart, MediaType, RawDocument};
pub use emitter::{emit_to_vec, CsvEmitter, EmitError, Emitter, JsonLinesEmitter, OutputFormat};
pub use error::{ErrorKind, FetchError, FetchFailure, Stage};
pub use model::{Balance, Currency, Statement, Transaction};
pub use period::{Period, PeriodSelector, DEFAULT_LOOKBACK_DAYS};
