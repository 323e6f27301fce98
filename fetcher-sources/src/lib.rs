//! fetcher-sources: sessions, the per-institution pipeline and the orchestrator

pub mod extract;
pub mod institutions;
mod net;
pub mod orchestrator;
pub mod pipeline;
pub mod retriever;
pub mod session;
pub mod settings;

pub use institutions::{Institution, Toolkit};
pub use orchestrator::{AdapterOutcome, Orchestrator, Outcome, RetryPolicy, RunReport};
pub use pipeline::{Adapter, AdapterResult, FetchReport, LocatorPlan, Pipeline, PipelineState, Timeouts};
pub use retriever::DocumentRetriever;
pub use settings::Settings;
