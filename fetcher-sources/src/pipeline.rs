//! The per-institution fetch pipeline.
//!
//! ```text
//! Idle -> SessionAcquired -> DocumentRetrieved -> Parsed -> Normalized -> Released
//!   \__________________________ Failed ______________________________/ -> Released
//! ```
//!
//! Every created session is closed exactly once, whichever stage fails.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use fetcher_core::{Credentials, FetchError, FetchFailure, Period, PeriodSelector, Stage, Statement};
use fetcher_ingest::{normalize, StatementParser};
use tracing::{debug, info, warn};

use crate::retriever::DocumentRetriever;
use crate::session::{Locator, Session, SessionFactory};

pub type AdapterResult = Result<Statement, FetchFailure>;

/// Uniform contract every institution is fetched through.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Institution id, e.g. `degiro-account`.
    fn source(&self) -> &str;

    /// Key into the credential store; `None` for sources without a login.
    fn credential_key(&self) -> Option<&str>;

    fn requires_credentials(&self) -> bool {
        self.credential_key().is_some()
    }

    async fn fetch(&self, credentials: &Credentials, period: &PeriodSelector) -> AdapterResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    SessionAcquired,
    DocumentRetrieved,
    Parsed,
    Normalized,
    Failed,
    Released,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub acquire: Duration,
    pub retrieve: Duration,
    pub release: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            acquire: Duration::from_secs(300),
            retrieve: Duration::from_secs(120),
            release: Duration::from_secs(15),
        }
    }
}

/// The states one fetch went through, and how it ended.
#[derive(Debug)]
pub struct FetchReport {
    pub states: Vec<PipelineState>,
    pub result: AdapterResult,
}

/// Maps the requested period onto what the session should retrieve.
pub type LocatorPlan = Box<dyn Fn(&Period) -> Result<Locator, FetchError> + Send + Sync>;

pub struct Pipeline {
    source: String,
    credential_key: Option<String>,
    factory: Box<dyn SessionFactory>,
    plan: LocatorPlan,
    parser: Box<dyn StatementParser>,
    timeouts: Timeouts,
    lookback_days: i64,
    today: Option<NaiveDate>,
}

impl Pipeline {
    pub fn new(
        source: impl Into<String>,
        factory: Box<dyn SessionFactory>,
        plan: LocatorPlan,
        parser: Box<dyn StatementParser>,
    ) -> Self {
        Self {
            source: source.into(),
            credential_key: None,
            factory,
            plan,
            parser,
            timeouts: Timeouts::default(),
            lookback_days: fetcher_core::DEFAULT_LOOKBACK_DAYS,
            today: None,
        }
    }

    pub fn with_credential_key(mut self, key: impl Into<String>) -> Self {
        self.credential_key = Some(key.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    /// Pin "today", for reproducible `latest` periods.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn parser_format(&self) -> &'static str {
        self.parser.format()
    }

    /// Run the whole state machine once and return its trace.
    pub async fn fetch_with_trace(&self, credentials: &Credentials, selector: &PeriodSelector) -> FetchReport {
        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let period = selector.resolve(today, self.lookback_days);
        let mut states = vec![PipelineState::Idle];

        let mut session = match self.factory.create() {
            Ok(session) => session,
            Err(error) => {
                warn!(source = %self.source, %error, "session could not be created");
                // Nothing was created, so there is nothing to close.
                states.extend([PipelineState::Failed, PipelineState::Released]);
                let result = Err(FetchFailure::new(&self.source, Stage::Acquire, error));
                return FetchReport { states, result };
            }
        };
        debug!(source = %self.source, kind = %self.factory.kind(), %period, "session created");

        let outcome = self.drive(session.as_mut(), credentials, period, today, &mut states).await;
        if let Err((stage, error)) = &outcome {
            warn!(source = %self.source, %stage, %error, "fetch failed");
            states.push(PipelineState::Failed);
        }

        self.release(session.as_mut()).await;
        states.push(PipelineState::Released);

        let result = outcome.map_err(|(stage, error)| FetchFailure::new(&self.source, stage, error));
        FetchReport { states, result }
    }

    async fn drive(
        &self,
        session: &mut dyn Session,
        credentials: &Credentials,
        period: Period,
        today: NaiveDate,
        states: &mut Vec<PipelineState>,
    ) -> Result<Statement, (Stage, FetchError)> {
        let acquire = self.timeouts.acquire;
        tokio::time::timeout(acquire, session.open(credentials))
            .await
            .map_err(|_| FetchError::TransientConnectivity(format!("session not acquired within {acquire:?}")))
            .and_then(|r| r)
            .map_err(|e| (Stage::Acquire, e))?;
        self.transition(states, PipelineState::SessionAcquired);

        let locator = (self.plan)(&period).map_err(|e| (Stage::Retrieve, e))?;
        let mut doc = DocumentRetriever::new(self.timeouts.retrieve)
            .retrieve(session, &locator)
            .await
            .map_err(|e| (Stage::Retrieve, e))?;
        doc.source = self.source.clone();
        doc.period = Some(period);
        doc.retrieved_on = today;
        self.transition(states, PipelineState::DocumentRetrieved);

        let parsed = self.parser.parse(&doc).map_err(|e| (Stage::Parse, e))?;
        self.transition(states, PipelineState::Parsed);

        let statement = normalize(parsed)
            .and_then(|st| self.within_period(st, &period))
            .map_err(|e| (Stage::Normalize, e))?;
        self.transition(states, PipelineState::Normalized);
        info!(
            source = %self.source,
            transactions = statement.transactions.len(),
            balances = statement.balances.len(),
            "statement fetched"
        );
        Ok(statement)
    }

    /// Keep what the requested period covers. A statement reporting its own
    /// billing cycle is kept whole when that cycle overlaps the period;
    /// snapshots carry no period and are kept as they are.
    fn within_period(&self, mut statement: Statement, period: &Period) -> Result<Statement, FetchError> {
        let (Some(start), Some(end)) = (statement.period_start, statement.period_end) else {
            return Ok(statement);
        };
        let covered = Period { start, end };
        if covered != *period {
            if covered.overlaps(period) {
                return Ok(statement);
            }
            return Err(FetchError::DocumentNotFound(format!("latest statement covers {covered}, not {period}")));
        }

        let before = statement.transactions.len();
        statement.transactions.retain(|t| period.contains(t.date));
        let dropped = before - statement.transactions.len();
        if dropped == 0 {
            return Ok(statement);
        }
        if statement.transactions.is_empty() && statement.balances.is_empty() {
            return Err(FetchError::DocumentNotFound(format!("no transactions within {period}")));
        }
        debug!(source = %self.source, dropped, %period, "dropped transactions outside the period");
        for (ordinal, t) in statement.transactions.iter_mut().enumerate() {
            t.ordinal = ordinal;
        }
        Ok(statement)
    }

    fn transition(&self, states: &mut Vec<PipelineState>, next: PipelineState) {
        debug!(source = %self.source, state = %next, "pipeline transition");
        states.push(next);
    }

    /// Close, or force-release when closing hangs. Never fails the fetch.
    async fn release(&self, session: &mut dyn Session) {
        match tokio::time::timeout(self.timeouts.release, session.close()).await {
            Ok(Ok(())) => debug!(source = %self.source, "session released"),
            Ok(Err(e)) => warn!(source = %self.source, error = %e, "session close reported an error"),
            Err(_) => {
                warn!(source = %self.source, timeout = ?self.timeouts.release, "session close timed out; aborting");
                session.abort();
            }
        }
    }
}

#[async_trait]
impl Adapter for Pipeline {
    fn source(&self) -> &str {
        &self.source
    }

    fn credential_key(&self) -> Option<&str> {
        self.credential_key.as_deref()
    }

    async fn fetch(&self, credentials: &Credentials, period: &PeriodSelector) -> AdapterResult {
        self.fetch_with_trace(credentials, period).await.result
    }
}
