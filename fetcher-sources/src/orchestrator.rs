//! Runs a selection of adapters and collects one outcome per adapter.
//!
//! A failing institution never prevents the others from being fetched.
//! Transient failures are retried with exponential backoff; every attempt
//! goes through a fresh session.

use std::time::Duration;

use fetcher_core::{CredentialStore, Credentials, FetchError, FetchFailure, PeriodSelector, Stage, Statement};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::pipeline::Adapter;

/// Longest wait between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Wait before attempt `attempt + 1`, doubling from the initial backoff.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

#[derive(Debug)]
pub enum Outcome {
    Fetched(Statement),
    /// The source had nothing for the period.
    NothingToFetch(String),
    Failed(FetchFailure),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[derive(Debug)]
pub struct AdapterOutcome {
    pub source: String,
    /// Fetch attempts made; 0 when the adapter never ran.
    pub attempts: u32,
    pub outcome: Outcome,
}

/// Outcomes in selection order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<AdapterOutcome>,
}

impl RunReport {
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Fetched(st) => Some(st),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &FetchFailure> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Failed(f) => Some(f),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.outcome.is_failure())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Orchestrator {
    retry: RetryPolicy,
    parallelism: usize,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), 1)
    }
}

impl Orchestrator {
    pub fn new(retry: RetryPolicy, parallelism: usize) -> Self {
        Self {
            retry,
            parallelism: parallelism.max(1),
        }
    }

    pub async fn run(
        &self,
        adapters: &[Box<dyn Adapter>],
        credentials: &CredentialStore,
        period: PeriodSelector,
    ) -> RunReport {
        let outcomes = stream::iter(adapters.iter())
            .map(|adapter| self.run_one(adapter.as_ref(), credentials, period))
            .buffered(self.parallelism)
            .collect::<Vec<_>>()
            .await;

        let failed = outcomes.iter().filter(|o| o.outcome.is_failure()).count();
        info!(adapters = outcomes.len(), failed, "run finished");
        RunReport { outcomes }
    }

    async fn run_one(
        &self,
        adapter: &dyn Adapter,
        store: &CredentialStore,
        period: PeriodSelector,
    ) -> AdapterOutcome {
        let source = adapter.source().to_string();

        let anonymous = Credentials::anonymous();
        let credentials = match adapter.credential_key() {
            Some(key) => match store.get(key) {
                Some(c) => c,
                None => {
                    let error = FetchError::Configuration(format!("no credentials for key {key:?}"));
                    warn!(%source, %error, "skipping adapter");
                    return AdapterOutcome {
                        outcome: Outcome::Failed(FetchFailure::new(&source, Stage::Acquire, error)),
                        source,
                        attempts: 0,
                    };
                }
            },
            None => &anonymous,
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = adapter.fetch(credentials, &period).await;
            let outcome = match result {
                Ok(statement) => Outcome::Fetched(statement),
                Err(f) if f.error.is_retryable() && attempt < max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(%source, attempt, error = %f.error, ?backoff, "retrying");
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                Err(f) => match f.error {
                    FetchError::DocumentNotFound(reason) => Outcome::NothingToFetch(reason),
                    _ => Outcome::Failed(f),
                },
            };
            return AdapterOutcome {
                source,
                attempts: attempt,
                outcome,
            };
        }
    }
}
