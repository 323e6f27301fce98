//! The closed set of institutions the fetcher knows about.
//!
//! Each institution is a [`Pipeline`] assembled from a session factory, a
//! locator plan and a parser. Institutions sharing a login share a
//! credential key.

mod coop;
mod degiro;
mod interactive_brokers;
mod schwab;
mod splitwise;
mod statements;
mod viseca;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use fetcher_core::FetchError;
use fetcher_ingest::parsers::amex::AmexCsv;
use fetcher_ingest::parsers::capital_one_us::CapitalOneUsText;
use fetcher_ingest::parsers::chase_debit::ChaseDebitText;
use fetcher_ingest::parsers::coop_receipt::CoopReceiptText;
use fetcher_ingest::parsers::degiro::{DegiroAccountCsv, DegiroPortfolioCsv};
use fetcher_ingest::parsers::interactive_brokers::InteractiveBrokersCsv;
use fetcher_ingest::parsers::schwab::SchwabCsv;
use fetcher_ingest::parsers::splitwise::SplitwiseJson;
use fetcher_ingest::parsers::viseca::VisecaJson;
use fetcher_ingest::StatementParser;
use regex::Regex;

use crate::extract::{PdfToText, TextExtractor};
use crate::pipeline::{Adapter, Pipeline};
use crate::session::{
    BrowserDriver, BrowserOptions, BrowserSessionFactory, DriverFactory, LoginFlow, SessionFactory, SessionKind, WebDriverClient,
};
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Institution {
    DegiroAccount,
    DegiroPortfolio,
    InteractiveBrokers,
    SchwabBrokerage,
    SchwabEquityAwards,
    Viseca,
    Splitwise,
    CoopReceipts,
    Amex,
    ChaseDebit,
    CapitalOne,
}

impl Institution {
    pub const ALL: [Institution; 11] = [
        Institution::DegiroAccount,
        Institution::DegiroPortfolio,
        Institution::InteractiveBrokers,
        Institution::SchwabBrokerage,
        Institution::SchwabEquityAwards,
        Institution::Viseca,
        Institution::Splitwise,
        Institution::CoopReceipts,
        Institution::Amex,
        Institution::ChaseDebit,
        Institution::CapitalOne,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Institution::DegiroAccount => "degiro-account",
            Institution::DegiroPortfolio => "degiro-portfolio",
            Institution::InteractiveBrokers => "interactive-brokers",
            Institution::SchwabBrokerage => "schwab-brokerage",
            Institution::SchwabEquityAwards => "schwab-equity-awards",
            Institution::Viseca => "viseca",
            Institution::Splitwise => "splitwise",
            Institution::CoopReceipts => "coop-receipts",
            Institution::Amex => "amex",
            Institution::ChaseDebit => "chase-debit",
            Institution::CapitalOne => "capital-one",
        }
    }

    /// `None` for folder-backed sources.
    pub fn credential_key(&self) -> Option<&'static str> {
        match self {
            Institution::DegiroAccount | Institution::DegiroPortfolio => Some("degiro"),
            Institution::InteractiveBrokers => Some("interactive-brokers"),
            Institution::SchwabBrokerage | Institution::SchwabEquityAwards => Some("schwab"),
            Institution::Viseca => Some("viseca"),
            Institution::Splitwise => Some("splitwise"),
            Institution::CoopReceipts => Some("gmail"),
            Institution::Amex | Institution::ChaseDebit | Institution::CapitalOne => None,
        }
    }

    pub fn session_kind(&self) -> SessionKind {
        match self {
            Institution::DegiroAccount
            | Institution::DegiroPortfolio
            | Institution::InteractiveBrokers
            | Institution::SchwabBrokerage
            | Institution::SchwabEquityAwards
            | Institution::Viseca => SessionKind::Browser,
            Institution::Splitwise => SessionKind::Http,
            Institution::CoopReceipts => SessionKind::Mail,
            Institution::Amex | Institution::ChaseDebit | Institution::CapitalOne => SessionKind::Folder,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Institution::DegiroAccount => "Degiro account statement (cash movements)",
            Institution::DegiroPortfolio => "Degiro portfolio snapshot (cash and positions)",
            Institution::InteractiveBrokers => "Interactive Brokers activity statement",
            Institution::SchwabBrokerage => "Charles Schwab brokerage transaction history",
            Institution::SchwabEquityAwards => "Charles Schwab Equity Award Center history",
            Institution::Viseca => "Viseca credit card transactions",
            Institution::Splitwise => "Splitwise expenses, as the current user's share",
            Institution::CoopReceipts => "Coop receipts mailed to Gmail",
            Institution::Amex => "AMEX CSV exports from a local folder",
            Institution::ChaseDebit => "Chase checking statements (PDF) from a local folder",
            Institution::CapitalOne => "Capital One card statements (PDF) from a local folder",
        }
    }

    pub fn parser(&self) -> Box<dyn StatementParser> {
        match self {
            Institution::DegiroAccount => Box::new(DegiroAccountCsv),
            Institution::DegiroPortfolio => Box::new(DegiroPortfolioCsv),
            Institution::InteractiveBrokers => Box::new(InteractiveBrokersCsv),
            Institution::SchwabBrokerage | Institution::SchwabEquityAwards => Box::new(SchwabCsv),
            Institution::Viseca => Box::new(VisecaJson),
            Institution::Splitwise => Box::new(SplitwiseJson),
            Institution::CoopReceipts => Box::new(CoopReceiptText),
            Institution::Amex => Box::new(AmexCsv),
            Institution::ChaseDebit => Box::new(ChaseDebitText),
            Institution::CapitalOne => Box::new(CapitalOneUsText),
        }
    }

    /// Adapter wired to real collaborators (WebDriver, Gmail, pdftotext).
    pub fn adapter(&self, settings: &Settings) -> Box<dyn Adapter> {
        self.adapter_with(settings, &Toolkit::from_settings(settings))
    }

    pub fn adapter_with(&self, settings: &Settings, toolkit: &Toolkit) -> Box<dyn Adapter> {
        let (factory, plan) = match self {
            Institution::DegiroAccount => (toolkit.browser(settings, degiro::login()), degiro::account_plan()),
            Institution::DegiroPortfolio => (toolkit.browser(settings, degiro::login()), degiro::portfolio_plan()),
            Institution::InteractiveBrokers => (
                toolkit.browser(settings, interactive_brokers::login()),
                interactive_brokers::plan(),
            ),
            Institution::SchwabBrokerage => (toolkit.browser(settings, schwab::login()), schwab::plan(false)),
            Institution::SchwabEquityAwards => (toolkit.browser(settings, schwab::login()), schwab::plan(true)),
            Institution::Viseca => (
                toolkit.browser(settings, viseca::login()),
                viseca::plan(settings.viseca.card_id.clone()),
            ),
            Institution::Splitwise => (splitwise::factory(toolkit), splitwise::plan()),
            Institution::CoopReceipts => (coop::factory(settings, toolkit), coop::plan()),
            Institution::Amex => (
                statements::factory(settings.folders.amex.clone(), toolkit),
                statements::amex_plan(),
            ),
            Institution::ChaseDebit => (
                statements::factory(settings.folders.chase_debit.clone(), toolkit),
                statements::pdf_plan(),
            ),
            Institution::CapitalOne => (
                statements::factory(settings.folders.capital_one.clone(), toolkit),
                statements::pdf_plan(),
            ),
        };

        let mut pipeline = Pipeline::new(self.id(), factory, plan, self.parser())
            .with_timeouts(settings.pipeline.timeouts())
            .with_lookback_days(settings.pipeline.lookback_days);
        if let Some(key) = self.credential_key() {
            pipeline = pipeline.with_credential_key(key);
        }
        Box::new(pipeline)
    }
}

impl fmt::Display for Institution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Institution {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Institution::ALL
            .into_iter()
            .find(|i| i.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<_> = Institution::ALL.iter().map(Institution::id).collect();
                FetchError::Configuration(format!("unknown source {s:?}; known: {}", known.join(", ")))
            })
    }
}

/// Shared collaborators handed to every session factory.
#[derive(Clone)]
pub struct Toolkit {
    pub http: reqwest::Client,
    pub extractor: Arc<dyn TextExtractor>,
    pub driver: DriverFactory,
}

impl Toolkit {
    pub fn from_settings(settings: &Settings) -> Self {
        let browser = settings.browser.clone();
        let driver: DriverFactory = Arc::new(move |downloads: &Path| -> Box<dyn BrowserDriver> {
            Box::new(WebDriverClient::new(
                browser.webdriver_url.clone(),
                browser.browser,
                browser.headless,
                downloads.to_path_buf(),
            ))
        });
        Self {
            http: reqwest::Client::new(),
            extractor: Arc::new(PdfToText::new(settings.extract.pdftotext.clone())),
            driver,
        }
    }

    fn browser(&self, settings: &Settings, flow: LoginFlow) -> Box<dyn SessionFactory> {
        let b = &settings.browser;
        let options = BrowserOptions {
            downloads_dir: b.downloads_dir(),
            poll_interval: Duration::from_millis(b.poll_ms),
            element_timeout: Duration::from_secs(b.element_timeout_secs),
            second_factor_timeout: Duration::from_secs(b.second_factor_timeout_secs),
        };
        Box::new(BrowserSessionFactory::new(flow, options, self.http.clone(), self.driver.clone()))
    }
}

/// Compile a file-name pattern inside a locator plan.
fn pattern(re: &str) -> Result<Regex, FetchError> {
    Regex::new(re).map_err(|e| FetchError::Configuration(format!("bad pattern {re:?}: {e}")))
}
