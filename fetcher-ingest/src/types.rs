use chrono::NaiveDate;
use fetcher_core::Period;

use crate::locale::{DateFormat, NumberFormat};

/// How a source writes the sign of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignConvention {
    /// Positive = money in (bank accounts, brokers)
    CreditPositive,
    /// Positive = charge (credit card statements, receipts)
    DebitPositive,
}

/// Explicit per-row direction, overriding the sign convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Debit,
    Credit,
}

/// Per-institution parsing rules, declared by each parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conventions {
    pub sign: SignConvention,
    pub date: DateFormat,
    pub number: NumberFormat,
    /// Used when rows carry no currency of their own
    pub currency: Option<&'static str>,
}

/// A transaction row as extracted, before any value is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    /// 1-based line (or record) number in the source document
    pub line: usize,
    pub date: String,
    pub amount: String,
    pub currency: Option<String>,
    pub description: String,
    pub category: Option<String>,
    pub direction: Option<Direction>,
}

impl ParsedRow {
    pub fn new(
        line: usize,
        date: impl Into<String>,
        amount: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            line,
            date: date.into(),
            amount: amount.into(),
            currency: None,
            description: description.into(),
            category: None,
            direction: None,
        }
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        if !category.trim().is_empty() {
            self.category = Some(category);
        }
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

/// What a balance is counted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceUnit {
    Currency(String),
    /// Units of a security (ISIN, ticker)
    Holding(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBalance {
    pub line: usize,
    pub account: String,
    /// Raw date in the statement's date format; `None` means the reference date
    pub as_of: Option<String>,
    pub amount: String,
    pub unit: BalanceUnit,
}

/// Intermediate, institution-independent output of a parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub source: String,
    pub account: Option<String>,
    pub period: Option<Period>,
    /// Anchor for year inference and undated balances
    pub reference_date: Option<NaiveDate>,
    pub conventions: Conventions,
    pub rows: Vec<ParsedRow>,
    pub balances: Vec<ParsedBalance>,
}

impl ParsedStatement {
    pub fn new(source: impl Into<String>, conventions: Conventions) -> Self {
        Self {
            source: source.into(),
            account: None,
            period: None,
            reference_date: None,
            conventions,
            rows: Vec::new(),
            balances: Vec::new(),
        }
    }
}
