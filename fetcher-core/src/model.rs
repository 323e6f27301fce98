//! Canonical record types every adapter converges on.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix marking a non-ISO unit, e.g. `unit:IE00B3RBWM25` for fund shares.
pub const UNIT_PREFIX: &str = "unit:";

/// ISO 4217 currency code or a documented non-ISO unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    Iso(String),
    Unit(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid currency code: {0:?}")]
pub struct CurrencyError(pub String);

impl Currency {
    /// Parse an ISO 4217 code (case-insensitive) or a `unit:` sentinel.
    pub fn parse(raw: &str) -> Result<Self, CurrencyError> {
        let s = raw.trim();
        if let Some(symbol) = s.strip_prefix(UNIT_PREFIX) {
            return Self::unit(symbol);
        }
        if s.len() == 3 && s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Ok(Currency::Iso(s.to_ascii_uppercase()));
        }
        Err(CurrencyError(raw.to_string()))
    }

    /// A holding measured in units of `symbol` (ticker, ISIN, ...).
    pub fn unit(symbol: &str) -> Result<Self, CurrencyError> {
        let symbol = symbol.trim();
        if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
            return Err(CurrencyError(format!("{UNIT_PREFIX}{symbol}")));
        }
        Ok(Currency::Unit(symbol.to_string()))
    }

    pub fn is_iso(&self) -> bool {
        matches!(self, Currency::Iso(_))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Iso(code) => f.write_str(code),
            Currency::Unit(symbol) => write!(f, "{UNIT_PREFIX}{symbol}"),
        }
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::parse(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.to_string()
    }
}

/// A single booked movement of money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Position within the statement; identifies verbatim duplicates.
    pub ordinal: usize,
    pub date: NaiveDate,
    /// Positive = credit, negative = debit
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    /// Source-specific category or tag
    pub category: Option<String>,
}

impl Transaction {
    pub fn is_credit(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    pub fn is_debit(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }
}

/// Point-in-time snapshot of one account (or one holding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account: String,
    pub as_of: NaiveDate,
    pub amount: Decimal,
    pub currency: Currency,
}

/// One retrieval unit from one institution for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub source: String,
    pub account: Option<String>,
    /// `None` for instantaneous snapshots
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub transactions: Vec<Transaction>,
    pub balances: Vec<Balance>,
}

impl Statement {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            account: None,
            period_start: None,
            period_end: None,
            transactions: Vec::new(),
            balances: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.balances.is_empty()
    }

    /// Net flow per currency across all transactions.
    pub fn totals_by_currency(&self) -> BTreeMap<Currency, Decimal> {
        let mut totals = BTreeMap::new();
        for t in &self.transactions {
            *totals.entry(t.currency.clone()).or_insert(Decimal::ZERO) += t.amount;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn txn(ordinal: usize, amount: &str, currency: &str) -> Transaction {
        Transaction {
            ordinal,
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            amount: amount.parse().unwrap(),
            currency: Currency::parse(currency).unwrap(),
            description: "x".to_string(),
            category: None,
        }
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(Currency::parse("chf").unwrap(), Currency::Iso("CHF".into()));
        assert_eq!(
            Currency::parse("unit:IE00B3RBWM25").unwrap(),
            Currency::Unit("IE00B3RBWM25".into())
        );
        assert!(Currency::parse("CH").is_err());
        assert!(Currency::parse("$").is_err());
        assert!(Currency::parse("unit:").is_err());
    }

    #[test]
    fn test_currency_serde_as_string() {
        let json = serde_json::to_string(&Currency::unit("AAPL").unwrap()).unwrap();
        assert_eq!(json, "\"unit:AAPL\"");
        let back: Currency = serde_json::from_str("\"usd\"").unwrap();
        assert_eq!(back, Currency::Iso("USD".into()));
    }

    #[test]
    fn test_credit_debit() {
        assert!(txn(0, "1200.00", "CHF").is_credit());
        assert!(txn(1, "-50.00", "CHF").is_debit());
        let zero = txn(2, "0.00", "CHF");
        assert!(!zero.is_credit() && !zero.is_debit());
    }

    #[test]
    fn test_totals_by_currency() {
        let mut st = Statement::new("mock");
        st.transactions = vec![
            txn(0, "-50.00", "CHF"),
            txn(1, "1200.00", "CHF"),
            txn(2, "-3.10", "EUR"),
        ];
        let totals = st.totals_by_currency();
        assert_eq!(totals[&Currency::Iso("CHF".into())], Decimal::new(115000, 2));
        assert_eq!(totals[&Currency::Iso("EUR".into())], Decimal::new(-310, 2));
    }
}
