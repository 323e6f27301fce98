//! Map parsed rows onto canonical records.
//!
//! Dates and amounts are interpreted here, not in the parsers, so that a
//! malformed value is a `Validation` error carrying the raw field, while a
//! missing template stays an `UnrecognizedFormat` error from the parser.
//! Rows are never deduplicated; verbatim repeats survive with distinct
//! ordinals.

use fetcher_core::{Balance, Currency, FetchError, Statement, Transaction};
use rust_decimal::Decimal;

use crate::locale::{parse_amount, parse_date};
use crate::types::{BalanceUnit, Direction, ParsedStatement, SignConvention};

fn invalid(field: &str, raw: &str, line: usize, message: impl std::fmt::Display) -> FetchError {
    FetchError::validation(field, raw, format!("line {line}: {message}"))
}

fn apply_sign(value: Decimal, direction: Option<Direction>, convention: SignConvention) -> Decimal {
    match (direction, convention) {
        (Some(Direction::Credit), _) => value.abs(),
        (Some(Direction::Debit), _) => -value.abs(),
        (None, SignConvention::CreditPositive) => value,
        (None, SignConvention::DebitPositive) => -value,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn normalize(parsed: ParsedStatement) -> Result<Statement, FetchError> {
    let conv = parsed.conventions;
    let mut transactions = Vec::with_capacity(parsed.rows.len());

    for row in &parsed.rows {
        let date = parse_date(&row.date, conv.date, parsed.reference_date)
            .map_err(|m| invalid("date", &row.date, row.line, m))?;

        let raw_amount = parse_amount(&row.amount, conv.number)
            .map_err(|m| invalid("amount", &row.amount, row.line, m))?;
        let amount = apply_sign(raw_amount, row.direction, conv.sign);

        let code = row.currency.as_deref().or(conv.currency).unwrap_or("");
        let currency = Currency::parse(code).map_err(|e| invalid("currency", code, row.line, e))?;

        let description = collapse_whitespace(&row.description);
        if description.is_empty() {
            return Err(invalid("description", &row.description, row.line, "description is empty"));
        }

        transactions.push(Transaction {
            ordinal: 0,
            date,
            amount,
            currency,
            description,
            category: row
                .category
                .as_deref()
                .map(collapse_whitespace)
                .filter(|c| !c.is_empty()),
        });
    }

    // Stable: rows on the same day keep source order.
    transactions.sort_by_key(|t| t.date);
    for (i, t) in transactions.iter_mut().enumerate() {
        t.ordinal = i;
    }

    let mut balances = Vec::with_capacity(parsed.balances.len());
    for b in &parsed.balances {
        let as_of = match &b.as_of {
            Some(raw) => parse_date(raw, conv.date, parsed.reference_date)
                .map_err(|m| invalid("as_of", raw, b.line, m))?,
            None => parsed
                .reference_date
                .ok_or_else(|| invalid("as_of", "", b.line, "balance has no date and statement no reference date"))?,
        };
        let raw_amount = parse_amount(&b.amount, conv.number)
            .map_err(|m| invalid("balance", &b.amount, b.line, m))?;
        let (amount, currency) = match &b.unit {
            BalanceUnit::Currency(code) => (
                apply_sign(raw_amount, None, conv.sign),
                Currency::parse(code).map_err(|e| invalid("currency", code, b.line, e))?,
            ),
            BalanceUnit::Holding(symbol) => (
                raw_amount,
                Currency::unit(symbol).map_err(|e| invalid("unit", symbol, b.line, e))?,
            ),
        };
        balances.push(Balance {
            account: b.account.clone(),
            as_of,
            amount,
            currency,
        });
    }

    tracing::debug!(
        source = %parsed.source,
        transactions = transactions.len(),
        balances = balances.len(),
        "normalized statement"
    );
    Ok(Statement {
        source: parsed.source,
        account: parsed.account,
        period_start: parsed.period.map(|p| p.start),
        period_end: parsed.period.map(|p| p.end),
        transactions,
        balances,
    })
}
