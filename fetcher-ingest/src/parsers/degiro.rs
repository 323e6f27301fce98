//! Degiro account and portfolio CSV exports.
//!
//! The export language follows the web UI. German exports use comma
//! decimals, English exports dot decimals; both share the `dd-mm-yyyy` date
//! layout. Amount columns are split in two: a currency code under the named
//! header followed by the number under an unnamed one.
//!
//! Account:   Datum,Uhrzeit,Valutadatum,Produkt,ISIN,Beschreibung,FX,Änderung,,Saldo,,Order-Id
//! Portfolio: Produkt,Symbol/ISIN,Anzahl,Schlusskurs,Lokaler Wert,,Wert in CHF

use std::collections::BTreeSet;

use fetcher_core::{FetchError, RawDocument};

use super::{csv_reader, field, first_text, Columns, StatementParser};
use crate::locale::{DateFormat, NumberFormat};
use crate::types::{BalanceUnit, Conventions, ParsedBalance, ParsedRow, ParsedStatement, SignConvention};

const ACCOUNT_FORMAT: &str = "degiro-account-csv";
const PORTFOLIO_FORMAT: &str = "degiro-portfolio-csv";

fn conventions(number: NumberFormat) -> Conventions {
    Conventions {
        sign: SignConvention::CreditPositive,
        date: DateFormat::Pattern("%d-%m-%Y"),
        number,
        currency: None,
    }
}

/// German headers mean German number formatting.
fn number_format(cols: &Columns) -> NumberFormat {
    if cols.find(&["Datum", "Produkt"]).is_some() {
        NumberFormat::COMMA_DECIMAL
    } else {
        NumberFormat::DOT_DECIMAL
    }
}

pub struct DegiroAccountCsv;

impl StatementParser for DegiroAccountCsv {
    fn format(&self) -> &'static str {
        ACCOUNT_FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let text = first_text(doc, ACCOUNT_FORMAT)?;
        let mut records = csv_reader(&text).into_records();

        let header = records
            .next()
            .transpose()
            .map_err(|e| FetchError::unrecognized(format!("{ACCOUNT_FORMAT}: {e}"), &text))?
            .ok_or_else(|| FetchError::unrecognized(format!("{ACCOUNT_FORMAT}: empty export"), &text))?;
        let cols = Columns::from_record(&header);
        let date_col = cols.require(&["Datum", "Date"], ACCOUNT_FORMAT, &text)?;
        let desc_col = cols.require(&["Beschreibung", "Description"], ACCOUNT_FORMAT, &text)?;
        let change_col = cols.require(&["Änderung", "Change"], ACCOUNT_FORMAT, &text)?;
        let balance_col = cols.require(&["Saldo", "Balance"], ACCOUNT_FORMAT, &text)?;
        let product_col = cols.find(&["Produkt", "Product"]);

        let mut out = ParsedStatement::new(&doc.source, conventions(number_format(&cols)));
        out.account = doc.account.clone();
        out.period = doc.period;
        out.reference_date = Some(doc.reference_date());

        let mut seen_currencies = BTreeSet::new();
        let mut rows: Vec<ParsedRow> = Vec::new();

        for result in records {
            let record = result.map_err(|e| FetchError::unrecognized(format!("{ACCOUNT_FORMAT}: {e}"), &text))?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or_default();
            let date = field(&record, date_col);
            let description = field(&record, desc_col);
            let currency = field(&record, change_col);
            let amount = field(&record, change_col + 1);

            // A long description spills into the next row, which has no date.
            if date.is_empty() {
                if let Some(prev) = rows.last_mut() {
                    if !description.is_empty() {
                        prev.description.push(' ');
                        prev.description.push_str(description);
                    }
                    if prev.amount.is_empty() && !amount.is_empty() {
                        prev.amount = amount.to_string();
                        prev.currency = Some(currency.to_string());
                    }
                }
                continue;
            }

            // Newest first, so the first balance seen per currency is the closing one.
            let balance_currency = field(&record, balance_col);
            let balance_amount = field(&record, balance_col + 1);
            if !balance_currency.is_empty() && !balance_amount.is_empty() && seen_currencies.insert(balance_currency.to_string()) {
                out.balances.push(ParsedBalance {
                    line,
                    account: "cash".to_string(),
                    as_of: Some(date.to_string()),
                    amount: balance_amount.to_string(),
                    unit: BalanceUnit::Currency(balance_currency.to_string()),
                });
            }

            let product = product_col.map(|c| field(&record, c)).unwrap_or("");
            let label = if product.is_empty() {
                description.to_string()
            } else {
                format!("{product}: {description}")
            };
            let mut row = ParsedRow::new(line, date, amount, label);
            if !currency.is_empty() {
                row = row.currency(currency);
            }
            rows.push(row);
        }

        // Informational rows (FX quotes, order notes) carry no cash movement.
        out.rows = rows.into_iter().filter(|r| !r.amount.is_empty()).collect();
        Ok(out)
    }
}

pub struct DegiroPortfolioCsv;

impl StatementParser for DegiroPortfolioCsv {
    fn format(&self) -> &'static str {
        PORTFOLIO_FORMAT
    }

    fn parse(&self, doc: &RawDocument) -> Result<ParsedStatement, FetchError> {
        let text = first_text(doc, PORTFOLIO_FORMAT)?;
        let mut records = csv_reader(&text).into_records();

        let header = records
            .next()
            .transpose()
            .map_err(|e| FetchError::unrecognized(format!("{PORTFOLIO_FORMAT}: {e}"), &text))?
            .ok_or_else(|| FetchError::unrecognized(format!("{PORTFOLIO_FORMAT}: empty export"), &text))?;
        let cols = Columns::from_record(&header);
        let product_col = cols.require(&["Produkt", "Product"], PORTFOLIO_FORMAT, &text)?;
        let isin_col = cols.require(&["Symbol/ISIN"], PORTFOLIO_FORMAT, &text)?;
        let quantity_col = cols.require(&["Anzahl", "Quantity", "Amount"], PORTFOLIO_FORMAT, &text)?;
        let value_col = cols.require(&["Lokaler Wert", "Local value"], PORTFOLIO_FORMAT, &text)?;

        // A snapshot: no period, balances dated to the retrieval.
        let mut out = ParsedStatement::new(&doc.source, conventions(number_format(&cols)));
        out.account = doc.account.clone();
        out.reference_date = Some(doc.reference_date());

        for result in records {
            let record = result.map_err(|e| FetchError::unrecognized(format!("{PORTFOLIO_FORMAT}: {e}"), &text))?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or_default();
            let product = field(&record, product_col);
            if product.is_empty() {
                continue;
            }
            let isin = field(&record, isin_col);

            if isin.is_empty() {
                let currency = field(&record, value_col);
                let amount = field(&record, value_col + 1);
                if currency.is_empty() || amount.is_empty() {
                    continue;
                }
                out.balances.push(ParsedBalance {
                    line,
                    account: "cash".to_string(),
                    as_of: None,
                    amount: amount.to_string(),
                    unit: BalanceUnit::Currency(currency.to_string()),
                });
            } else {
                out.balances.push(ParsedBalance {
                    line,
                    account: product.to_string(),
                    as_of: None,
                    amount: field(&record, quantity_col).to_string(),
                    unit: BalanceUnit::Holding(isin.to_string()),
                });
            }
        }
        Ok(out)
    }
}
