//! Coop digital receipts, mailed as PDF attachments.

use fetcher_core::{MediaType, Period};

use super::{pattern, Toolkit};
use crate::pipeline::LocatorPlan;
use crate::session::{GmailSessionFactory, Locator, MailQuery, SessionFactory};
use crate::settings::Settings;

const SUBJECT: &str = "Ihr digitaler Kassenzettel";

pub(super) fn factory(settings: &Settings, toolkit: &Toolkit) -> Box<dyn SessionFactory> {
    Box::new(GmailSessionFactory::new(
        toolkit.http.clone(),
        settings.mail.api_base.clone(),
        toolkit.extractor.clone(),
    ))
}

/// Gmail's `before:` is exclusive, so the day after the period end.
pub(super) fn search(period: &Period) -> String {
    let before = period.end.succ_opt().unwrap_or(period.end);
    format!(
        "subject:\"{SUBJECT}\" after:{} before:{}",
        period.start.format("%Y/%m/%d"),
        before.format("%Y/%m/%d")
    )
}

pub(super) fn plan() -> LocatorPlan {
    Box::new(|period| {
        Ok(Locator::Mail(MailQuery {
            query: search(period),
            filename: pattern(r"(?i)\.pdf$")?,
            media: MediaType::Pdf,
            extract_text: true,
        }))
    })
}
