//! Sources read from statement exports saved to a local folder.

use std::path::PathBuf;

use fetcher_core::MediaType;

use super::{pattern, Toolkit};
use crate::pipeline::LocatorPlan;
use crate::session::{FileQuery, FolderSessionFactory, Locator, SessionFactory};

pub(super) fn factory(dir: Option<PathBuf>, toolkit: &Toolkit) -> Box<dyn SessionFactory> {
    Box::new(FolderSessionFactory::new(dir, toolkit.extractor.clone()))
}

pub(super) fn amex_plan() -> LocatorPlan {
    Box::new(|_| {
        Ok(Locator::Files(FileQuery {
            pattern: pattern(r"(?i)\.csv$")?,
            media: MediaType::Csv,
            extract_text: false,
        }))
    })
}

/// Newest PDF statement, converted to text.
pub(super) fn pdf_plan() -> LocatorPlan {
    Box::new(|_| {
        Ok(Locator::Files(FileQuery {
            pattern: pattern(r"(?i)\.pdf$")?,
            media: MediaType::Pdf,
            extract_text: true,
        }))
    })
}
