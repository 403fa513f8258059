//! Domain errors which abort the processing of a single document.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MenuError {
    /// The assembled menu list does not line up with the business days of the month.
    ///
    /// This is fixed by hand-writing the menu file of the document and running again.
    #[error("layout mismatch in {document}: days={days} menus={menus}")]
    LayoutMismatch {
        document: String,
        days: usize,
        menus: usize,
    },

    #[error("unexpected table structure in {document}: {message}")]
    Structure { document: String, message: String },

    #[error("document link does not look like <month>-<group>.pdf: {0}")]
    MalformedUrl(String),

    #[error("failed to extract a table from {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("calendar event uid is not <date>@<group>: {0}")]
    MalformedUid(String),
}

impl MenuError {
    pub fn structure(document: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structure {
            document: document.into(),
            message: message.into(),
        }
    }
}
