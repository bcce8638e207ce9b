//! Failure taxonomy for the invoice relay.
//!
//! One enum per failure domain; `CycleError` is what a poll cycle surfaces
//! to `main`, with enough context (message id, stage) to diagnose a run
//! from the logs alone.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Startup configuration problems. Always fatal before any email is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("config {path} is not valid TOML: {source}")]
    Edit {
        path: PathBuf,
        source: toml_edit::TomlError,
    },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A `[formats]` entry is not a valid format description.
    #[error("invalid date format {name} = {value:?}: {source}")]
    DateFormat {
        name: &'static str,
        value: String,
        source: time::error::InvalidFormatDescription,
    },
}

/// Failures talking to the mail service. Transient from the pipeline's
/// point of view: nothing is committed, the next cycle retries.
#[derive(Error, Debug)]
pub enum MailError {
    #[error("gmail api call failed: {0}")]
    Api(#[from] google_gmail1::Error),

    #[error("mail call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures turning PDF bytes into text.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Image-only pages, no text operators. This pipeline has no OCR path.
    #[error("PDF appears to be scanned/image-only")]
    Scanned,
}

/// Failures producing an `Invoice` from an attachment. Extraction is
/// all-or-nothing: any of these means no invoice record exists.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error(transparent)]
    Pdf(#[from] PdfError),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("failed to normalize {field}: {value:?}")]
    Normalize { field: &'static str, value: String },
}

/// Failures persisting tracker state. A commit that cannot be durably
/// recorded must never be reported as success.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode processed ids: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to format watermark date: {0}")]
    Format(#[from] time::error::Format),
}

/// Failures driving the bookkeeping platform. The WebDriver session is not
/// transactional: any of these aborts the whole email, never a resume.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("webdriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webdriver protocol error: {0}")]
    Protocol(String),

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },
}

/// What one poll cycle can die of, tagged with the email it died on.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("mail fetch failed: {0}")]
    Mail(#[from] MailError),

    #[error("extraction failed for message {id}: {source}")]
    Extraction { id: String, source: ExtractionError },

    #[error("ledger submission failed for invoice {invoice_number} (message {id}): {source}")]
    Ledger {
        id: String,
        invoice_number: String,
        source: LedgerError,
    },

    #[error("failed to archive invoice {invoice_number}: {source}")]
    Archive {
        invoice_number: String,
        source: std::io::Error,
    },

    #[error("tracker commit failed for message {id}: {source}")]
    Commit { id: String, source: TrackerError },
}
