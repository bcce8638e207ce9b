use serde::Deserialize;
use std::{fs, path::Path};
use time::format_description::{self, OwnedFormatItem};
use toml_edit::{DocumentMut, value};

use crate::error::ConfigError;

#[derive(Deserialize)]
pub struct Config {
    pub gmail: GmailConfig,
    pub formats: FormatConfig,
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Deserialize)]
pub struct GmailConfig {
    /// Mailbox address the candidate search runs against.
    pub user: String,
    /// Only messages from this sender are considered invoice candidates.
    pub sender: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Subject/snippet text that marks a message as an invoice email.
    #[serde(default)]
    pub subject_contains: Option<String>,
    pub oauth: OauthConfig,
}

#[derive(Deserialize)]
pub struct OauthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub refresh_token: String,
    pub access_token: String,
}

/// Date formats, in `time` format-description syntax. The PDF and the
/// ledger do not agree on a format, so neither is hard-coded.
#[derive(Deserialize)]
pub struct FormatConfig {
    /// Format of the mail Date header.
    pub mail_date: String,
    /// Format of dates embedded in the invoice PDF.
    pub pdf_date: String,
    /// Format the bookkeeping platform expects in its date inputs.
    pub ledger_date: String,
}

#[derive(Deserialize)]
pub struct LedgerConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// WebDriver endpoint driving the platform, e.g. a Selenium hub.
    pub webdriver_url: String,
    #[serde(default = "default_ledger_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ledger_timeout_secs() -> u64 {
    60
}

#[derive(Deserialize)]
pub struct StorageConfig {
    /// Where archived invoice PDFs land, one file per invoice number.
    #[serde(default = "default_invoice_dir")]
    pub invoice_dir: String,
    /// Where the tracker keeps its watermark and processed-id files.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_invoice_dir() -> String {
    "invoices".to_string()
}

fn default_state_dir() -> String {
    ".state".to_string()
}

#[derive(Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub on_extraction_error: ExtractionPolicy,
}

/// What to do when an attachment fails extraction. `Halt` is the default:
/// a malformed invoice stops the cycle rather than silently skipping money.
#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionPolicy {
    #[default]
    Halt,
    Skip,
}

/// The `[formats]` section compiled into reusable format items.
pub struct DateFormats {
    pub mail_date: OwnedFormatItem,
    pub pdf_date: OwnedFormatItem,
    pub ledger_date: OwnedFormatItem,
}

impl DateFormats {
    pub fn compile(formats: &FormatConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            mail_date: compile_format("mail_date", &formats.mail_date)?,
            pdf_date: compile_format("pdf_date", &formats.pdf_date)?,
            ledger_date: compile_format("ledger_date", &formats.ledger_date)?,
        })
    }
}

fn compile_format(name: &'static str, raw: &str) -> Result<OwnedFormatItem, ConfigError> {
    format_description::parse_owned::<2>(raw).map_err(|source| ConfigError::DateFormat {
        name,
        value: raw.to_string(),
        source,
    })
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn date_formats(&self) -> Result<DateFormats, ConfigError> {
        DateFormats::compile(&self.formats)
    }

    /// Rewrite only the access token in place, keeping the rest of the
    /// file (comments included) untouched.
    pub fn update_access_token(path: impl AsRef<Path>, new_token: &str) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut doc = content
            .parse::<DocumentMut>()
            .map_err(|source| ConfigError::Edit {
                path: path.to_path_buf(),
                source,
            })?;

        doc["gmail"]["oauth"]["access_token"] = value(new_token);

        fs::write(path, doc.to_string()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
