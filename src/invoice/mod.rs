//! The invoice record and its extraction from PDF attachments.

mod patterns;
mod pdf;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::Date;
use tracing::info;

use crate::config::DateFormats;
use crate::error::ExtractionError;

/// One extracted invoice, ready for ledger entry. Only ever constructed
/// whole: if any field cannot be extracted or normalized, no `Invoice`
/// exists at all.
#[derive(Clone)]
pub struct Invoice {
    pub raw_pdf: Vec<u8>,
    pub client_name: String,
    /// Monetary values stay decimal strings, exactly as printed in the PDF.
    pub gross_value: String,
    pub hour_rate: String,
    /// Decimal hours, normalized from the PDF's `H:MM`.
    pub hours_worked: f64,
    /// Reformatted into the ledger's date format.
    pub invoice_date: String,
    pub invoice_number: String,
    pub net_value: String,
    pub payment_due_date: String,
    pub timesheet_id: String,
    /// Integer percent.
    pub vat_rate: u32,
    pub vat_value: String,
}

/// Seam between the pipeline and whatever turns attachment bytes into
/// invoice records.
pub trait ExtractInvoice {
    fn extract(&self, raw: &[u8]) -> Result<Invoice, ExtractionError>;
}

/// The production extractor: PDF text extraction plus the fixed pattern
/// rule set, with the configured date formats for normalization.
pub struct PatternExtractor {
    formats: DateFormats,
}

impl PatternExtractor {
    pub fn new(formats: DateFormats) -> Self {
        Self { formats }
    }
}

impl ExtractInvoice for PatternExtractor {
    fn extract(&self, raw: &[u8]) -> Result<Invoice, ExtractionError> {
        let text = pdf::extract_text(raw)?;
        Invoice::from_text(raw, &text, &self.formats)
    }
}

impl Invoice {
    fn from_text(raw: &[u8], text: &str, formats: &DateFormats) -> Result<Self, ExtractionError> {
        let mut fields = patterns::capture_fields(text)?;
        // capture_fields either filled every name or returned an error
        let mut take =
            |name: &'static str| fields.remove(name).expect("rule table covers every field");

        let hours_worked = decimal_hours(take("hours_worked"))?;
        let vat_rate = integer_rate(take("vat_rate"))?;
        let invoice_date = reformat_date("invoice_date", take("invoice_date"), formats)?;
        let payment_due_date =
            reformat_date("payment_due_date", take("payment_due_date"), formats)?;

        Ok(Self {
            raw_pdf: raw.to_vec(),
            client_name: take("client_name"),
            gross_value: take("gross_value"),
            hour_rate: take("hour_rate"),
            hours_worked,
            invoice_date,
            invoice_number: take("invoice_number"),
            net_value: take("net_value"),
            payment_due_date,
            timesheet_id: take("timesheet_id"),
            vat_rate,
            vat_value: take("vat_value"),
        })
    }

    /// Decimal-hours quantity as the ledger form expects it typed.
    pub fn hours_label(&self) -> String {
        format!("{}", self.hours_worked)
    }

    /// Free-text rendering of every field, one `Label: value` per line.
    /// Goes verbatim into the ledger entry's internal note, so the entry
    /// documents exactly what was extracted.
    pub fn internal_note(&self) -> String {
        [
            ("Client Name", self.client_name.clone()),
            ("Gross Value", self.gross_value.clone()),
            ("Hour Rate", self.hour_rate.clone()),
            ("Hours Worked", self.hours_label()),
            ("Invoice Date", self.invoice_date.clone()),
            ("Invoice Number", self.invoice_number.clone()),
            ("Net Value", self.net_value.clone()),
            ("Payment Due Date", self.payment_due_date.clone()),
            ("Timesheet Id", self.timesheet_id.clone()),
            ("Vat Rate", self.vat_rate.to_string()),
            ("Vat Value", self.vat_value.clone()),
        ]
        .iter()
        .map(|(label, value)| format!("{label}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
    }

    /// Keep a durable copy of the original PDF, keyed by invoice number.
    pub fn archive(&self, dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("invoice-{}.pdf", self.invoice_number));
        fs::write(&path, &self.raw_pdf)?;
        info!(path = %path.display(), "Invoice archived");
        Ok(path)
    }
}

impl fmt::Debug for Invoice {
    // raw_pdf is megabytes of bytes; keep it out of logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoice")
            .field("client_name", &self.client_name)
            .field("gross_value", &self.gross_value)
            .field("hour_rate", &self.hour_rate)
            .field("hours_worked", &self.hours_worked)
            .field("invoice_date", &self.invoice_date)
            .field("invoice_number", &self.invoice_number)
            .field("net_value", &self.net_value)
            .field("payment_due_date", &self.payment_due_date)
            .field("timesheet_id", &self.timesheet_id)
            .field("vat_rate", &self.vat_rate)
            .field("vat_value", &self.vat_value)
            .field("raw_pdf_len", &self.raw_pdf.len())
            .finish()
    }
}

/// `"7:30"` is seven and a half hours, not 7.30.
fn decimal_hours(raw: String) -> Result<f64, ExtractionError> {
    let normalize_err = || ExtractionError::Normalize {
        field: "hours_worked",
        value: raw.clone(),
    };

    let (hours, minutes) = raw.split_once(':').ok_or_else(normalize_err)?;
    let hours: f64 = hours.parse().map_err(|_| normalize_err())?;
    let minutes: f64 = minutes.parse().map_err(|_| normalize_err())?;
    if minutes >= 60.0 {
        return Err(normalize_err());
    }
    Ok(hours + minutes / 60.0)
}

/// The ledger's VAT dropdown wants whole percents: `"20.00"` → `20`.
fn integer_rate(raw: String) -> Result<u32, ExtractionError> {
    let value: f64 = raw
        .replace(',', "")
        .parse()
        .map_err(|_| ExtractionError::Normalize {
            field: "vat_rate",
            value: raw.clone(),
        })?;
    Ok(value as u32)
}

fn reformat_date(
    field: &'static str,
    raw: String,
    formats: &DateFormats,
) -> Result<String, ExtractionError> {
    let normalize_err = || ExtractionError::Normalize {
        field,
        value: raw.clone(),
    };

    let date = Date::parse(&raw, &formats.pdf_date).map_err(|_| normalize_err())?;
    date.format(&formats.ledger_date).map_err(|_| normalize_err())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatConfig;
    use crate::error::PdfError;

    const SAMPLE_TEXT: &str = "SELF BILL INVOICE\n\n\
        Acme Contracting Limited\n\
        42 Example Street\nLondon\n\n\
        Timesheet details\n\
        Sheet: TS_4221 Period ending 27/02/2022\n\
        STD  45.00  SELF BILL INVOICE Number: INV-0042\n\
        Worked 7:30 hrs this period\n\
        Date: 01/03/2022\n\n\
        Rate 20.00\n\
        Net 337.50\n\
        VAT 67.50\n\
        Gross 405.00\n\n\
        Amount is due by 31/03/2022\n";

    fn formats() -> DateFormats {
        DateFormats::compile(&FormatConfig {
            mail_date: "[day]/[month]/[year]".to_string(),
            pdf_date: "[day]/[month]/[year]".to_string(),
            ledger_date: "[year]-[month]-[day]".to_string(),
        })
        .unwrap()
    }

    fn sample_invoice() -> Invoice {
        Invoice::from_text(b"%PDF-raw", SAMPLE_TEXT, &formats()).unwrap()
    }

    #[test]
    fn every_field_extracts_from_sample() {
        let invoice = sample_invoice();

        assert_eq!(invoice.client_name, "Acme Contracting Limited");
        assert_eq!(invoice.gross_value, "405.00");
        assert_eq!(invoice.hour_rate, "45.00");
        assert_eq!(invoice.hours_worked, 7.5);
        assert_eq!(invoice.invoice_date, "2022-03-01");
        assert_eq!(invoice.invoice_number, "INV-0042");
        assert_eq!(invoice.net_value, "337.50");
        assert_eq!(invoice.payment_due_date, "2022-03-31");
        assert_eq!(invoice.timesheet_id, "TS_4221");
        assert_eq!(invoice.vat_rate, 20);
        assert_eq!(invoice.vat_value, "67.50");
        assert_eq!(invoice.raw_pdf, b"%PDF-raw");
    }

    #[test]
    fn one_missing_field_fails_the_whole_extraction() {
        let text = SAMPLE_TEXT.replace("Sheet: TS_4221", "Sheet: unreadable");
        let err = Invoice::from_text(b"%PDF-raw", &text, &formats()).unwrap_err();
        assert!(matches!(err, ExtractionError::MissingField("timesheet_id")));
    }

    #[test]
    fn duration_normalizes_to_decimal_hours() {
        assert_eq!(decimal_hours("7:30".to_string()).unwrap(), 7.5);
        assert_eq!(decimal_hours("40:00".to_string()).unwrap(), 40.0);
        assert_eq!(decimal_hours("0:45".to_string()).unwrap(), 0.75);
        assert!(decimal_hours("730".to_string()).is_err());
        assert!(decimal_hours("7:99".to_string()).is_err());
    }

    #[test]
    fn rate_string_normalizes_to_integer_percent() {
        assert_eq!(integer_rate("20.00".to_string()).unwrap(), 20);
        assert_eq!(integer_rate("5.00".to_string()).unwrap(), 5);
        assert!(integer_rate("abc".to_string()).is_err());
    }

    #[test]
    fn dates_are_reformatted_for_the_ledger() {
        let invoice = sample_invoice();
        assert_eq!(invoice.invoice_date, "2022-03-01");
        assert_eq!(invoice.payment_due_date, "2022-03-31");

        // Matches the date pattern but is not a real calendar date.
        let text = SAMPLE_TEXT.replace("Date: 01/03/2022", "Date: 31/02/2022");
        let err = Invoice::from_text(b"%PDF-raw", &text, &formats()).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::Normalize {
                field: "invoice_date",
                ..
            }
        ));
    }

    #[test]
    fn internal_note_lists_every_field() {
        let note = sample_invoice().internal_note();
        assert_eq!(
            note,
            "Client Name: Acme Contracting Limited\n\
             Gross Value: 405.00\n\
             Hour Rate: 45.00\n\
             Hours Worked: 7.5\n\
             Invoice Date: 2022-03-01\n\
             Invoice Number: INV-0042\n\
             Net Value: 337.50\n\
             Payment Due Date: 2022-03-31\n\
             Timesheet Id: TS_4221\n\
             Vat Rate: 20\n\
             Vat Value: 67.50"
        );
    }

    #[test]
    fn archive_writes_pdf_named_by_invoice_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_invoice().archive(dir.path()).unwrap();

        assert_eq!(path, dir.path().join("invoice-INV-0042.pdf"));
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-raw");
    }

    #[test]
    fn garbage_attachment_is_a_pdf_error() {
        let extractor = PatternExtractor::new(formats());
        let err = extractor.extract(b"this is not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(PdfError::Parse(_))));
    }
}
