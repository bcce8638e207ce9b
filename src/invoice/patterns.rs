//! Pattern rules for the agency's self-bill invoice layout.
//!
//! One named rule per field, applied in a fixed order with the first match
//! taken. `(?s)` so `.` spans the line breaks the PDF text extraction
//! scatters through the layout. Every rule must match or extraction of
//! the whole document fails with the name of the missing field.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ExtractionError;

const DATE: &str = r"[0-3]?[0-9]/[0-3]?[0-9]/(?:[0-9]{2})?[0-9]{2}";
const MONEY: &str = r"\d{0,3}[,]?\d{0,6}.\d{2}";

lazy_static! {
    static ref CLIENT_NAME: Regex =
        Regex::new(r"(?s)SELF BILL INVOICE\n\n([A-Za-z ]+)").unwrap();
    static ref GROSS_VALUE: Regex = Regex::new(&format!(r"(?s)Gross.({MONEY})")).unwrap();
    static ref HOUR_RATE: Regex =
        Regex::new(r"(?s)STD..(\d+.\d{2})..SELF BILL INVOICE Number").unwrap();
    static ref HOURS_WORKED: Regex = Regex::new(r"(?s).(\d{0,2}:\d{2}).hrs").unwrap();
    static ref INVOICE_DATE: Regex = Regex::new(&format!(r"(?s)Date:.({DATE})")).unwrap();
    static ref INVOICE_NUMBER: Regex =
        Regex::new(r"(?s)SELF BILL INVOICE Number: (\w+-\w+)").unwrap();
    static ref NET_VALUE: Regex = Regex::new(&format!(r"(?s)Net.({MONEY})")).unwrap();
    static ref PAYMENT_DUE_DATE: Regex =
        Regex::new(&format!(r"(?s)Amount is due by ({DATE})")).unwrap();
    static ref TIMESHEET_ID: Regex = Regex::new(r"(?s)Sheet:.(TS_\d+)").unwrap();
    static ref VAT_RATE: Regex = Regex::new(&format!(r"(?s)Rate.({MONEY})")).unwrap();
    static ref VAT_VALUE: Regex = Regex::new(&format!(r"(?s)VAT.({MONEY})")).unwrap();
}

/// Run every rule against the extracted text. Returns the captured raw
/// value per field, or the first field whose rule found nothing.
pub(super) fn capture_fields(
    text: &str,
) -> Result<HashMap<&'static str, String>, ExtractionError> {
    let rules: [(&'static str, &Regex); 11] = [
        ("client_name", &CLIENT_NAME),
        ("gross_value", &GROSS_VALUE),
        ("hour_rate", &HOUR_RATE),
        ("hours_worked", &HOURS_WORKED),
        ("invoice_date", &INVOICE_DATE),
        ("invoice_number", &INVOICE_NUMBER),
        ("net_value", &NET_VALUE),
        ("payment_due_date", &PAYMENT_DUE_DATE),
        ("timesheet_id", &TIMESHEET_ID),
        ("vat_rate", &VAT_RATE),
        ("vat_value", &VAT_VALUE),
    ];

    let mut fields = HashMap::with_capacity(rules.len());
    for (name, rule) in rules {
        let caps = rule
            .captures(text)
            .ok_or(ExtractionError::MissingField(name))?;
        fields.insert(name, caps[1].trim().to_string());
    }
    Ok(fields)
}
