//! Raw PDF bytes to text.
//!
//! Structural check first: a page tree whose pages carry images but no
//! fonts is a scan, and scans cannot feed the pattern rules. Only then is
//! full text extraction attempted.

use lopdf::{Dictionary, Document};
use tracing::info;

use crate::error::PdfError;

/// Minimum non-whitespace characters expected from a real text PDF.
/// Below this the "text" is extractor noise and the document is a scan.
const MIN_TEXT_CHARS: usize = 30;

/// Fraction of image-only pages at which the whole document counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

pub fn extract_text(pdf_bytes: &[u8]) -> Result<String, PdfError> {
    let doc = Document::load_mem(pdf_bytes).map_err(|e| PdfError::Parse(e.to_string()))?;

    if looks_like_scanned(&doc) {
        return Err(PdfError::Scanned);
    }

    let text = pdf_extract::extract_text_from_mem(pdf_bytes)
        .map_err(|e| PdfError::TextExtraction(e.to_string()))?;

    let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
    if meaningful < MIN_TEXT_CHARS {
        info!(chars = meaningful, "Extracted text too short — treating as scanned");
        return Err(PdfError::Scanned);
    }

    info!(chars = meaningful, "Text extracted from PDF");
    Ok(text)
}

/// A page whose resources hold XObject images but no Font entries has no
/// text operators to extract from.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // can't tell, let text extraction try
    }

    let image_only = pages
        .values()
        .filter(|object_id| {
            let Ok(page) = doc
                .get_object(**object_id)
                .and_then(|obj| obj.as_dict())
            else {
                return false;
            };
            has_resource(doc, page, b"XObject") && !has_resource(doc, page, b"Font")
        })
        .count();

    let ratio = image_only as f64 / pages.len() as f64;
    info!(
        total_pages = pages.len(),
        image_only,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= SCANNED_PAGE_RATIO
}

fn has_resource(doc: &Document, page: &Dictionary, key: &[u8]) -> bool {
    page.get(b"Resources")
        .ok()
        .and_then(|res| doc.dereference(res).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .and_then(|res| res.get(key).ok())
        .and_then(|entry| doc.dereference(entry).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|dict| !dict.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_parse() {
        let result = extract_text(b"this is not a pdf");
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }
}
