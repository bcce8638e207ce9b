//! One poll cycle: fetch candidates, drive each new email through
//! extraction, ledger entry, archival and tracker commit, strictly
//! oldest first and one at a time.
//!
//! Commit ordering is the correctness core: an email is committed only
//! after its ledger entry and archive copy exist, so a crash anywhere
//! loses at most the in-flight email and the next cycle retries it.

use std::path::Path;

use async_trait::async_trait;
use time::Date;
use tracing::{info, warn};

use crate::config::ExtractionPolicy;
use crate::error::{CycleError, LedgerError, MailError};
use crate::gmail::EmailMessage;
use crate::invoice::{ExtractInvoice, Invoice};
use crate::tracker::Tracker;

/// Source of candidate invoice emails.
#[async_trait]
pub trait MailSource {
    /// Candidate emails, ascending by timestamp, optionally bounded below
    /// by a calendar date. Ascending order is required: the watermark
    /// only ever advances, so a mid-cycle abort must leave no older email
    /// beyond it.
    async fn candidates(&self, since: Option<Date>) -> Result<Vec<EmailMessage>, MailError>;
}

/// Sink for finished invoice records. Opaque submit-or-fail; partial
/// submissions are the implementation's problem to avoid, never to resume.
#[async_trait]
pub trait LedgerSink {
    async fn submit(&mut self, invoice: &Invoice) -> Result<(), LedgerError>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub skipped: usize,
    pub processed: usize,
}

pub async fn run_cycle<M, X, L>(
    mail: &M,
    extractor: &X,
    ledger: &mut L,
    tracker: &mut Tracker,
    invoice_dir: &Path,
    policy: ExtractionPolicy,
) -> Result<CycleReport, CycleError>
where
    M: MailSource,
    X: ExtractInvoice,
    L: LedgerSink,
{
    let mut report = CycleReport::default();

    let candidates = mail.candidates(tracker.watermark()).await?;
    report.fetched = candidates.len();
    info!(
        candidates = candidates.len(),
        watermark = ?tracker.watermark(),
        "Poll cycle started"
    );

    for email in &candidates {
        if !tracker.is_new(&email.id) {
            info!(id = %email.id, "Already processed — skipping");
            report.skipped += 1;
            continue;
        }

        let invoice = match extractor.extract(&email.attachment) {
            Ok(invoice) => invoice,
            Err(source) => match policy {
                ExtractionPolicy::Halt => {
                    return Err(CycleError::Extraction {
                        id: email.id.clone(),
                        source,
                    });
                }
                ExtractionPolicy::Skip => {
                    warn!(id = %email.id, error = %source, "Extraction failed — leaving for a later cycle");
                    report.skipped += 1;
                    continue;
                }
            },
        };

        ledger
            .submit(&invoice)
            .await
            .map_err(|source| CycleError::Ledger {
                id: email.id.clone(),
                invoice_number: invoice.invoice_number.clone(),
                source,
            })?;

        let archived = invoice
            .archive(invoice_dir)
            .map_err(|source| CycleError::Archive {
                invoice_number: invoice.invoice_number.clone(),
                source,
            })?;

        tracker.commit(email).map_err(|source| CycleError::Commit {
            id: email.id.clone(),
            source,
        })?;

        info!(
            id = %email.id,
            invoice_number = %invoice.invoice_number,
            archived = %archived.display(),
            "Invoice processed"
        );
        report.processed += 1;
    }

    Ok(report)
}
