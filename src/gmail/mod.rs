//! Mail collaborator: candidate invoice emails out of a Gmail mailbox.

mod hub;
mod message;
mod refresh;
mod token;

pub use hub::create_hub;
pub use message::EmailMessage;

use std::time::Duration;

use async_trait::async_trait;
use google_gmail1::Gmail;
use google_gmail1::api::Scope;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use time::Date;
use time::format_description::OwnedFormatItem;
use time::macros::format_description;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::GmailConfig;
use crate::error::MailError;
use crate::pipeline::MailSource;

pub type GmailHub = Gmail<HttpsConnector<HttpConnector>>;

/// Bound on every individual Gmail API call.
const CALL_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GmailMailbox {
    hub: GmailHub,
    user: String,
    sender: String,
    label: Option<String>,
    subject_contains: Option<String>,
    date_format: OwnedFormatItem,
}

impl GmailMailbox {
    pub fn new(hub: GmailHub, cfg: &GmailConfig, date_format: OwnedFormatItem) -> Self {
        Self {
            hub,
            user: cfg.user.clone(),
            sender: cfg.sender.clone(),
            label: cfg.label.clone(),
            subject_contains: cfg.subject_contains.clone(),
            date_format,
        }
    }

    fn query(&self, since: Option<Date>) -> String {
        build_query(&self.sender, self.label.as_deref(), since)
    }

    async fn list_ids(&self, query: &str) -> Result<Vec<String>, MailError> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .hub
                .users()
                .messages_list(&self.user)
                .q(query)
                .add_scope(Scope::Readonly);
            if let Some(token) = &page_token {
                req = req.page_token(token);
            }

            let (_, response) = timeout(CALL_TIMEOUT, req.doit())
                .await
                .map_err(|_| MailError::Timeout(CALL_TIMEOUT))??;

            ids.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| m.id),
            );

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(matches = ids.len(), "Message id listing complete");
        Ok(ids)
    }

    /// Fetch and materialize one candidate. `Ok(None)` means the message
    /// is not a usable invoice email (wrong subject, no PDF, bad date) and
    /// is dropped with a log line.
    async fn fetch_message(&self, id: &str) -> Result<Option<EmailMessage>, MailError> {
        let req = self
            .hub
            .users()
            .messages_get(&self.user, id)
            .add_scope(Scope::Readonly);
        let (_, raw) = timeout(CALL_TIMEOUT, req.doit())
            .await
            .map_err(|_| MailError::Timeout(CALL_TIMEOUT))??;

        let parts = match message::parse(&raw, &self.date_format) {
            Ok(parts) => parts,
            Err(reason) => {
                warn!(id = %id, reason = %reason, "Rejecting candidate message");
                return Ok(None);
            }
        };

        if let Some(marker) = &self.subject_contains {
            let snippet = raw.snippet.as_deref().unwrap_or_default();
            if !parts.subject.contains(marker) && !snippet.contains(marker) {
                info!(id = %id, subject = %parts.subject, "Not an invoice email — skipping");
                return Ok(None);
            }
        }

        let attachment = if let Some(data) = parts.inline_attachment {
            data
        } else if let Some(attachment_id) = &parts.attachment_id {
            info!(id = %id, attachment_id = %attachment_id, "Fetching attachment data");
            let req = self
                .hub
                .users()
                .messages_attachments_get(&self.user, id, attachment_id)
                .add_scope(Scope::Readonly);
            let (_, body) = timeout(CALL_TIMEOUT, req.doit())
                .await
                .map_err(|_| MailError::Timeout(CALL_TIMEOUT))??;
            match body.data {
                Some(data) => data,
                None => {
                    warn!(id = %id, attachment_id = %attachment_id, "Attachment carried no data — skipping");
                    return Ok(None);
                }
            }
        } else {
            warn!(id = %id, "No PDF attachment found — skipping");
            return Ok(None);
        };

        let email = EmailMessage {
            id: id.to_string(),
            thread_id: raw.thread_id.clone().unwrap_or_default(),
            subject: parts.subject,
            sender: parts.sender,
            recipient: parts.recipient,
            date: parts.date,
            body: parts.body,
            attachment,
        };
        info!(
            id = %email.id,
            thread = %email.thread_id,
            from = %email.sender,
            to = %email.recipient,
            subject = %email.subject,
            date = %email.date,
            has_body = email.body.is_some(),
            attachment_bytes = email.attachment.len(),
            "Candidate materialized"
        );
        Ok(Some(email))
    }
}

/// The Gmail search query for invoice candidates. `after:` is only a
/// cheap server-side narrowing: it is day-granular and inclusive, so
/// already-processed same-day messages still come back and are left to
/// the tracker's id filter.
fn build_query(sender: &str, label: Option<&str>, since: Option<Date>) -> String {
    let mut parts = vec![format!("from:{sender}"), "filename:pdf".to_string()];
    if let Some(label) = label {
        parts.push(format!("label:{label}"));
    }
    if let Some(date) = since {
        let fmt = format_description!("[year]/[month]/[day]");
        if let Ok(formatted) = date.format(fmt) {
            parts.push(format!("after:{formatted}"));
        }
    }
    parts.join(" AND ")
}

#[async_trait]
impl MailSource for GmailMailbox {
    async fn candidates(&self, since: Option<Date>) -> Result<Vec<EmailMessage>, MailError> {
        let query = self.query(since);
        info!(user = %self.user, query = %query, "Listing candidate messages");

        let ids = self.list_ids(&query).await?;

        let mut emails = Vec::new();
        for id in ids {
            if let Some(email) = self.fetch_message(&id).await? {
                emails.push(email);
            }
        }

        // the orchestrator needs oldest-first so watermark advancement
        // stays monotonic even when a cycle dies midway
        emails.sort_by_key(|email| email.date);

        info!(candidates = emails.len(), "Candidate fetch complete");
        Ok(emails)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_without_watermark_has_no_date_bound() {
        let query = build_query("billing@agency.example", Some("invoices"), None);
        assert_eq!(
            query,
            "from:billing@agency.example AND filename:pdf AND label:invoices"
        );
    }

    #[test]
    fn query_with_watermark_appends_after_filter() {
        let query = build_query(
            "billing@agency.example",
            None,
            Some(time::macros::date!(2022-03-02)),
        );
        assert_eq!(
            query,
            "from:billing@agency.example AND filename:pdf AND after:2022/03/02"
        );
    }
}
