//! Turning raw Gmail API messages into candidate emails.

use google_gmail1::api::{Message, MessagePart, MessagePartHeader};
use time::format_description::OwnedFormatItem;
use time::{OffsetDateTime, PrimitiveDateTime};

/// One candidate source email, fully materialized. Immutable once built;
/// after processing only its id lives on, inside the tracker.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub date: OffsetDateTime,
    pub body: Option<String>,
    pub attachment: Vec<u8>,
}

/// Everything the MIME walk can pull out of a message before the
/// attachment bytes are fetched.
#[derive(Debug)]
pub(super) struct MessageParts {
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub date: OffsetDateTime,
    pub body: Option<String>,
    pub attachment_id: Option<String>,
    pub inline_attachment: Option<Vec<u8>>,
}

/// Pull headers, body and the PDF attachment reference out of a raw
/// message. `Err` carries a human-readable reason; the caller logs it and
/// drops the message; a malformed candidate is not a cycle failure.
pub(super) fn parse(msg: &Message, date_format: &OwnedFormatItem) -> Result<MessageParts, String> {
    let payload = msg.payload.as_ref().ok_or("message has no payload")?;
    let headers = payload.headers.as_deref().unwrap_or_default();

    let subject = header(headers, "Subject").ok_or("missing Subject header")?;
    let sender = header(headers, "From").ok_or("missing From header")?;
    let recipient = header(headers, "To").ok_or("missing To header")?;
    let raw_date = header(headers, "Date").ok_or("missing Date header")?;
    let date = parse_date(raw_date, date_format)
        .map_err(|e| format!("unparseable Date header {raw_date:?}: {e}"))?;

    let mut collected = Collected::default();
    collect_parts(payload, &mut collected);

    Ok(MessageParts {
        subject: subject.to_string(),
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        date,
        body: collected.body,
        attachment_id: collected.attachment_id,
        inline_attachment: collected.inline_attachment,
    })
}

#[derive(Default)]
struct Collected {
    body: Option<String>,
    attachment_id: Option<String>,
    inline_attachment: Option<Vec<u8>>,
}

fn collect_parts(part: &MessagePart, out: &mut Collected) {
    match part.mime_type.as_deref() {
        Some("text/plain") => {
            if out.body.is_none() {
                out.body = part
                    .body
                    .as_ref()
                    .and_then(|body| body.data.as_ref())
                    .map(|data| String::from_utf8_lossy(data).into_owned());
            }
        }
        Some("application/pdf") => {
            // first PDF part wins; small attachments arrive inline,
            // larger ones only as an attachment id to fetch separately
            if out.attachment_id.is_none() && out.inline_attachment.is_none() {
                if let Some(body) = &part.body {
                    if body.data.is_some() {
                        out.inline_attachment = body.data.clone();
                    } else {
                        out.attachment_id = body.attachment_id.clone();
                    }
                }
            }
        }
        Some(mime) if mime.starts_with("multipart/") => {
            for child in part.parts.as_deref().unwrap_or_default() {
                collect_parts(child, out);
            }
        }
        _ => {}
    }
}

/// Header lookup by name, case-insensitive as mail headers are.
fn header<'a>(headers: &'a [MessagePartHeader], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| {
            h.name
                .as_deref()
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| h.value.as_deref())
}

/// Parse a Date header with the configured format. Trailing comments like
/// `(GMT)` are stripped first; a format without an offset component is
/// read as UTC.
pub(super) fn parse_date(
    raw: &str,
    format: &OwnedFormatItem,
) -> Result<OffsetDateTime, time::error::Parse> {
    let trimmed = match raw.find(" (") {
        Some(pos) => &raw[..pos],
        None => raw,
    }
    .trim();

    match OffsetDateTime::parse(trimmed, format) {
        Ok(parsed) => Ok(parsed),
        Err(offset_err) => PrimitiveDateTime::parse(trimmed, format)
            .map(PrimitiveDateTime::assume_utc)
            .map_err(|_| offset_err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::MessagePartBody;
    use time::macros::datetime;

    const MAIL_DATE_FORMAT: &str = "[weekday repr:short], [day padding:none] [month repr:short] [year] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]";

    fn mail_format() -> OwnedFormatItem {
        time::format_description::parse_owned::<2>(MAIL_DATE_FORMAT).unwrap()
    }

    fn header_part(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    fn pdf_part(attachment_id: &str) -> MessagePart {
        MessagePart {
            mime_type: Some("application/pdf".to_string()),
            filename: Some("invoice.pdf".to_string()),
            body: Some(MessagePartBody {
                attachment_id: Some(attachment_id.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn sample_message() -> Message {
        Message {
            id: Some("msg-1".to_string()),
            thread_id: Some("thread-1".to_string()),
            payload: Some(MessagePart {
                mime_type: Some("multipart/mixed".to_string()),
                headers: Some(vec![
                    header_part("Date", "Tue, 8 Mar 2022 11:53:45 +0000 (GMT)"),
                    header_part("From", "billing@agency.example"),
                    header_part("To", "books@example.com"),
                    header_part("Subject", "Self bill invoice INV-0042"),
                ]),
                parts: Some(vec![
                    MessagePart {
                        mime_type: Some("text/plain".to_string()),
                        body: Some(MessagePartBody {
                            data: Some(b"Please find your invoice attached.".to_vec()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    pdf_part("att-1"),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn parses_headers_body_and_attachment_reference() {
        let parts = parse(&sample_message(), &mail_format()).unwrap();

        assert_eq!(parts.subject, "Self bill invoice INV-0042");
        assert_eq!(parts.sender, "billing@agency.example");
        assert_eq!(parts.recipient, "books@example.com");
        assert_eq!(parts.date, datetime!(2022-03-08 11:53:45 UTC));
        assert_eq!(
            parts.body.as_deref(),
            Some("Please find your invoice attached.")
        );
        assert_eq!(parts.attachment_id.as_deref(), Some("att-1"));
        assert!(parts.inline_attachment.is_none());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let headers = vec![header_part("Date", "Tue, 8 Mar 2022 11:53:45 +0000")];
        assert!(header(&headers, "date").is_some());
        assert!(header(&headers, "DATE").is_some());
        assert!(header(&headers, "dates").is_none());
    }

    #[test]
    fn single_pdf_payload_part_is_found() {
        let msg = Message {
            payload: Some(MessagePart {
                mime_type: Some("multipart/mixed".to_string()),
                headers: Some(vec![
                    header_part("Date", "Tue, 8 Mar 2022 11:53:45 +0000"),
                    header_part("From", "billing@agency.example"),
                    header_part("To", "books@example.com"),
                    header_part("Subject", "invoice"),
                ]),
                parts: Some(vec![pdf_part("the-attachment-id")]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let parts = parse(&msg, &mail_format()).unwrap();
        assert_eq!(parts.attachment_id.as_deref(), Some("the-attachment-id"));
    }

    #[test]
    fn unparseable_date_rejects_the_message() {
        let mut msg = sample_message();
        msg.payload.as_mut().unwrap().headers = Some(vec![
            header_part("Date", "sometime last week"),
            header_part("From", "billing@agency.example"),
            header_part("To", "books@example.com"),
            header_part("Subject", "invoice"),
        ]);

        let err = parse(&msg, &mail_format()).unwrap_err();
        assert!(err.contains("unparseable Date header"));
    }

    #[test]
    fn date_comment_suffix_is_tolerated() {
        let with_comment =
            parse_date("Tue, 8 Mar 2022 11:53:45 +0000 (GMT)", &mail_format()).unwrap();
        let without = parse_date("Tue, 8 Mar 2022 11:53:45 +0000", &mail_format()).unwrap();
        assert_eq!(with_comment, without);
    }
}
