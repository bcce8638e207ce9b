//! Durable record of which emails have already become ledger entries.
//!
//! Two flat files under the state directory: `watermark` holds the
//! calendar date of the newest committed email (used as a cheap `after:`
//! bound on the next mailbox search), `processed.json` holds the full set
//! of committed message ids. The id set is the de-dup authority: mail
//! timestamps are not strictly increasing and the date filter is only
//! day-granular.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use time::Date;
use time::macros::format_description;
use tracing::{info, warn};

use crate::error::TrackerError;
use crate::gmail::EmailMessage;

const WATERMARK_FILE: &str = "watermark";
const PROCESSED_FILE: &str = "processed.json";

pub struct Tracker {
    watermark: Option<Date>,
    processed: BTreeSet<String>,
    state_dir: PathBuf,
}

impl Tracker {
    /// Load prior state from the state directory. Missing or unreadable
    /// files mean "no prior state", never a failure: losing the tracker
    /// files only costs a broader mailbox search, FILTER still de-dups.
    pub fn load(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();

        let watermark_path = state_dir.join(WATERMARK_FILE);
        let watermark = match fs::read_to_string(&watermark_path) {
            Ok(raw) => {
                let fmt = format_description!("[year]-[month]-[day]");
                match Date::parse(raw.trim(), fmt) {
                    Ok(date) => Some(date),
                    Err(e) => {
                        warn!(path = %watermark_path.display(), error = %e, "Unreadable watermark — starting from none");
                        None
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %watermark_path.display(), error = %e, "Failed to read watermark — starting from none");
                None
            }
        };

        let processed_path = state_dir.join(PROCESSED_FILE);
        let processed: BTreeSet<String> = match fs::read_to_string(&processed_path) {
            Ok(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    warn!(path = %processed_path.display(), error = %e, "Corrupt processed-id file — starting empty");
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                warn!(path = %processed_path.display(), error = %e, "Failed to read processed ids — starting empty");
                BTreeSet::new()
            }
        };

        info!(
            watermark = ?watermark,
            processed = processed.len(),
            "Tracker state loaded"
        );

        Self {
            watermark,
            processed,
            state_dir,
        }
    }

    /// True iff this email has never been committed.
    pub fn is_new(&self, email_id: &str) -> bool {
        !self.processed.contains(email_id)
    }

    /// Lower bound (calendar date) for the next candidate fetch, if any
    /// email has ever been committed.
    pub fn watermark(&self) -> Option<Date> {
        self.watermark
    }

    /// Record an email as fully processed and persist before returning.
    /// Must be called exactly once per email, after its ledger entry and
    /// archive copy exist; a crash before this point leaves the email
    /// uncommitted and it is retried next cycle.
    pub fn commit(&mut self, email: &EmailMessage) -> Result<(), TrackerError> {
        self.processed.insert(email.id.clone());

        let date = email.date.date();
        if self.watermark.is_none_or(|current| date > current) {
            self.watermark = Some(date);
        }

        self.persist()?;
        info!(id = %email.id, watermark = ?self.watermark, "Email committed");
        Ok(())
    }

    fn persist(&self) -> Result<(), TrackerError> {
        fs::create_dir_all(&self.state_dir).map_err(|source| TrackerError::Write {
            path: self.state_dir.clone(),
            source,
        })?;

        let processed_path = self.state_dir.join(PROCESSED_FILE);
        let encoded = serde_json::to_string_pretty(&self.processed)?;
        fs::write(&processed_path, encoded).map_err(|source| TrackerError::Write {
            path: processed_path,
            source,
        })?;

        if let Some(watermark) = self.watermark {
            let fmt = format_description!("[year]-[month]-[day]");
            let watermark_path = self.state_dir.join(WATERMARK_FILE);
            fs::write(&watermark_path, watermark.format(fmt)?).map_err(|source| {
                TrackerError::Write {
                    path: watermark_path,
                    source,
                }
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn email(id: &str, date: time::OffsetDateTime) -> EmailMessage {
        EmailMessage {
            id: id.to_string(),
            thread_id: format!("thread-{id}"),
            subject: "Self bill invoice".to_string(),
            sender: "billing@agency.example".to_string(),
            recipient: "books@example.com".to_string(),
            date,
            body: None,
            attachment: b"%PDF".to_vec(),
        }
    }

    #[test]
    fn fresh_state_dir_yields_empty_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::load(dir.path());

        assert_eq!(tracker.watermark(), None);
        assert!(tracker.is_new("anything"));
    }

    #[test]
    fn commit_marks_processed_and_raises_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::load(dir.path());

        tracker
            .commit(&email("A", datetime!(2022-03-01 11:53:45 UTC)))
            .unwrap();
        tracker
            .commit(&email("B", datetime!(2022-03-02 09:00:00 UTC)))
            .unwrap();

        assert!(!tracker.is_new("A"));
        assert!(!tracker.is_new("B"));
        assert!(tracker.is_new("C"));
        assert_eq!(tracker.watermark(), Some(time::macros::date!(2022-03-02)));
    }

    #[test]
    fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();

        let mut tracker = Tracker::load(dir.path());
        tracker
            .commit(&email("A", datetime!(2022-03-01 11:53:45 UTC)))
            .unwrap();
        drop(tracker);

        let reloaded = Tracker::load(dir.path());
        assert!(!reloaded.is_new("A"));
        assert!(reloaded.is_new("B"));
        assert_eq!(reloaded.watermark(), Some(time::macros::date!(2022-03-01)));
    }

    #[test]
    fn watermark_never_decreases() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::load(dir.path());

        tracker
            .commit(&email("B", datetime!(2022-03-02 09:00:00 UTC)))
            .unwrap();
        tracker
            .commit(&email("A", datetime!(2022-03-01 11:53:45 UTC)))
            .unwrap();

        assert_eq!(tracker.watermark(), Some(time::macros::date!(2022-03-02)));
    }

    #[test]
    fn same_day_commit_keeps_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::load(dir.path());

        tracker
            .commit(&email("A", datetime!(2022-03-01 08:00:00 UTC)))
            .unwrap();
        tracker
            .commit(&email("B", datetime!(2022-03-01 17:00:00 UTC)))
            .unwrap();

        assert_eq!(tracker.watermark(), Some(time::macros::date!(2022-03-01)));
    }

    #[test]
    fn corrupt_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(WATERMARK_FILE), "not a date").unwrap();
        fs::write(dir.path().join(PROCESSED_FILE), "{ nope").unwrap();

        let tracker = Tracker::load(dir.path());
        assert_eq!(tracker.watermark(), None);
        assert!(tracker.is_new("A"));
    }

    #[test]
    fn on_disk_format_is_iso_date_and_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = Tracker::load(dir.path());

        tracker
            .commit(&email("B", datetime!(2022-03-02 09:00:00 UTC)))
            .unwrap();
        tracker
            .commit(&email("A", datetime!(2022-03-01 11:53:45 UTC)))
            .unwrap();
        // A second commit of the same id must not duplicate the entry.
        tracker
            .commit(&email("A", datetime!(2022-03-01 11:53:45 UTC)))
            .unwrap();

        let watermark = fs::read_to_string(dir.path().join(WATERMARK_FILE)).unwrap();
        assert_eq!(watermark, "2022-03-02");

        let raw = fs::read_to_string(dir.path().join(PROCESSED_FILE)).unwrap();
        let ids: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(ids, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn duplicated_ids_on_disk_collapse_on_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROCESSED_FILE), r#"["A", "A", "B"]"#).unwrap();

        let tracker = Tracker::load(dir.path());
        assert!(!tracker.is_new("A"));
        assert!(!tracker.is_new("B"));
        assert_eq!(tracker.processed.len(), 2);
    }
}
