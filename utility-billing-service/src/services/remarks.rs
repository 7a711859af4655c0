//! Append-only staff remarks attached to a ticket.

use crate::models::RemarkEntry;
use chrono::{DateTime, Utc};

pub struct RemarksAuditLog;

impl RemarksAuditLog {
    /// Returns `history` with one more entry numbered `len + 1`. Existing
    /// entries are carried over untouched.
    pub fn append(
        history: &[RemarkEntry],
        author: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Vec<RemarkEntry> {
        let mut next = Vec::with_capacity(history.len() + 1);
        next.extend_from_slice(history);
        next.push(RemarkEntry {
            sequence: history.len() as u32 + 1,
            author: author.to_string(),
            text: text.to_string(),
            timestamp: now,
        });
        next
    }

    /// Sequence numbers run 1..=len in order.
    pub fn is_contiguous(history: &[RemarkEntry]) -> bool {
        history
            .iter()
            .enumerate()
            .all(|(i, entry)| entry.sequence as usize == i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_append_numbers_entries_in_order() {
        let start = Utc::now();
        let mut history = Vec::new();
        for (i, text) in ["first", "second", "third"].iter().enumerate() {
            history = RemarksAuditLog::append(&history, "Ana", text, start + Duration::seconds(i as i64));
        }

        assert_eq!(history.len(), 3);
        assert_eq!(
            history.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(history[2].text, "third");
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(RemarksAuditLog::is_contiguous(&history));
    }

    #[test]
    fn test_append_leaves_input_untouched() {
        let history = RemarksAuditLog::append(&[], "Ana", "first", Utc::now());
        let next = RemarksAuditLog::append(&history, "Ben", "second", Utc::now());

        assert_eq!(history.len(), 1);
        assert_eq!(next[0], history[0]);
        assert_eq!(next[1].author, "Ben");
    }
}
