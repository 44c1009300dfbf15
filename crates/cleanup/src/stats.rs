//! Sender statistics over a bounded scan

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{CleanupError, Result};
use crate::gmail::{format_display_date, header_value, parse_header_date};
use crate::mailbox::Mailbox;
use crate::pages::MessagePages;

/// Sender counts and date range over the first `scanned` matches
#[derive(Debug, Clone, Default)]
pub struct SenderStats {
    pub scanned: usize,
    senders: HashMap<String, usize>,
    oldest: Option<DateTime<FixedOffset>>,
    newest: Option<DateTime<FixedOffset>>,
}

/// A sender and how many scanned messages it sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderCount {
    pub sender: String,
    pub count: usize,
}

impl SenderStats {
    fn record(&mut self, from: String, date: Option<DateTime<FixedOffset>>) {
        self.scanned += 1;
        if !from.is_empty() {
            *self.senders.entry(from).or_default() += 1;
        }
        if let Some(date) = date {
            if self.oldest.is_none_or(|o| date < o) {
                self.oldest = Some(date);
            }
            if self.newest.is_none_or(|n| date > n) {
                self.newest = Some(date);
            }
        }
    }

    /// Number of distinct senders
    pub fn distinct_senders(&self) -> usize {
        self.senders.len()
    }

    /// Most frequent senders, ties broken alphabetically
    pub fn top(&self, n: usize) -> Vec<SenderCount> {
        let mut counts: Vec<SenderCount> = self
            .senders
            .iter()
            .map(|(sender, count)| SenderCount {
                sender: sender.clone(),
                count: *count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));
        counts.truncate(n);
        counts
    }

    /// Oldest parseable `Date` header, formatted for display
    pub fn oldest(&self) -> Option<String> {
        self.oldest.as_ref().map(format_display_date)
    }

    /// Newest parseable `Date` header, formatted for display
    pub fn newest(&self) -> Option<String> {
        self.newest.as_ref().map(format_display_date)
    }
}

/// Scan up to `scan_limit` messages and tally their senders
pub fn collect_sender_stats<M: Mailbox + ?Sized>(
    mailbox: &M,
    query: &str,
    scan_limit: usize,
) -> Result<SenderStats> {
    let mut stats = SenderStats::default();
    for batch in MessagePages::with_limit(mailbox, query, scan_limit) {
        for id in batch? {
            let message = mailbox
                .get_message_metadata(&id, &["From", "Date"])
                .map_err(CleanupError::Provider)?;
            stats.record(
                header_value(&message, "From"),
                parse_header_date(&header_value(&message, "Date")),
            );
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{InMemoryMailbox, SeedMessage};

    #[test]
    fn test_counts_and_date_range() {
        let mb = InMemoryMailbox::with_messages([
            SeedMessage::new("1")
                .from("a@example.com")
                .date("Mon, 01 Jan 2024 10:00:00 +0000"),
            SeedMessage::new("2")
                .from("b@example.com")
                .date("Wed, 03 Jan 2024 10:00:00 +0000"),
            SeedMessage::new("3").from("a@example.com").date("garbage"),
            SeedMessage::new("4"),
        ]);

        let stats = collect_sender_stats(&mb, "", 500).unwrap();
        assert_eq!(stats.scanned, 4);
        assert_eq!(stats.distinct_senders(), 2);
        assert_eq!(
            stats.top(1),
            vec![SenderCount {
                sender: "a@example.com".to_string(),
                count: 2,
            }]
        );
        assert_eq!(stats.oldest().as_deref(), Some("2024-01-01 10:00:00 +0000"));
        assert_eq!(stats.newest().as_deref(), Some("2024-01-03 10:00:00 +0000"));
    }

    #[test]
    fn test_scan_limit() {
        let mb = InMemoryMailbox::with_messages(
            (0..5).map(|i| SeedMessage::new(i.to_string()).from("x@example.com")),
        );
        let stats = collect_sender_stats(&mb, "", 3).unwrap();
        assert_eq!(stats.scanned, 3);
        assert!(stats.oldest().is_none());
    }
}
