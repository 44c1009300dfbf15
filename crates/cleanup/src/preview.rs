//! Dry-run counts and message previews
//!
//! Counts are exact: every count drains the full enumeration, one list call
//! per 500 matches. That cost is paid before any destructive decision.

use log::debug;
use serde::Serialize;

use crate::error::{CleanupError, Result};
use crate::gmail::{display_date, header_value};
use crate::mailbox::Mailbox;
use crate::pages::MessagePages;

const SAMPLE_HEADERS: &[&str] = &["From", "Date", "Subject"];

/// Count messages matching `query`
pub fn count_messages<M: Mailbox + ?Sized>(mailbox: &M, query: &str) -> Result<usize> {
    let mut pages = MessagePages::with_limit(mailbox, query, 0);
    while pages.next_batch()?.is_some() {}
    debug!("Counted {} messages for '{}'", pages.yielded(), query);
    Ok(pages.yielded())
}

/// Total matches split by attachment presence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountSummary {
    pub total: usize,
    pub with_attachments: usize,
    pub without_attachments: usize,
}

/// Count `query`, `query has:attachment` and `query -has:attachment`
pub fn count_summary<M: Mailbox + ?Sized>(mailbox: &M, query: &str) -> Result<CountSummary> {
    Ok(CountSummary {
        total: count_messages(mailbox, query)?,
        with_attachments: count_messages(mailbox, &format!("{query} has:attachment"))?,
        without_attachments: count_messages(mailbox, &format!("{query} -has:attachment"))?,
    })
}

/// One preview row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRow {
    /// `%Y-%m-%d %H:%M:%S %z`, or the raw header when it does not parse
    pub date: String,
    pub from: String,
    pub subject: String,
}

/// Fetch date/from/subject for at most `limit` messages matching `query`
pub fn sample_messages<M: Mailbox + ?Sized>(
    mailbox: &M,
    query: &str,
    limit: usize,
) -> Result<Vec<SampleRow>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let mut rows = Vec::with_capacity(limit.min(100));
    for batch in MessagePages::with_limit(mailbox, query, limit) {
        for id in batch? {
            let message = mailbox
                .get_message_metadata(&id, SAMPLE_HEADERS)
                .map_err(CleanupError::Provider)?;
            rows.push(SampleRow {
                date: display_date(&header_value(&message, "Date")),
                from: header_value(&message, "From"),
                subject: header_value(&message, "Subject"),
            });
        }
    }
    Ok(rows)
}
