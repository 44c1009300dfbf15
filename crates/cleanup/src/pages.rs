//! Capped, cursor-based enumeration of message IDs
//!
//! [`MessagePages`] hides Gmail's `pageToken` mechanics behind a pull-based
//! cursor. Each call to [`MessagePages::next_page`] issues at most one list
//! request and yields a non-empty batch of IDs. An overall `limit` caps the
//! cumulative number of IDs; the last batch is truncated so the cap is never
//! exceeded.
//!
//! Nothing is retried. A provider error is returned to the caller and ends the
//! enumeration. To start over, build a new cursor; the query is reissued from
//! the first page.

use log::debug;

use crate::error::{CleanupError, Result};
use crate::mailbox::Mailbox;

/// Provider cap on `maxResults` for a single list request
pub const MAX_PAGE_SIZE: usize = 500;

/// One batch of message IDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePage {
    /// Never empty
    pub ids: Vec<String>,
    /// Continuation token reported with this batch, `None` once exhausted
    pub next_page_token: Option<String>,
}

/// Pull-based cursor over the IDs matching a query
pub struct MessagePages<'a, M: Mailbox + ?Sized> {
    mailbox: &'a M,
    query: String,
    page_size: usize,
    limit: usize,
    yielded: usize,
    page_token: Option<String>,
    finished: bool,
}

impl<'a, M: Mailbox + ?Sized> MessagePages<'a, M> {
    /// Enumerate IDs matching `query`
    ///
    /// `page_size` is clamped to `1..=500`. A `limit` of 0 means unbounded.
    pub fn new(mailbox: &'a M, query: impl AsRef<str>, page_size: usize, limit: usize) -> Self {
        Self {
            mailbox,
            query: query.as_ref().to_string(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            limit,
            yielded: 0,
            page_token: None,
            finished: false,
        }
    }

    /// Enumerate with the provider's maximum page size
    pub fn with_limit(mailbox: &'a M, query: impl AsRef<str>, limit: usize) -> Self {
        Self::new(mailbox, query, MAX_PAGE_SIZE, limit)
    }

    /// IDs yielded so far
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    fn remaining(&self) -> Option<usize> {
        (self.limit > 0).then(|| self.limit.saturating_sub(self.yielded))
    }

    /// Fetch the next batch, or `None` when enumeration is complete
    pub fn next_page(&mut self) -> Result<Option<MessagePage>> {
        if self.finished {
            return Ok(None);
        }

        let request_size = match self.remaining() {
            Some(0) => {
                self.finished = true;
                return Ok(None);
            }
            Some(remaining) => self.page_size.min(remaining),
            None => self.page_size,
        };

        let response = match self.mailbox.list_message_ids(
            &self.query,
            request_size,
            self.page_token.as_deref(),
        ) {
            Ok(response) => response,
            Err(e) => {
                self.finished = true;
                return Err(CleanupError::Provider(e));
            }
        };

        let mut ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .collect();

        self.page_token = response.next_page_token;
        if self.page_token.is_none() || ids.is_empty() {
            self.finished = true;
        }
        if ids.is_empty() {
            return Ok(None);
        }

        if let Some(remaining) = self.remaining() {
            ids.truncate(remaining);
        }
        self.yielded += ids.len();
        debug!(
            "Listed {} IDs for '{}' ({} so far)",
            ids.len(),
            self.query,
            self.yielded
        );

        Ok(Some(MessagePage {
            ids,
            next_page_token: self.page_token.clone(),
        }))
    }

    /// Fetch the next batch of IDs only
    pub fn next_batch(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.next_page()?.map(|page| page.ids))
    }
}

impl<M: Mailbox + ?Sized> Iterator for MessagePages<'_, M> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{InMemoryMailbox, SeedMessage};

    fn mailbox(n: usize) -> InMemoryMailbox {
        InMemoryMailbox::with_messages((0..n).map(|i| SeedMessage::new(format!("m{i}"))))
    }

    #[test]
    fn test_unbounded_drains_all_pages() {
        let mb = mailbox(7);
        let batches: Vec<Vec<String>> = MessagePages::new(&mb, "", 3, 0)
            .collect::<Result<_>>()
            .unwrap();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_limit_shrinks_requests() {
        let mb = mailbox(10);
        let mut pages = MessagePages::new(&mb, "", 4, 6);
        assert_eq!(pages.next_batch().unwrap().unwrap().len(), 4);
        assert_eq!(pages.next_batch().unwrap().unwrap().len(), 2);
        assert!(pages.next_batch().unwrap().is_none());
        assert_eq!(pages.yielded(), 6);

        let sizes: Vec<usize> = mb.list_calls().iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![4, 2]);
    }

    #[test]
    fn test_page_size_clamped() {
        let mb = mailbox(2);
        let _ = MessagePages::new(&mb, "", 10_000, 0).count();
        let _ = MessagePages::new(&mb, "", 0, 0).count();
        let sizes: Vec<usize> = mb.list_calls().iter().map(|(_, n)| *n).collect();
        assert_eq!(sizes, vec![500, 1, 1]);
    }

    #[test]
    fn test_empty_result_yields_nothing() {
        let mb = mailbox(0);
        assert_eq!(MessagePages::with_limit(&mb, "", 0).count(), 0);
        assert_eq!(mb.list_calls().len(), 1);
    }

    #[test]
    fn test_error_fuses_iterator() {
        let mb = mailbox(5);
        mb.fail_list_on_call(2);
        let mut pages = MessagePages::new(&mb, "", 2, 0);
        assert!(pages.next().unwrap().is_ok());
        assert!(matches!(pages.next(), Some(Err(CleanupError::Provider(_)))));
        assert!(pages.next().is_none());
        assert_eq!(mb.list_calls().len(), 2);
    }

    #[test]
    fn test_restart_reissues_query() {
        let mb = mailbox(3);
        let first: usize = MessagePages::with_limit(&mb, "", 2)
            .map(|b| b.unwrap().len())
            .sum();
        let second: usize = MessagePages::with_limit(&mb, "", 2)
            .map(|b| b.unwrap().len())
            .sum();
        assert_eq!((first, second), (2, 2));
        assert!(mb.list_calls().iter().all(|(q, _)| q.is_empty()));
    }
}
