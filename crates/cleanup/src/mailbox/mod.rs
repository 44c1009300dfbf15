//! Mailbox capability
//!
//! [`Mailbox`] is the seam between the cleanup pipelines and the provider.
//! [`GmailClient`](crate::gmail::GmailClient) is the production
//! implementation; [`InMemoryMailbox`] backs tests and dry experiments.

mod memory;

use anyhow::Result;

use crate::gmail::api::{GmailMessage, Label, ListMessagesResponse};

pub use memory::{InMemoryMailbox, ModifyCall, SeedMessage};

/// Provider operations used by the cleanup pipelines
///
/// Every method is a single blocking round trip. Implementations must not
/// retry internally.
pub trait Mailbox {
    /// List one page of message IDs matching `query`
    ///
    /// `max_results` is at most 500.
    fn list_message_ids(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse>;

    /// Fetch message metadata restricted to the named headers
    fn get_message_metadata(&self, id: &str, headers: &[&str]) -> Result<GmailMessage>;

    /// Add and remove label IDs on every message in `ids` in one call
    fn batch_modify(&self, ids: &[String], add_label_ids: &[&str], remove_label_ids: &[&str])
    -> Result<()>;

    /// List all labels in the mailbox
    fn list_labels(&self) -> Result<Vec<Label>>;

    /// Create a user label
    fn create_label(&self, name: &str) -> Result<Label>;
}

impl<T: Mailbox + ?Sized> Mailbox for &T {
    fn list_message_ids(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        (**self).list_message_ids(query, max_results, page_token)
    }

    fn get_message_metadata(&self, id: &str, headers: &[&str]) -> Result<GmailMessage> {
        (**self).get_message_metadata(id, headers)
    }

    fn batch_modify(&self, ids: &[String], add_label_ids: &[&str], remove_label_ids: &[&str])
    -> Result<()> {
        (**self).batch_modify(ids, add_label_ids, remove_label_ids)
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        (**self).list_labels()
    }

    fn create_label(&self, name: &str) -> Result<Label> {
        (**self).create_label(name)
    }
}
