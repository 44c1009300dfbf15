//! Gmail API HTTP client
//!
//! Blocking REST calls for listing, reading metadata, labeling and trashing.
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Nothing here
//! retries: a failed call is returned to the caller as-is.

use anyhow::{Context, Result};
use log::debug;

use super::GmailAuth;
use super::api::{
    BatchModifyRequest, CreateLabelRequest, GmailMessage, Label, ListLabelsResponse,
    ListMessagesResponse,
};
use crate::mailbox::Mailbox;

/// Gmail API client
pub struct GmailClient {
    auth: GmailAuth,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Provider cap on `maxResults` for message listing
    pub const MAX_LIST_RESULTS: usize = 500;

    /// Create a new Gmail client
    pub fn new(auth: GmailAuth) -> Self {
        Self { auth }
    }

    /// Access the underlying auth (e.g. for logout)
    pub fn auth(&self) -> &GmailAuth {
        &self.auth
    }

    fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.auth.get_access_token()?))
    }

    /// Fetch metadata for the most recent messages in the mailbox
    ///
    /// Lists without a query (Gmail returns newest first) and fetches
    /// Subject/From/Date for each listed message.
    pub fn list_recent(&self, max_results: usize) -> Result<Vec<GmailMessage>> {
        let listing = self.list_message_ids("", max_results, None)?;
        listing
            .messages
            .unwrap_or_default()
            .iter()
            .filter(|m| !m.id.is_empty())
            .map(|m| self.get_message_metadata(&m.id, &["Subject", "From", "Date"]))
            .collect()
    }
}

impl Mailbox for GmailClient {
    fn list_message_ids(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let mut url = format!(
            "{}/users/me/messages?maxResults={}",
            Self::BASE_URL,
            max_results.clamp(1, Self::MAX_LIST_RESULTS)
        );
        if !query.is_empty() {
            url.push_str(&format!("&q={}", urlencoding::encode(query)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        debug!("messages.list q={:?} max={} token={:?}", query, max_results, page_token);
        let mut response = ureq::get(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .context("Failed to send list messages request")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")
    }

    fn get_message_metadata(&self, id: &str, headers: &[&str]) -> Result<GmailMessage> {
        let mut url = format!(
            "{}/users/me/messages/{}?format=metadata",
            Self::BASE_URL,
            urlencoding::encode(id)
        );
        for header in headers {
            url.push_str(&format!("&metadataHeaders={}", urlencoding::encode(header)));
        }

        let mut response = ureq::get(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .with_context(|| format!("Failed to fetch message {id}"))?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse message response")
    }

    fn batch_modify(
        &self,
        ids: &[String],
        add_label_ids: &[&str],
        remove_label_ids: &[&str],
    ) -> Result<()> {
        let url = format!("{}/users/me/messages/batchModify", Self::BASE_URL);
        let body = BatchModifyRequest {
            ids,
            add_label_ids,
            remove_label_ids,
        };

        debug!(
            "messages.batchModify ids={} add={:?} remove={:?}",
            ids.len(),
            add_label_ids,
            remove_label_ids
        );
        ureq::post(&url)
            .header("Authorization", &self.bearer()?)
            .send_json(&body)
            .context("Failed to send batch modify request")?;
        Ok(())
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        let url = format!("{}/users/me/labels", Self::BASE_URL);

        let mut response = ureq::get(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .context("Failed to send list labels request")?;

        let labels: ListLabelsResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse labels response")?;

        Ok(labels.labels.unwrap_or_default())
    }

    fn create_label(&self, name: &str) -> Result<Label> {
        let url = format!("{}/users/me/labels", Self::BASE_URL);
        let body = CreateLabelRequest {
            name,
            label_list_visibility: "labelShow",
            message_list_visibility: "show",
        };

        let mut response = ureq::post(&url)
            .header("Authorization", &self.bearer()?)
            .send_json(&body)
            .with_context(|| format!("Failed to create label '{name}'"))?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse created label")
    }
}
