//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 token management for the CLI and for stored refresh credentials
//! - A blocking Gmail REST client
//! - Header and date normalization helpers

mod auth;
mod client;
mod normalize;

pub use auth::{GMAIL_MODIFY_SCOPE, GmailAuth, TokenResponse};
pub(crate) use auth::exchange_code;
pub use client::GmailClient;
pub use normalize::{display_date, format_display_date, header_value, parse_header_date, received_at};

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
    }

    /// Message fetched with `format=metadata`
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        #[serde(default)]
        pub thread_id: String,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        /// Milliseconds since the epoch, as a decimal string
        pub internal_date: Option<String>,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload (only headers are requested)
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub headers: Option<Vec<Header>>,
        pub mime_type: Option<String>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        #[serde(default)]
        pub value: String,
    }

    /// Response from listing labels
    #[derive(Debug, Default, Deserialize)]
    pub struct ListLabelsResponse {
        pub labels: Option<Vec<Label>>,
    }

    /// A label as returned by the labels endpoints
    #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
    pub struct Label {
        pub id: String,
        pub name: String,
        #[serde(rename = "type")]
        pub label_type: Option<String>,
    }

    /// Body of `labels.create`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CreateLabelRequest<'a> {
        pub name: &'a str,
        pub label_list_visibility: &'a str,
        pub message_list_visibility: &'a str,
    }

    /// Body of `messages.batchModify`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BatchModifyRequest<'a> {
        pub ids: &'a [String],
        pub add_label_ids: &'a [&'a str],
        pub remove_label_ids: &'a [&'a str],
    }
}
