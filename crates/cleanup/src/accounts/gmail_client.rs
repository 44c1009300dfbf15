//! Production message client backed by the Gmail REST API

use log::debug;

use super::service::{ClientAuthError, MessageClient, MessageClientFactory};
use crate::config::GmailCredentials;
use crate::gmail::api::GmailMessage;
use crate::gmail::{GmailAuth, GmailClient};

impl MessageClient for GmailClient {
    fn list_messages(&self, max_results: usize) -> anyhow::Result<Vec<GmailMessage>> {
        self.list_recent(max_results)
    }
}

/// Creates Gmail clients from stored refresh credentials
pub struct GmailMessageClientFactory {
    credentials: GmailCredentials,
}

impl GmailMessageClientFactory {
    pub fn new(credentials: GmailCredentials) -> Self {
        Self { credentials }
    }
}

impl MessageClientFactory for GmailMessageClientFactory {
    fn create(&self, refresh_token: &str) -> Result<Box<dyn MessageClient>, ClientAuthError> {
        // Refreshing up front turns a revoked credential into an auth error
        let auth = GmailAuth::from_refresh_token(self.credentials.clone(), refresh_token)
            .map_err(|e| ClientAuthError(format!("{e:#}")))?;
        debug!("Refreshed access token for stored credential");
        Ok(Box::new(GmailClient::new(auth)))
    }
}
