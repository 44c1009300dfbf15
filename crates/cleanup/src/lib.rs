//! Cleanup crate - Safe bulk operations on a Gmail mailbox
//!
//! This crate provides the platform-independent core of gmail-cleanup:
//! - Query construction from structured filters ([`query`])
//! - Capped, cursor-based enumeration of message IDs ([`pages`])
//! - Dry-run counts and previews ([`preview`], [`stats`], [`export`])
//! - The mutation safety guard ([`guard`]) and batch mutations ([`mutate`])
//! - End-to-end pipelines used by the CLI ([`operations`])
//! - Refresh credential encryption at rest ([`vault`])
//! - Multi-user account storage, OAuth and message previews ([`accounts`])
//!
//! All I/O is synchronous (ureq, rusqlite); callers that live on an async
//! executor are expected to run these calls on a blocking thread.

pub mod accounts;
pub mod config;
pub mod error;
pub mod export;
pub mod gmail;
pub mod guard;
pub mod mailbox;
pub mod mutate;
pub mod operations;
pub mod pages;
pub mod preview;
pub mod query;
pub mod stats;
pub mod vault;

pub use config::{AppConfig, GmailCredentials};
pub use error::{CleanupError, Result, SafetyRefusal};
pub use export::ExportFormat;
pub use gmail::{GmailAuth, GmailClient};
pub use guard::{GuardDecision, MutationRequest, Verdict, SAFE_LABEL_PREFIX};
pub use mailbox::{InMemoryMailbox, Mailbox};
pub use mutate::MutationKind;
pub use pages::{MessagePage, MessagePages, MAX_PAGE_SIZE};
pub use query::{AttachmentFilter, BuiltQuery, QueryOptions, build_query};
pub use vault::{CredentialVault, VaultError};
