//! In-memory mailbox
//!
//! Implements [`Mailbox`] over a seeded message list with enough of Gmail's
//! search semantics for the cleanup pipelines: `label:`, `in:`, `from:`,
//! `to:`, `subject:`, `has:attachment`, negation with `-`, and bare words
//! matched against subject and snippet. Other operators are accepted and
//! ignored. Trashed messages are hidden unless the query says `in:trash` or
//! `in:anywhere`, as in Gmail.
//!
//! Every call is recorded so tests can assert on provider traffic, and
//! listing or batch modification can be made to fail on demand.

use anyhow::{Result, anyhow, bail};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::Mailbox;
use crate::gmail::api::{GmailMessage, Header, Label, ListMessagesResponse, MessagePayload, MessageRef};

const SYSTEM_LABELS: &[&str] = &["INBOX", "TRASH", "SPAM", "UNREAD", "STARRED", "SENT"];

/// A message to seed into an [`InMemoryMailbox`]
#[derive(Debug, Clone, Default)]
pub struct SeedMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Raw `Date` header, if any
    pub date: Option<String>,
    /// `internalDate` in milliseconds since the epoch, if any
    pub internal_date: Option<i64>,
    pub snippet: String,
    /// Label names (system labels use their IDs, e.g. "INBOX")
    pub labels: Vec<String>,
    pub has_attachment: bool,
}

impl SeedMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn internal_date(mut self, millis: i64) -> Self {
        self.internal_date = Some(millis);
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn label(mut self, name: impl Into<String>) -> Self {
        self.labels.push(name.into());
        self
    }

    pub fn with_attachment(mut self) -> Self {
        self.has_attachment = true;
        self
    }
}

/// A recorded `batch_modify` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyCall {
    pub ids: Vec<String>,
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

struct StoredMessage {
    seed: SeedMessage,
    label_ids: Vec<String>,
}

/// In-memory implementation of [`Mailbox`]
pub struct InMemoryMailbox {
    messages: RwLock<Vec<StoredMessage>>,
    labels: RwLock<Vec<Label>>,
    list_calls: RwLock<Vec<(String, usize)>>,
    modify_calls: RwLock<Vec<ModifyCall>>,
    get_calls: AtomicUsize,
    /// 1-based index of the batch_modify call that fails (0 = never)
    fail_modify_on: AtomicUsize,
    /// 1-based index of the list call that fails (0 = never)
    fail_list_on: AtomicUsize,
}

impl Default for InMemoryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMailbox {
    /// Create an empty mailbox containing only system labels
    pub fn new() -> Self {
        let labels = SYSTEM_LABELS
            .iter()
            .map(|id| Label {
                id: id.to_string(),
                name: id.to_string(),
                label_type: Some("system".to_string()),
            })
            .collect();

        Self {
            messages: RwLock::new(Vec::new()),
            labels: RwLock::new(labels),
            list_calls: RwLock::new(Vec::new()),
            modify_calls: RwLock::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
            fail_modify_on: AtomicUsize::new(0),
            fail_list_on: AtomicUsize::new(0),
        }
    }

    /// Create a mailbox seeded with messages, in listing order
    pub fn with_messages(messages: impl IntoIterator<Item = SeedMessage>) -> Self {
        let mailbox = Self::new();
        for message in messages {
            mailbox.insert(message);
        }
        mailbox
    }

    /// Add a message, creating any user labels it names
    pub fn insert(&self, message: SeedMessage) {
        let label_ids = message
            .labels
            .iter()
            .map(|name| self.ensure_label(name).id)
            .collect();
        write(&self.messages).push(StoredMessage {
            seed: message,
            label_ids,
        });
    }

    /// Make the n-th (1-based) `batch_modify` call fail
    pub fn fail_modify_on_call(&self, n: usize) {
        self.fail_modify_on.store(n, Ordering::SeqCst);
    }

    /// Make the n-th (1-based) `list_message_ids` call fail
    pub fn fail_list_on_call(&self, n: usize) {
        self.fail_list_on.store(n, Ordering::SeqCst);
    }

    /// Recorded list calls as `(query, max_results)`
    pub fn list_calls(&self) -> Vec<(String, usize)> {
        read(&self.list_calls).clone()
    }

    /// Recorded batch modifications
    pub fn modify_calls(&self) -> Vec<ModifyCall> {
        read(&self.modify_calls).clone()
    }

    /// Number of metadata fetches
    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Total provider round trips of any kind
    pub fn total_calls(&self) -> usize {
        read(&self.list_calls).len() + read(&self.modify_calls).len() + self.get_call_count()
    }

    /// All labels, system labels first
    pub fn labels(&self) -> Vec<Label> {
        read(&self.labels).clone()
    }

    /// Whether the message carries the named label (or label ID)
    pub fn has_label(&self, message_id: &str, name: &str) -> bool {
        let Some(label_id) = self.find_label(name).map(|l| l.id) else {
            return false;
        };
        read(&self.messages)
            .iter()
            .any(|m| m.seed.id == message_id && m.label_ids.contains(&label_id))
    }

    /// IDs of messages carrying the named label
    pub fn ids_with_label(&self, name: &str) -> Vec<String> {
        let Some(label_id) = self.find_label(name).map(|l| l.id) else {
            return Vec::new();
        };
        read(&self.messages)
            .iter()
            .filter(|m| m.label_ids.contains(&label_id))
            .map(|m| m.seed.id.clone())
            .collect()
    }

    fn find_label(&self, name_or_id: &str) -> Option<Label> {
        read(&self.labels)
            .iter()
            .find(|l| l.id == name_or_id || l.name.eq_ignore_ascii_case(name_or_id))
            .cloned()
    }

    fn ensure_label(&self, name: &str) -> Label {
        if let Some(label) = self.find_label(name) {
            return label;
        }
        let mut labels = write(&self.labels);
        let label = Label {
            id: format!("Label_{}", labels.len() + 1),
            name: name.to_string(),
            label_type: Some("user".to_string()),
        };
        labels.push(label.clone());
        label
    }

    fn matches(&self, message: &StoredMessage, query: &str) -> bool {
        let tokens = tokenize(query);
        let wants_trash = tokens
            .iter()
            .any(|t| t == "in:trash" || t == "in:anywhere");
        if !wants_trash && message.label_ids.iter().any(|l| l == "TRASH") {
            return false;
        }

        tokens.iter().all(|token| {
            let (negated, term) = match token.strip_prefix('-') {
                Some(rest) if !rest.is_empty() => (true, rest),
                _ => (false, token.as_str()),
            };
            match self.term_matches(message, term) {
                Some(hit) => hit != negated,
                None => true,
            }
        })
    }

    /// `None` means the operator is not modelled and is ignored
    fn term_matches(&self, message: &StoredMessage, term: &str) -> Option<bool> {
        let seed = &message.seed;
        if let Some((op, value)) = term.split_once(':') {
            let value = unquote(value);
            return match op {
                "label" => Some(
                    self.find_label(value)
                        .is_some_and(|l| message.label_ids.contains(&l.id)),
                ),
                "in" => match value.to_ascii_lowercase().as_str() {
                    "anywhere" => Some(true),
                    scope => Some(
                        message
                            .label_ids
                            .iter()
                            .any(|l| l.eq_ignore_ascii_case(scope)),
                    ),
                },
                "has" if value == "attachment" => Some(seed.has_attachment),
                "from" => Some(contains_ci(&seed.from, value)),
                "to" => Some(contains_ci(&seed.to, value)),
                "subject" => Some(contains_ci(&seed.subject, value)),
                _ => None,
            };
        }
        let word = unquote(term);
        Some(contains_ci(&seed.subject, word) || contains_ci(&seed.snippet, word))
    }

    fn to_gmail_message(message: &StoredMessage, headers: &[&str]) -> GmailMessage {
        let seed = &message.seed;
        let available = [
            ("From", Some(seed.from.as_str())),
            ("To", Some(seed.to.as_str())),
            ("Subject", Some(seed.subject.as_str())),
            ("Date", seed.date.as_deref()),
        ];
        let headers = available
            .iter()
            .filter(|(name, _)| headers.iter().any(|h| h.eq_ignore_ascii_case(name)))
            .filter_map(|(name, value)| {
                value.map(|v| Header {
                    name: name.to_string(),
                    value: v.to_string(),
                })
            })
            .collect();

        GmailMessage {
            id: seed.id.clone(),
            thread_id: seed.id.clone(),
            label_ids: Some(message.label_ids.clone()),
            snippet: seed.snippet.clone(),
            internal_date: seed.internal_date.map(|ms| ms.to_string()),
            payload: Some(MessagePayload {
                headers: Some(headers),
                mime_type: None,
            }),
        }
    }
}

impl Mailbox for InMemoryMailbox {
    fn list_message_ids(
        &self,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let call_number = {
            let mut calls = write(&self.list_calls);
            calls.push((query.to_string(), max_results));
            calls.len()
        };
        if self.fail_list_on.load(Ordering::SeqCst) == call_number {
            bail!("simulated list failure on call {call_number}");
        }

        // Tokens name the last message of the previous page, so a page stays
        // anchored when earlier matches stop matching.
        let start = match page_token {
            Some(token) => {
                read(&self.messages)
                    .iter()
                    .position(|m| m.seed.id == token)
                    .ok_or_else(|| anyhow!("invalid page token '{token}'"))?
                    + 1
            }
            None => 0,
        };

        let messages = read(&self.messages);
        let total = messages.iter().filter(|m| self.matches(m, query)).count();
        let mut remaining = messages[start.min(messages.len())..]
            .iter()
            .filter(|m| self.matches(m, query))
            .map(|m| m.seed.id.clone());

        let page: Vec<MessageRef> = remaining
            .by_ref()
            .take(max_results.max(1))
            .map(|id| MessageRef {
                thread_id: id.clone(),
                id,
            })
            .collect();
        let has_more = remaining.next().is_some();

        Ok(ListMessagesResponse {
            next_page_token: if has_more {
                page.last().map(|m| m.id.clone())
            } else {
                None
            },
            messages: if page.is_empty() { None } else { Some(page) },
            result_size_estimate: Some(total as u32),
        })
    }

    fn get_message_metadata(&self, id: &str, headers: &[&str]) -> Result<GmailMessage> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        read(&self.messages)
            .iter()
            .find(|m| m.seed.id == id)
            .map(|m| Self::to_gmail_message(m, headers))
            .ok_or_else(|| anyhow!("message {id} not found"))
    }

    fn batch_modify(
        &self,
        ids: &[String],
        add_label_ids: &[&str],
        remove_label_ids: &[&str],
    ) -> Result<()> {
        let call_number = {
            let mut calls = write(&self.modify_calls);
            calls.push(ModifyCall {
                ids: ids.to_vec(),
                add: add_label_ids.iter().map(|s| s.to_string()).collect(),
                remove: remove_label_ids.iter().map(|s| s.to_string()).collect(),
            });
            calls.len()
        };
        if self.fail_modify_on.load(Ordering::SeqCst) == call_number {
            bail!("simulated batchModify failure on call {call_number}");
        }

        let known: Vec<String> = read(&self.labels).iter().map(|l| l.id.clone()).collect();
        if let Some(unknown) = add_label_ids
            .iter()
            .chain(remove_label_ids)
            .find(|id| !known.iter().any(|k| k == *id))
        {
            bail!("unknown label id '{unknown}'");
        }

        for message in write(&self.messages)
            .iter_mut()
            .filter(|m| ids.contains(&m.seed.id))
        {
            message
                .label_ids
                .retain(|l| !remove_label_ids.contains(&l.as_str()));
            for add in add_label_ids {
                if !message.label_ids.iter().any(|l| l == add) {
                    message.label_ids.push(add.to_string());
                }
            }
        }
        Ok(())
    }

    fn list_labels(&self) -> Result<Vec<Label>> {
        Ok(self.labels())
    }

    fn create_label(&self, name: &str) -> Result<Label> {
        if self.find_label(name).is_some() {
            bail!("label '{name}' already exists");
        }
        Ok(self.ensure_label(name))
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Split on whitespace, keeping double-quoted runs together
fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in query.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
