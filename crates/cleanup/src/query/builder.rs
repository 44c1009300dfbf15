//! Query builder for Gmail's search mini-language
//!
//! Renders clauses in a fixed order:
//! raw text, `from:`/`to:`/`subject:`/`label:`/`in:`, date bounds,
//! include/exclude words, attachment presence, size bounds.

use std::fmt;

use crate::error::{CleanupError, Result};

/// Attachment presence filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AttachmentFilter {
    /// Only messages with attachments (`has:attachment`)
    Required,
    /// Only messages without attachments (`-has:attachment`)
    Excluded,
    /// No attachment clause
    #[default]
    Indifferent,
}

impl AttachmentFilter {
    /// Build from the two independent CLI/API flags
    ///
    /// Fails when both flags are set.
    pub fn from_flags(has_attachment: bool, no_attachment: bool) -> Result<Self> {
        match (has_attachment, no_attachment) {
            (true, true) => Err(CleanupError::validation(
                "Choose only one: has_attachment or no_attachment",
            )),
            (true, false) => Ok(Self::Required),
            (false, true) => Ok(Self::Excluded),
            (false, false) => Ok(Self::Indifferent),
        }
    }

    fn clause(self) -> Option<&'static str> {
        match self {
            Self::Required => Some("has:attachment"),
            Self::Excluded => Some("-has:attachment"),
            Self::Indifferent => None,
        }
    }
}

/// Structured search filters
///
/// Every field is optional; blank strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Raw Gmail query text, emitted first and verbatim
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    /// Words that must appear
    pub has_words: Option<String>,
    /// Words that must not appear
    pub not_has_words: Option<String>,
    pub label: Option<String>,
    /// Scope (`in:`), e.g. "inbox", "anywhere", "trash"
    pub scope: Option<String>,
    /// Absolute lower date bound (YYYY/MM/DD)
    pub after: Option<String>,
    /// Absolute upper date bound (YYYY/MM/DD)
    pub before: Option<String>,
    /// Relative age bound, e.g. "30d", "12m", "2y"
    pub older_than: Option<String>,
    pub newer_than: Option<String>,
    pub attachment: AttachmentFilter,
    /// Size lower bound, e.g. "10M"
    pub larger: Option<String>,
    pub smaller: Option<String>,
}

impl QueryOptions {
    /// Restrict to the inbox (`in:inbox`)
    pub fn inbox_only(mut self) -> Self {
        self.scope = Some("inbox".to_string());
        self
    }

    /// Render the clauses without validating emptiness
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(q) = present(&self.q) {
            parts.push(q.to_string());
        }

        if let Some(from) = present(&self.from) {
            parts.push(format!("from:{from}"));
        }
        if let Some(to) = present(&self.to) {
            parts.push(format!("to:{to}"));
        }
        if let Some(subject) = present(&self.subject) {
            parts.push(format!("subject:{}", quote_if_needed(subject)));
        }
        if let Some(label) = present(&self.label) {
            parts.push(format!("label:{label}"));
        }
        if let Some(scope) = present(&self.scope) {
            parts.push(format!("in:{scope}"));
        }

        if let Some(after) = present(&self.after) {
            parts.push(format!("after:{after}"));
        }
        if let Some(before) = present(&self.before) {
            parts.push(format!("before:{before}"));
        }
        if let Some(older) = present(&self.older_than) {
            parts.push(format!("older_than:{older}"));
        }
        if let Some(newer) = present(&self.newer_than) {
            parts.push(format!("newer_than:{newer}"));
        }

        if let Some(words) = present(&self.has_words) {
            parts.push(quote_if_needed(words));
        }
        if let Some(words) = present(&self.not_has_words) {
            parts.push(format!("-{}", quote_if_needed(words)));
        }

        if let Some(clause) = self.attachment.clause() {
            parts.push(clause.to_string());
        }

        if let Some(larger) = present(&self.larger) {
            parts.push(format!("larger:{larger}"));
        }
        if let Some(smaller) = present(&self.smaller) {
            parts.push(format!("smaller:{smaller}"));
        }

        parts.join(" ").trim().to_string()
    }
}

/// A non-empty Gmail search query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuiltQuery(String);

impl BuiltQuery {
    /// Wrap a raw query string, refusing blank input
    pub fn new(query: impl Into<String>) -> Result<Self> {
        let query = query.into();
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(CleanupError::validation("Refusing to run an empty query."));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Query scoped to a single label (`label:<name>`)
    pub fn for_label(label: &str) -> Result<Self> {
        if label.trim().is_empty() {
            return Err(CleanupError::validation("Label must not be empty."));
        }
        Self::new(format!("label:{}", quote_if_needed(label)))
    }

    /// Append an extra clause (used for the attachment split counts)
    pub fn and(&self, clause: &str) -> Self {
        Self(format!("{} {}", self.0, clause.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BuiltQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BuiltQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Build and validate a query from structured options
///
/// Returns `CleanupError::Validation` when no clause is present.
pub fn build_query(opts: &QueryOptions) -> Result<BuiltQuery> {
    BuiltQuery::new(opts.render())
}

/// Wrap a value in double quotes when it contains whitespace and is not
/// already quoted
pub fn quote_if_needed(text: &str) -> String {
    let text = text.trim();
    let already_quoted = text.len() >= 2 && text.starts_with('"') && text.ends_with('"');
    if text.contains(char::is_whitespace) && !already_quoted {
        format!("\"{text}\"")
    } else {
        text.to_string()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
