//! Mutation safety guard
//!
//! [`evaluate`] is a pure function from a [`MutationRequest`] and the number
//! of matching messages to a [`GuardDecision`]. Rules, in order:
//!
//! 1. Trash and label-clear require a label inside [`SAFE_LABEL_PREFIX`],
//!    otherwise the request is refused whatever the count.
//! 2. `target_count` is `min(total, limit)`, or `total` when `limit` is 0.
//! 3. Nothing matched: no-op, no confirmation.
//! 4. Trash above `max_without_force` without `force` needs a re-run with force.
//! 5. Otherwise allowed. Trash without `execute` stays a dry run.

use crate::error::SafetyRefusal;

/// Labels that trash and label-clear may target must start with this
pub const SAFE_LABEL_PREFIX: &str = "cleanup/";

/// Phrase typed to confirm a label application
pub const LABEL_CONFIRMATION: &str = "YES";

/// A requested bulk mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    /// Add `label` to messages matching a query
    ApplyLabel { label: String, limit: usize },
    /// Move messages carrying `label` to Trash
    Trash {
        label: String,
        limit: usize,
        execute: bool,
        force: bool,
        max_without_force: usize,
    },
    /// Remove `label` from messages carrying it
    ClearLabel { label: String, limit: usize },
}

impl MutationRequest {
    pub fn label(&self) -> &str {
        match self {
            Self::ApplyLabel { label, .. }
            | Self::Trash { label, .. }
            | Self::ClearLabel { label, .. } => label,
        }
    }

    /// Item cap, 0 = unlimited
    pub fn limit(&self) -> usize {
        match self {
            Self::ApplyLabel { limit, .. }
            | Self::Trash { limit, .. }
            | Self::ClearLabel { limit, .. } => *limit,
        }
    }

    fn requires_safe_label(&self) -> bool {
        matches!(self, Self::Trash { .. } | Self::ClearLabel { .. })
    }
}

/// Terminal guard state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    EmptyNoop,
    ForceRequired { max_without_force: usize },
    Refused(SafetyRefusal),
}

/// Outcome of [`evaluate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDecision {
    pub verdict: Verdict,
    pub total_matched: usize,
    pub target_count: usize,
    /// Trash requested without `execute`
    pub dry_run: bool,
    /// The caller must obtain [`Self::confirmation_phrase`] before mutating
    pub requires_confirmation: bool,
    pub confirmation_phrase: Option<String>,
}

impl GuardDecision {
    /// The refusal carried by `Refused` or `ForceRequired`
    pub fn refusal(&self) -> Option<SafetyRefusal> {
        match &self.verdict {
            Verdict::Refused(refusal) => Some(refusal.clone()),
            Verdict::ForceRequired { max_without_force } => Some(SafetyRefusal::ForceRequired {
                target: self.target_count,
                max: *max_without_force,
            }),
            Verdict::Allowed | Verdict::EmptyNoop => None,
        }
    }

    /// Allowed and not a dry run
    pub fn permits_mutation(&self) -> bool {
        self.verdict == Verdict::Allowed && !self.dry_run
    }

    /// Whether `typed` satisfies the confirmation requirement
    pub fn is_confirmed_by(&self, typed: &str) -> bool {
        match &self.confirmation_phrase {
            Some(phrase) if self.requires_confirmation => typed == phrase,
            _ => true,
        }
    }
}

/// `min(total, limit)` when `limit > 0`, else `total`
pub fn target_count(total_matched: usize, limit: usize) -> usize {
    if limit > 0 {
        total_matched.min(limit)
    } else {
        total_matched
    }
}

/// Refuse labels outside the reserved cleanup namespace
pub fn check_label_namespace(label: &str) -> Result<(), SafetyRefusal> {
    if label.starts_with(SAFE_LABEL_PREFIX) {
        Ok(())
    } else {
        Err(SafetyRefusal::LabelOutsideSafeNamespace {
            label: label.to_string(),
            prefix: SAFE_LABEL_PREFIX,
        })
    }
}

/// Decide whether `request` may run against `total_matched` messages
pub fn evaluate(request: &MutationRequest, total_matched: usize) -> GuardDecision {
    let target = target_count(total_matched, request.limit());
    let dry_run = matches!(request, MutationRequest::Trash { execute: false, .. });

    let verdict = if request.requires_safe_label()
        && let Err(refusal) = check_label_namespace(request.label())
    {
        Verdict::Refused(refusal)
    } else if total_matched == 0 {
        Verdict::EmptyNoop
    } else {
        match request {
            MutationRequest::Trash {
                force: false,
                max_without_force,
                ..
            } if target > *max_without_force => Verdict::ForceRequired {
                max_without_force: *max_without_force,
            },
            _ => Verdict::Allowed,
        }
    };

    let confirmation_phrase = match request {
        MutationRequest::ApplyLabel { .. } => Some(LABEL_CONFIRMATION.to_string()),
        MutationRequest::Trash { .. } => Some(format!("TRASH {target}")),
        MutationRequest::ClearLabel { .. } => None,
    };
    let requires_confirmation =
        verdict == Verdict::Allowed && !dry_run && confirmation_phrase.is_some();

    GuardDecision {
        verdict,
        total_matched,
        target_count: target,
        dry_run,
        requires_confirmation,
        confirmation_phrase,
    }
}
