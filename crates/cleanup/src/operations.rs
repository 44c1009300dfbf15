//! End-to-end cleanup pipelines
//!
//! Every pipeline follows the same order: build and validate the query (no
//! network), count matches, ask the guard, and only then mutate. Mutating
//! pipelines are split into a `plan_*` step, which makes read-only calls and
//! returns what would happen, and an `execute_*` step, which re-checks the
//! guard decision and the typed confirmation before touching the mailbox.

use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::error::{CleanupError, Result};
use crate::export::{ExportFormat, ExportRow, fetch_export_rows, write_rows};
use crate::guard::{self, GuardDecision, MutationRequest, Verdict};
use crate::mailbox::Mailbox;
use crate::mutate::{self, MutationKind};
use crate::preview::{CountSummary, SampleRow, count_messages, count_summary, sample_messages};
use crate::query::{BuiltQuery, QueryOptions, build_query};
use crate::stats::{SenderCount, collect_sender_stats};

/// Dry-run query with counts and a preview sample
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub options: QueryOptions,
    pub sample: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    #[serde(flatten)]
    pub counts: CountSummary,
    pub samples: Vec<SampleRow>,
}

/// Count matches (total, with and without attachments) and sample a few
pub fn run_query<M: Mailbox + ?Sized>(mailbox: &M, request: &QueryRequest) -> Result<QueryResult> {
    let query = build_query(&request.options)?;
    let counts = count_summary(mailbox, query.as_str())?;

    let samples = if request.sample > 0 && counts.total > 0 {
        sample_messages(mailbox, query.as_str(), request.sample)?
    } else {
        Vec::new()
    };

    Ok(QueryResult {
        query: query.into_string(),
        counts,
        samples,
    })
}

/// Add a label to messages matching a query
#[derive(Debug, Clone)]
pub struct LabelRequest {
    pub options: QueryOptions,
    pub target_label: String,
    /// 0 = all matches
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct LabelPlan {
    pub query: BuiltQuery,
    pub target_label: String,
    pub decision: GuardDecision,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelResult {
    pub query: String,
    pub target_label: String,
    /// `None` when nothing matched and the label was not resolved
    pub label_id: Option<String>,
    pub total_matched: usize,
    pub target_count: usize,
    pub labeled: usize,
}

/// Count matches and evaluate the guard for a label application
pub fn plan_label<M: Mailbox + ?Sized>(mailbox: &M, request: &LabelRequest) -> Result<LabelPlan> {
    if request.target_label.trim().is_empty() {
        return Err(CleanupError::validation("Target label must not be empty."));
    }
    let query = build_query(&request.options)?;
    let total = count_messages(mailbox, query.as_str())?;
    let decision = guard::evaluate(
        &MutationRequest::ApplyLabel {
            label: request.target_label.clone(),
            limit: request.limit,
        },
        total,
    );
    Ok(LabelPlan {
        query,
        target_label: request.target_label.clone(),
        decision,
    })
}

/// Apply a planned label after checking the typed confirmation
pub fn execute_label<M, F>(
    mailbox: &M,
    plan: &LabelPlan,
    confirmation: &str,
    progress: F,
) -> Result<LabelResult>
where
    M: Mailbox + ?Sized,
    F: FnMut(usize, usize),
{
    let labeled = |label_id: Option<String>, labeled: usize| LabelResult {
        query: plan.query.to_string(),
        target_label: plan.target_label.clone(),
        label_id,
        total_matched: plan.decision.total_matched,
        target_count: plan.decision.target_count,
        labeled,
    };

    if !check_runnable(&plan.decision, confirmation)? {
        return Ok(labeled(None, 0));
    }

    let label_id = mutate::resolve_label_id(mailbox, &plan.target_label)?;
    let done = mutate::mutate_query(
        mailbox,
        plan.query.as_str(),
        plan.decision.target_count,
        MutationKind::AddLabel(&label_id),
        progress,
    )?;
    info!("Labeled {} messages with '{}'", done, plan.target_label);
    Ok(labeled(Some(label_id), done))
}

/// Plan, confirm and apply a label in one call
///
/// `confirm` is asked for the typed phrase only when the guard requires it.
pub fn apply_label<M, C, F>(
    mailbox: &M,
    request: &LabelRequest,
    confirm: C,
    progress: F,
) -> Result<LabelResult>
where
    M: Mailbox + ?Sized,
    C: FnOnce(&LabelPlan) -> String,
    F: FnMut(usize, usize),
{
    let plan = plan_label(mailbox, request)?;
    let typed = if plan.decision.requires_confirmation {
        confirm(&plan)
    } else {
        String::new()
    };
    execute_label(mailbox, &plan, &typed, progress)
}

/// Export metadata rows for messages matching a query
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub options: QueryOptions,
    /// Rows are only returned when `None`
    pub out: Option<PathBuf>,
    pub format: ExportFormat,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub query: String,
    pub total_matched: usize,
    pub exported: usize,
    pub format: ExportFormat,
    pub out: Option<PathBuf>,
    #[serde(skip)]
    pub rows: Vec<ExportRow>,
}

/// Export up to `min(total, limit)` rows, writing them when `out` is set
pub fn export_messages<M: Mailbox + ?Sized>(
    mailbox: &M,
    request: &ExportRequest,
) -> Result<ExportResult> {
    let query = build_query(&request.options)?;
    let total = count_messages(mailbox, query.as_str())?;
    let rows = fetch_export_rows(mailbox, query.as_str(), total.min(request.limit))?;

    if let Some(out) = &request.out {
        write_rows(&rows, out, request.format)?;
        info!("Exported {} rows to {}", rows.len(), out.display());
    }

    Ok(ExportResult {
        query: query.into_string(),
        total_matched: total,
        exported: rows.len(),
        format: request.format,
        out: request.out.clone(),
        rows,
    })
}

/// Move messages carrying a cleanup label to Trash
#[derive(Debug, Clone)]
pub struct TrashRequest {
    pub label: String,
    pub execute: bool,
    /// 0 = all matches
    pub limit: usize,
    pub force: bool,
    pub max_trash_without_force: usize,
    /// Preview rows fetched while planning
    pub sample: usize,
}

#[derive(Debug, Clone)]
pub struct TrashPlan {
    pub label: String,
    pub query: BuiltQuery,
    pub decision: GuardDecision,
    pub samples: Vec<SampleRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrashResult {
    pub label: String,
    pub query: String,
    pub total_matched: usize,
    pub target_count: usize,
    pub trashed: usize,
    pub dry_run: bool,
}

impl TrashResult {
    /// Messages targeted but not trashed by an executed run
    pub fn shortfall(&self) -> usize {
        if self.dry_run {
            0
        } else {
            self.target_count.saturating_sub(self.trashed)
        }
    }
}

impl TrashRequest {
    fn as_mutation(&self) -> MutationRequest {
        MutationRequest::Trash {
            label: self.label.clone(),
            limit: self.limit,
            execute: self.execute,
            force: self.force,
            max_without_force: self.max_trash_without_force,
        }
    }
}

/// Count, sample and evaluate the guard for a trash request
///
/// A label outside the cleanup namespace is refused before any provider call.
pub fn plan_trash<M: Mailbox + ?Sized>(mailbox: &M, request: &TrashRequest) -> Result<TrashPlan> {
    guard::check_label_namespace(&request.label)?;

    let query = BuiltQuery::for_label(&request.label)?;
    let total = count_messages(mailbox, query.as_str())?;
    let decision = guard::evaluate(&request.as_mutation(), total);

    let samples = if request.sample > 0 && total > 0 {
        sample_messages(mailbox, query.as_str(), request.sample)?
    } else {
        Vec::new()
    };

    Ok(TrashPlan {
        label: request.label.clone(),
        query,
        decision,
        samples,
    })
}

/// Trash the planned messages after checking the typed confirmation
///
/// Dry runs and empty plans return without any provider call.
pub fn execute_trash<M, F>(
    mailbox: &M,
    plan: &TrashPlan,
    confirmation: &str,
    progress: F,
) -> Result<TrashResult>
where
    M: Mailbox + ?Sized,
    F: FnMut(usize, usize),
{
    let result = |trashed: usize| TrashResult {
        label: plan.label.clone(),
        query: plan.query.to_string(),
        total_matched: plan.decision.total_matched,
        target_count: plan.decision.target_count,
        trashed,
        dry_run: plan.decision.dry_run,
    };

    if !check_runnable(&plan.decision, confirmation)? {
        return Ok(result(0));
    }

    let done = mutate::mutate_query(
        mailbox,
        plan.query.as_str(),
        plan.decision.target_count,
        MutationKind::Trash,
        progress,
    )?;
    info!("Moved {} messages from '{}' to Trash", done, plan.label);
    Ok(result(done))
}

/// Plan, confirm and trash in one call
pub fn trash_by_label<M, C, F>(
    mailbox: &M,
    request: &TrashRequest,
    confirm: C,
    progress: F,
) -> Result<TrashResult>
where
    M: Mailbox + ?Sized,
    C: FnOnce(&TrashPlan) -> String,
    F: FnMut(usize, usize),
{
    let plan = plan_trash(mailbox, request)?;
    let typed = if plan.decision.requires_confirmation {
        confirm(&plan)
    } else {
        String::new()
    };
    execute_trash(mailbox, &plan, &typed, progress)
}

/// Remove a cleanup label from the messages carrying it
#[derive(Debug, Clone)]
pub struct ClearLabelRequest {
    pub label: String,
    /// 0 = all matches
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearLabelResult {
    pub label: String,
    pub query: String,
    pub total_matched: usize,
    pub target_count: usize,
    pub cleared: usize,
}

impl ClearLabelResult {
    pub fn shortfall(&self) -> usize {
        self.target_count.saturating_sub(self.cleared)
    }
}

/// Remove `label` from at most `limit` messages carrying it
///
/// The label is looked up, never created.
pub fn clear_label<M, F>(
    mailbox: &M,
    request: &ClearLabelRequest,
    progress: F,
) -> Result<ClearLabelResult>
where
    M: Mailbox + ?Sized,
    F: FnMut(usize, usize),
{
    guard::check_label_namespace(&request.label)?;

    let query = BuiltQuery::for_label(&request.label)?;
    let total = count_messages(mailbox, query.as_str())?;
    let decision = guard::evaluate(
        &MutationRequest::ClearLabel {
            label: request.label.clone(),
            limit: request.limit,
        },
        total,
    );

    let mut result = ClearLabelResult {
        label: request.label.clone(),
        query: query.to_string(),
        total_matched: total,
        target_count: decision.target_count,
        cleared: 0,
    };
    if !check_runnable(&decision, "")? {
        return Ok(result);
    }
    let Some(label) = mutate::find_label(mailbox, &request.label)? else {
        return Ok(result);
    };

    result.cleared = mutate::mutate_query(
        mailbox,
        query.as_str(),
        decision.target_count,
        MutationKind::RemoveLabel(&label.id),
        progress,
    )?;
    info!("Removed '{}' from {} messages", request.label, result.cleared);
    Ok(result)
}

/// Summarize senders over the first `scan_limit` matches
#[derive(Debug, Clone, Default)]
pub struct StatsRequest {
    pub options: QueryOptions,
    pub scan_limit: usize,
    pub top: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub query: String,
    pub scanned: usize,
    pub top_senders: Vec<SenderCount>,
    pub oldest: Option<String>,
    pub newest: Option<String>,
}

/// Tally senders and the date range over a bounded scan
pub fn sender_stats<M: Mailbox + ?Sized>(mailbox: &M, request: &StatsRequest) -> Result<StatsResult> {
    let query = build_query(&request.options)?;
    let stats = collect_sender_stats(mailbox, query.as_str(), request.scan_limit)?;
    Ok(StatsResult {
        query: query.into_string(),
        scanned: stats.scanned,
        top_senders: stats.top(request.top),
        oldest: stats.oldest(),
        newest: stats.newest(),
    })
}

/// Re-check a guard decision before mutating
///
/// `Ok(false)` means there is nothing to do (empty or dry run).
fn check_runnable(decision: &GuardDecision, confirmation: &str) -> Result<bool> {
    if let Some(refusal) = decision.refusal() {
        return Err(refusal.into());
    }
    if decision.verdict == Verdict::EmptyNoop || !decision.permits_mutation() {
        return Ok(false);
    }
    if !decision.is_confirmed_by(confirmation) {
        return Err(CleanupError::Cancelled);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{InMemoryMailbox, SeedMessage};

    fn from(sender: &str) -> QueryOptions {
        QueryOptions {
            from: Some(sender.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_query_refused_before_network() {
        let mb = InMemoryMailbox::new();
        let err = run_query(&mb, &QueryRequest::default()).unwrap_err();
        assert!(matches!(err, CleanupError::Validation(_)));
        assert_eq!(mb.total_calls(), 0);
    }

    #[test]
    fn test_run_query_skips_sample_when_nothing_matches() {
        let mb = InMemoryMailbox::new();
        let result = run_query(
            &mb,
            &QueryRequest {
                options: from("nobody"),
                sample: 10,
            },
        )
        .unwrap();
        assert_eq!(result.counts.total, 0);
        assert!(result.samples.is_empty());
        assert_eq!(mb.get_call_count(), 0);
    }

    #[test]
    fn test_label_wrong_phrase_cancels_without_mutation() {
        let mb = InMemoryMailbox::with_messages([SeedMessage::new("m1").from("a@example.com")]);
        let request = LabelRequest {
            options: from("a@example.com"),
            target_label: "cleanup/candidates".to_string(),
            limit: 0,
        };
        let err = apply_label(&mb, &request, |_| "NO".to_string(), |_, _| {}).unwrap_err();
        assert!(matches!(err, CleanupError::Cancelled));
        assert!(mb.modify_calls().is_empty());
    }

    #[test]
    fn test_label_noop_does_not_create_label() {
        let mb = InMemoryMailbox::new();
        let request = LabelRequest {
            options: from("nobody"),
            target_label: "cleanup/new".to_string(),
            limit: 0,
        };
        let result = apply_label(&mb, &request, |_| unreachable!(), |_, _| {}).unwrap();
        assert_eq!(result.labeled, 0);
        assert!(result.label_id.is_none());
        assert!(mb.labels().iter().all(|l| l.name != "cleanup/new"));
    }

    #[test]
    fn test_execute_rechecks_refused_plan() {
        let mb = InMemoryMailbox::with_messages(
            (0..3).map(|i| SeedMessage::new(format!("m{i}")).label("cleanup/x")),
        );
        let request = TrashRequest {
            label: "cleanup/x".to_string(),
            execute: true,
            limit: 0,
            force: false,
            max_trash_without_force: 2,
            sample: 0,
        };
        let plan = plan_trash(&mb, &request).unwrap();
        let err = execute_trash(&mb, &plan, "TRASH 3", |_, _| {}).unwrap_err();
        assert!(matches!(err, CleanupError::Safety(_)));
        assert!(mb.modify_calls().is_empty());
    }

    #[test]
    fn test_clear_label_unknown_label_is_noop() {
        let mb = InMemoryMailbox::new();
        let result = clear_label(
            &mb,
            &ClearLabelRequest {
                label: "cleanup/none".to_string(),
                limit: 0,
            },
            |_, _| {},
        )
        .unwrap();
        assert_eq!(result.cleared, 0);
        assert!(mb.labels().iter().all(|l| l.name != "cleanup/none"));
    }
}
