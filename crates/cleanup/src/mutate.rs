//! Batch mutations
//!
//! Each batch from [`MessagePages`] becomes exactly one `batchModify` call.
//! There is no rollback: when a call fails, earlier batches stay mutated and
//! the failure is reported together with how many messages were changed.

use log::{debug, info, warn};

use crate::error::{CleanupError, Result};
use crate::gmail::api::Label;
use crate::mailbox::Mailbox;
use crate::pages::MessagePages;

/// Gmail's reserved Trash label ID
pub const TRASH_LABEL: &str = "TRASH";

/// What to do with each batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind<'a> {
    /// Add the label ID
    AddLabel(&'a str),
    /// Remove the label ID
    RemoveLabel(&'a str),
    /// Move to Trash
    Trash,
}

impl MutationKind<'_> {
    fn apply<M: Mailbox + ?Sized>(&self, mailbox: &M, ids: &[String]) -> anyhow::Result<()> {
        match self {
            Self::AddLabel(label_id) => mailbox.batch_modify(ids, &[*label_id], &[]),
            Self::RemoveLabel(label_id) => mailbox.batch_modify(ids, &[], &[*label_id]),
            Self::Trash => mailbox.batch_modify(ids, &[TRASH_LABEL], &[]),
        }
    }
}

/// Look up a label by exact name
pub fn find_label<M: Mailbox + ?Sized>(mailbox: &M, name: &str) -> Result<Option<Label>> {
    let labels = mailbox.list_labels().map_err(CleanupError::Provider)?;
    Ok(labels.into_iter().find(|l| l.name == name))
}

/// Resolve a label name to its ID, creating the label when absent
pub fn resolve_label_id<M: Mailbox + ?Sized>(mailbox: &M, name: &str) -> Result<String> {
    if let Some(label) = find_label(mailbox, name)? {
        return Ok(label.id);
    }
    let created = mailbox.create_label(name).map_err(CleanupError::Provider)?;
    info!("Created label '{}' ({})", name, created.id);
    Ok(created.id)
}

/// Add a label to one batch
pub fn apply_label<M: Mailbox + ?Sized>(mailbox: &M, label_id: &str, ids: &[String]) -> Result<()> {
    MutationKind::AddLabel(label_id)
        .apply(mailbox, ids)
        .map_err(CleanupError::Provider)
}

/// Remove a label from one batch
pub fn remove_label<M: Mailbox + ?Sized>(mailbox: &M, label_id: &str, ids: &[String]) -> Result<()> {
    MutationKind::RemoveLabel(label_id)
        .apply(mailbox, ids)
        .map_err(CleanupError::Provider)
}

/// Move one batch to Trash
pub fn trash<M: Mailbox + ?Sized>(mailbox: &M, ids: &[String]) -> Result<()> {
    MutationKind::Trash
        .apply(mailbox, ids)
        .map_err(CleanupError::Provider)
}

/// Apply `kind` to at most `target` messages matching `query`
///
/// `progress` receives `(done, target)` after every batch. A `target` of 0
/// mutates nothing. Returns the number of messages changed.
pub fn mutate_query<M, F>(
    mailbox: &M,
    query: &str,
    target: usize,
    kind: MutationKind<'_>,
    mut progress: F,
) -> Result<usize>
where
    M: Mailbox + ?Sized,
    F: FnMut(usize, usize),
{
    if target == 0 {
        return Ok(0);
    }

    let mut done = 0;
    let mut pages = MessagePages::with_limit(mailbox, query, target);
    loop {
        let batch = match pages.next_batch() {
            Ok(Some(batch)) => batch,
            Ok(None) => break,
            Err(e) if done == 0 => return Err(e),
            Err(CleanupError::Provider(source)) => {
                return Err(CleanupError::MutationHalted {
                    completed: done,
                    source,
                });
            }
            Err(e) => return Err(e),
        };

        if let Err(source) = kind.apply(mailbox, &batch) {
            return Err(CleanupError::MutationHalted {
                completed: done,
                source,
            });
        }
        done += batch.len();
        debug!("{:?}: {}/{} messages", kind, done, target);
        progress(done, target);
    }

    if done < target {
        warn!("{:?} reached {} of {} messages for '{}'", kind, done, target, query);
    }
    info!("{:?} applied to {} messages for '{}'", kind, done, query);
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{InMemoryMailbox, SeedMessage};

    fn labelled(n: usize) -> InMemoryMailbox {
        InMemoryMailbox::with_messages(
            (0..n).map(|i| SeedMessage::new(format!("m{i}")).label("cleanup/x")),
        )
    }

    #[test]
    fn test_resolve_existing_and_created_label() {
        let mb = labelled(1);
        let existing = resolve_label_id(&mb, "cleanup/x").unwrap();
        assert!(existing.starts_with("Label_"));

        let created = resolve_label_id(&mb, "cleanup/new").unwrap();
        assert_ne!(created, existing);
        assert_eq!(resolve_label_id(&mb, "cleanup/new").unwrap(), created);
    }

    #[test]
    fn test_mutate_never_exceeds_target() {
        let mb = labelled(1200);
        let mut reported = Vec::new();
        let done = mutate_query(&mb, "label:cleanup/x", 700, MutationKind::Trash, |d, t| {
            reported.push((d, t))
        })
        .unwrap();

        assert_eq!(done, 700);
        assert_eq!(reported, vec![(500, 700), (700, 700)]);
        let sizes: Vec<usize> = mb.modify_calls().iter().map(|c| c.ids.len()).collect();
        assert_eq!(sizes, vec![500, 200]);
        assert_eq!(mb.ids_with_label("TRASH").len(), 700);
    }

    #[test]
    fn test_zero_target_makes_no_calls() {
        let mb = labelled(3);
        let done = mutate_query(&mb, "label:cleanup/x", 0, MutationKind::Trash, |_, _| {}).unwrap();
        assert_eq!(done, 0);
        assert_eq!(mb.total_calls(), 0);
    }

    #[test]
    fn test_failed_batch_keeps_earlier_batches() {
        let mb = labelled(1200);
        mb.fail_modify_on_call(2);
        let err = mutate_query(&mb, "label:cleanup/x", 1200, MutationKind::Trash, |_, _| {})
            .unwrap_err();

        match err {
            CleanupError::MutationHalted { completed, .. } => assert_eq!(completed, 500),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(mb.ids_with_label("TRASH").len(), 500);
        assert_eq!(mb.modify_calls().len(), 2);
    }

    #[test]
    fn test_remove_label_batch() {
        let mb = labelled(2);
        let id = resolve_label_id(&mb, "cleanup/x").unwrap();
        remove_label(&mb, &id, &["m0".to_string()]).unwrap();
        assert!(!mb.has_label("m0", "cleanup/x"));
        assert!(mb.has_label("m1", "cleanup/x"));
    }
}
