//! Orchestrates journal compaction (§4.1.1): the policy order is fixed —
//! age first, then count, then size — each stage capped at the configured
//! batch size. Delete-kind operations evict their trash slot before the
//! record itself is removed, so a crash between the two never leaves an
//! orphaned trash directory with no record pointing at it.

use chrono::Utc;

use crate::config::CompactionPolicy;
use crate::error::Result;
use crate::journal::Journal;
use crate::model::OperationKind;
use crate::trash::TrashStore;

#[derive(Debug, Clone, Default)]
pub struct CompactionReport {
    pub removed_by_age: u64,
    pub removed_by_count: u64,
    pub removed_by_size: u64,
    pub orphaned_transactions_removed: u64,
    pub vacuumed: bool,
}

impl CompactionReport {
    pub fn total_removed(&self) -> u64 {
        self.removed_by_age + self.removed_by_count + self.removed_by_size
    }
}

/// Runs one full compaction pass against `journal`, evicting trash slots
/// for any removed Delete operations via `trash`.
///
/// Each stage loops batch-by-batch until its criterion is actually
/// satisfied rather than stopping after one `batch_size`-capped DELETE —
/// a single batch only relieves pressure when the backlog is smaller than
/// `batch_size` to begin with.
pub fn compact(journal: &Journal, trash: &TrashStore, policy: &CompactionPolicy) -> Result<CompactionReport> {
    let mut report = CompactionReport::default();

    let cutoff = Utc::now() - chrono::Duration::days(policy.max_age_days as i64);
    loop {
        let batch = journal.candidates_older_than(cutoff, policy.batch_size)?;
        if batch.is_empty() {
            break;
        }
        report.removed_by_age += remove_batch(journal, trash, &batch)?;
    }

    loop {
        let batch = journal.candidates_over_count(policy.max_operations, policy.batch_size)?;
        if batch.is_empty() {
            break;
        }
        report.removed_by_count += remove_batch(journal, trash, &batch)?;
    }

    // Size pressure reuses the same oldest-first selection as the count
    // stage: once age and count have had their pass, excess size is
    // relieved by trimming further oldest-first batches. Vacuum between
    // batches since the byte count only drops once freed pages are
    // reclaimed.
    while journal.size_bytes()? > policy.max_size_bytes {
        let batch = journal.candidates_older_than(Utc::now(), policy.batch_size)?;
        if batch.is_empty() {
            break;
        }
        report.removed_by_size += remove_batch(journal, trash, &batch)?;
        journal.vacuum()?;
        report.vacuumed = true;
    }

    report.orphaned_transactions_removed = journal.delete_orphaned_transactions()?;

    if !report.vacuumed && (report.total_removed() > 0 || report.orphaned_transactions_removed > 0) {
        journal.vacuum()?;
        report.vacuumed = true;
    }

    Ok(report)
}

fn remove_batch(journal: &Journal, trash: &TrashStore, candidates: &[crate::model::Operation]) -> Result<u64> {
    if candidates.is_empty() {
        return Ok(0);
    }
    for op in candidates {
        if op.kind == OperationKind::Delete {
            trash.evict(op.id)?;
        }
    }
    let ids: Vec<i64> = candidates.iter().map(|op| op.id).collect();
    journal.delete_operations(&ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::digest::HashAlgorithm;
    use tempfile::tempdir;

    fn setup() -> (tempfile::TempDir, Journal, TrashStore) {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("history.db")).unwrap();
        let trash = TrashStore::new(dir.path().join("trash"));
        (dir, journal, trash)
    }

    #[test]
    fn compact_with_generous_policy_removes_nothing() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hi").unwrap();
        executor.mv(&src, &dir.path().join("b.txt"), None).unwrap();

        let report = compact(&journal, &trash, &CompactionPolicy::default()).unwrap();
        assert_eq!(report.total_removed(), 0);
        assert_eq!(journal.operation_count().unwrap(), 1);
    }

    #[test]
    fn compact_evicts_trash_slot_for_removed_delete_operation() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);
        let src = dir.path().join("x.txt");
        std::fs::write(&src, b"bye").unwrap();
        let op = executor.delete(&src, None).unwrap();

        let policy = CompactionPolicy {
            max_operations: 0,
            ..CompactionPolicy::default()
        };
        compact(&journal, &trash, &policy).unwrap();

        assert!(journal.get_operation(op.id).unwrap().is_none());
        assert!(trash.slot_path(op.id, std::ffi::OsStr::new("x.txt")).is_none());
    }

    #[test]
    fn compact_removes_orphaned_transactions() {
        let (_dir, journal, trash) = setup();
        let txn = journal.append_transaction(serde_json::Map::new()).unwrap();
        let report = compact(&journal, &trash, &CompactionPolicy::default()).unwrap();
        assert_eq!(report.orphaned_transactions_removed, 1);
        assert!(journal.get_transaction(&txn.transaction_id).unwrap().is_none());
    }

    #[test]
    fn compact_reclaims_transaction_orphaned_by_its_own_operation_count_overflow() {
        // A transaction whose operations are all later deleted by compaction
        // must itself be cleaned up, even though `operation_count` was
        // incremented when the operations were appended and is never
        // decremented on delete.
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hi").unwrap();
        let txn_id = crate::txn::run_in_transaction(&journal, serde_json::Map::new(), |handle| {
            executor.mv(&src, &dir.path().join("b.txt"), Some(handle))?;
            Ok(handle.id().to_string())
        })
        .unwrap();
        assert_eq!(
            journal.get_transaction(&txn_id).unwrap().unwrap().operation_count,
            1
        );

        let policy = CompactionPolicy {
            max_operations: 0,
            ..CompactionPolicy::default()
        };
        let report = compact(&journal, &trash, &policy).unwrap();

        assert_eq!(report.removed_by_count, 1);
        assert_eq!(report.orphaned_transactions_removed, 1);
        assert!(journal.get_transaction(&txn_id).unwrap().is_none());
    }

    #[test]
    fn compact_count_stage_loops_past_a_single_batch() {
        let (dir, journal, trash) = setup();
        let executor = Executor::new(&journal, &trash, HashAlgorithm::Sha256);
        for i in 0..5 {
            let src = dir.path().join(format!("a{i}.txt"));
            std::fs::write(&src, b"hi").unwrap();
            executor.mv(&src, &dir.path().join(format!("b{i}.txt")), None).unwrap();
        }

        let policy = CompactionPolicy {
            max_operations: 1,
            batch_size: 2,
            ..CompactionPolicy::default()
        };
        let report = compact(&journal, &trash, &policy).unwrap();

        assert_eq!(report.removed_by_count, 4);
        assert_eq!(journal.operation_count().unwrap(), 1);
    }
}
