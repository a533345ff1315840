use std::collections::BTreeMap;

use shared::{NameIndex, Result, UserId};

use crate::repository::{NameIndexRepository, UserRepository};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries whose name no user record carries; removed.
    pub stale_entries: Vec<(String, UserId)>,
    /// Entries added or re-pointed to the record that carries the name.
    pub restored_entries: Vec<(String, UserId)>,
    /// Names carried by more than one record. Never repaired automatically.
    pub duplicate_names: Vec<(String, Vec<UserId>)>,
    /// Records whose own `id` differs from the id in their path, as
    /// `(path id, self-reported id)`.
    pub mismatched_ids: Vec<(UserId, UserId)>,
    /// Whether the repaired index was written back.
    pub applied: bool,
}

impl ReconcileReport {
    pub fn needs_repair(&self) -> bool {
        !self.stale_entries.is_empty() || !self.restored_entries.is_empty()
    }

    pub fn is_consistent(&self) -> bool {
        !self.needs_repair() && self.duplicate_names.is_empty() && self.mismatched_ids.is_empty()
    }
}

/// Rebuilds the name index from the user records and repairs drift.
///
/// Runs against the same unlocked documents as renames, so a rename landing
/// between the scan and the write-back can be undone by it; the next pass
/// restores the entry from the record.
pub struct NameIndexReconciler {
    users: UserRepository,
    name_index: NameIndexRepository,
}

impl NameIndexReconciler {
    pub fn new(users: UserRepository, name_index: NameIndexRepository) -> Self {
        Self { users, name_index }
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, dry_run: bool) -> Result<ReconcileReport> {
        let records = self.users.list_all().await?;
        let index = self.name_index.load().await?;

        let mut report = ReconcileReport::default();
        let mut claimants: BTreeMap<&str, Vec<UserId>> = BTreeMap::new();

        for (path_id, record) in &records {
            if record.id != *path_id {
                report.mismatched_ids.push((path_id.clone(), record.id.clone()));
            }
            if record.user_name.is_empty() {
                continue;
            }
            claimants
                .entry(record.user_name.as_str())
                .or_default()
                .push(path_id.clone());
        }

        let mut desired = NameIndex::new();
        for (name, ids) in claimants {
            if ids.len() == 1 {
                desired.insert(name, ids[0].clone());
                continue;
            }
            // Keep the index's choice if it points at one of the claimants.
            if let Some(current) = index.lookup(name).filter(|id| ids.contains(id)) {
                desired.insert(name, current.clone());
            }
            report.duplicate_names.push((name.to_string(), ids));
        }

        for (name, id) in index.iter() {
            if desired.lookup(name).is_none() {
                report.stale_entries.push((name.clone(), id.clone()));
            }
        }
        for (name, id) in desired.iter() {
            if index.lookup(name) != Some(id) {
                report.restored_entries.push((name.clone(), id.clone()));
            }
        }

        shared::record_gauge("identity.reconcile.duplicate_names", report.duplicate_names.len() as f64);

        if !report.duplicate_names.is_empty() {
            tracing::warn!(
                duplicates = ?report.duplicate_names,
                "Usernames claimed by more than one user"
            );
        }

        if report.needs_repair() && !dry_run {
            self.name_index.save(&desired).await?;
            report.applied = true;

            shared::record_counter("identity.reconcile.stale_removed", report.stale_entries.len() as u64);
            shared::record_counter("identity.reconcile.restored", report.restored_entries.len() as u64);
        }

        tracing::info!(
            records = records.len(),
            stale = report.stale_entries.len(),
            restored = report.restored_entries.len(),
            duplicates = report.duplicate_names.len(),
            mismatched_ids = report.mismatched_ids.len(),
            applied = report.applied,
            "Name index reconciliation finished"
        );

        Ok(report)
    }
}
