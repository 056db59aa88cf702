use std::collections::BTreeSet;

use serde::Serialize;

/// What a directory sync will change.
///
/// Files are identified by name only: a local file whose name is also listed
/// remotely is kept as is, even if its content differs from the server's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub to_delete: BTreeSet<String>,
    pub to_fetch: BTreeSet<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_fetch.is_empty()
    }
}

/// Diff local against remote file names.
///
/// `to_delete = local − remote`, `to_fetch = remote − local`.
pub fn reconcile(local: &BTreeSet<String>, remote: &BTreeSet<String>) -> SyncPlan {
    SyncPlan {
        to_delete: local.difference(remote).cloned().collect(),
        to_fetch: remote.difference(local).cloned().collect(),
    }
}
