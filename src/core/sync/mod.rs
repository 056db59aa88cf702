// ─── Remote Sync ───
// Enumerate both sides, diff by file name, delete extras, fetch the rest.

pub mod engine;
pub mod enumerator;
pub mod reconciler;

pub use engine::{FileSyncOutcome, SyncEngine, SyncHandle, SyncPhase, SyncReport};
pub use enumerator::list_local_files;
pub use reconciler::{reconcile, SyncPlan};
