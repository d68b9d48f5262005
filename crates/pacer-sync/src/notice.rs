//! # Notices to the UI
//!
//! The engine never talks to the UI directly; it reports through a
//! [`NoticeEmitter`] the host implements.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┬──────────────────┐
//! │ Notice               │ Raised when              │ Shown to user?   │
//! ├──────────────────────┼──────────────────────────┼──────────────────┤
//! │ SavedLocally         │ transient sync failure   │ informational    │
//! │ EntryRejected        │ server rejected an entry │ yes              │
//! │ SessionExpired       │ server answered 401      │ yes              │
//! └──────────────────────┴──────────────────────────┴──────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use pacer_core::CounterSnapshot;

/// Something the UI collaborator may want to tell the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncNotice {
    /// The remote is unreachable; data is safe in the local queue.
    SavedLocally { pending: u64 },

    /// The remote refused an entry; it was dropped.
    EntryRejected {
        entry_id: i64,
        status: Option<u16>,
        reason: String,
    },

    /// The credential was refused; sync is paused until a new session.
    SessionExpired,
}

impl SyncNotice {
    /// Returns true for notices that need the user's attention.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, SyncNotice::SavedLocally { .. })
    }
}

/// Receives engine events on behalf of the UI.
///
/// Called from background tasks; implementations must not block.
pub trait NoticeEmitter: Send + Sync {
    /// The running total changed.
    fn emit_total(&self, snapshot: &CounterSnapshot);

    /// The queue length changed.
    fn emit_progress(&self, pending: u64, acknowledged_total: Option<u64>);

    /// A notice was raised.
    fn emit_notice(&self, notice: &SyncNotice);
}

/// Emitter that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEmitter;

impl NoticeEmitter for NoOpEmitter {
    fn emit_total(&self, _snapshot: &CounterSnapshot) {}
    fn emit_progress(&self, _pending: u64, _acknowledged_total: Option<u64>) {}
    fn emit_notice(&self, _notice: &SyncNotice) {}
}
