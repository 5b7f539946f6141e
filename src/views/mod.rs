//! Views that consume resource stores.
//!
//! A view is described by the resources it needs. Mounting one through
//! [`SyncHub::mount`](crate::sync::SyncHub::mount) loads those stores, opens
//! the event channel, and keeps the stores live until the returned handle is
//! dropped. The read models here derive what each screen shows from the
//! stores' current snapshots.

mod board;
mod dashboard;

pub use board::{AuditLog, MissionBoard, TransmutationLedger};
pub use dashboard::{DashboardSummary, MaterialLevel, SummaryCard};

use crate::models::ResourceKind;

/// The live screens of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Aggregate totals over every resource
    Dashboard,
    AuditLog,
    MissionBoard,
    /// Transmutations plus the materials they consume
    TransmutationLedger,
}

impl ViewKind {
    /// Resources this view keeps loaded.
    pub fn resources(&self) -> &'static [ResourceKind] {
        match self {
            ViewKind::Dashboard => &ResourceKind::ALL,
            ViewKind::AuditLog => &[ResourceKind::Audits],
            ViewKind::MissionBoard => &[ResourceKind::Missions],
            ViewKind::TransmutationLedger => {
                &[ResourceKind::Transmutations, ResourceKind::Materials]
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Dashboard => "dashboard",
            ViewKind::AuditLog => "audit-log",
            ViewKind::MissionBoard => "mission-board",
            ViewKind::TransmutationLedger => "transmutation-ledger",
        }
    }
}

impl std::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dashboard_needs_everything() {
        assert_eq!(ViewKind::Dashboard.resources().len(), 5);
    }

    #[test]
    fn test_ledger_needs_materials() {
        assert!(
            ViewKind::TransmutationLedger
                .resources()
                .contains(&ResourceKind::Materials)
        );
    }
}
