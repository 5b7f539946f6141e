//! Read models for the list screens.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{AuditEntry, Mission, MissionStatus, Transmutation, TransmutationStatus};

/// Missions grouped into lifecycle columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MissionBoard {
    pub columns: BTreeMap<MissionStatus, Vec<Mission>>,
}

impl MissionBoard {
    /// Group `missions` by status. Each column keeps the server's order.
    pub fn build(missions: &[Mission]) -> Self {
        let mut columns: BTreeMap<MissionStatus, Vec<Mission>> = BTreeMap::new();
        for mission in missions {
            columns
                .entry(mission.status)
                .or_default()
                .push(mission.clone());
        }
        Self { columns }
    }

    pub fn column(&self, status: MissionStatus) -> &[Mission] {
        self.columns.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.columns.values().map(Vec::len).sum()
    }
}

/// Audit entries, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditLog {
    pub entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn build(entries: &[AuditEntry]) -> Self {
        let mut entries = entries.to_vec();
        // Entries without a timestamp sink to the bottom; ties fall back to id
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Self { entries }
    }

    /// Entries that touched `entity` (case-insensitive).
    pub fn for_entity(&self, entity: &str) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.entity.eq_ignore_ascii_case(entity))
            .collect()
    }
}

/// Transmutations, optionally narrowed to one status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransmutationLedger {
    pub filter: Option<TransmutationStatus>,
    pub rows: Vec<Transmutation>,
}

impl TransmutationLedger {
    pub fn build(transmutations: &[Transmutation], filter: Option<TransmutationStatus>) -> Self {
        let rows = transmutations
            .iter()
            .filter(|t| filter.is_none_or(|status| t.status == status))
            .cloned()
            .collect();
        Self { filter, rows }
    }

    /// Rows still waiting on the backend.
    pub fn outstanding(&self) -> usize {
        self.rows
            .iter()
            .filter(|t| {
                matches!(
                    t.status,
                    TransmutationStatus::Pending | TransmutationStatus::Processing
                )
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn mission(id: u64, status: MissionStatus) -> Mission {
        Mission {
            id: Some(id),
            status,
            ..Default::default()
        }
    }

    fn audit(id: u64, entity: &str, hour: Option<u32>) -> AuditEntry {
        AuditEntry {
            id: Some(id),
            entity: entity.to_string(),
            created_at: hour.map(|h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    fn transmutation(id: u64, status: TransmutationStatus) -> Transmutation {
        Transmutation {
            id: Some(id),
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_board_groups_and_keeps_order() {
        let board = MissionBoard::build(&[
            mission(1, MissionStatus::Pending),
            mission(2, MissionStatus::InProgress),
            mission(3, MissionStatus::Pending),
        ]);
        let pending: Vec<Option<u64>> = board
            .column(MissionStatus::Pending)
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(pending, vec![Some(1), Some(3)]);
        assert!(board.column(MissionStatus::Archived).is_empty());
        assert_eq!(board.total(), 3);
    }

    #[test]
    fn test_audit_log_newest_first() {
        let log = AuditLog::build(&[
            audit(1, "Mission", Some(8)),
            audit(2, "Material", None),
            audit(3, "mission", Some(11)),
        ]);
        let ids: Vec<Option<u64>> = log.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![Some(3), Some(1), Some(2)]);
        assert_eq!(log.for_entity("MISSION").len(), 2);
    }

    #[test]
    fn test_ledger_filter() {
        let all = [
            transmutation(1, TransmutationStatus::Pending),
            transmutation(2, TransmutationStatus::Completed),
            transmutation(3, TransmutationStatus::Processing),
        ];
        let ledger = TransmutationLedger::build(&all, None);
        assert_eq!(ledger.rows.len(), 3);
        assert_eq!(ledger.outstanding(), 2);

        let done = TransmutationLedger::build(&all, Some(TransmutationStatus::Completed));
        assert_eq!(done.rows.len(), 1);
        assert_eq!(done.rows[0].id, Some(2));
        assert_eq!(done.outstanding(), 0);
    }
}
