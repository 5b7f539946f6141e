//! Dashboard read model.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{
    Alchemist, AuditEntry, Material, Mission, MissionStatus, ResourceKind, Role, Transmutation,
    TransmutationStatus,
};

/// How many materials the inventory chart shows.
const TOP_MATERIALS: usize = 8;

/// One total shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryCard {
    pub resource: ResourceKind,
    pub count: usize,
}

/// A material and its stock level, for the inventory chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialLevel {
    pub name: String,
    pub quantity: f64,
}

/// Everything the dashboard renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub role: Role,
    /// Cards in display order; alchemists and audits only for supervisors
    pub cards: Vec<SummaryCard>,
    pub missions_by_status: BTreeMap<MissionStatus, usize>,
    pub transmutations_by_status: BTreeMap<TransmutationStatus, usize>,
    /// Largest stocks first
    pub materials: Vec<MaterialLevel>,
}

impl DashboardSummary {
    pub fn build(
        role: Role,
        alchemists: &[Alchemist],
        missions: &[Mission],
        materials: &[Material],
        transmutations: &[Transmutation],
        audits: &[AuditEntry],
    ) -> Self {
        let counts = [
            (ResourceKind::Alchemists, alchemists.len()),
            (ResourceKind::Missions, missions.len()),
            (ResourceKind::Materials, materials.len()),
            (ResourceKind::Transmutations, transmutations.len()),
            (ResourceKind::Audits, audits.len()),
        ];
        let cards = counts
            .into_iter()
            .filter(|(kind, _)| kind.is_visible_to(role))
            .map(|(resource, count)| SummaryCard { resource, count })
            .collect();

        let mut missions_by_status = BTreeMap::new();
        for mission in missions {
            *missions_by_status.entry(mission.status).or_insert(0) += 1;
        }

        let mut transmutations_by_status = BTreeMap::new();
        for t in transmutations {
            *transmutations_by_status.entry(t.status).or_insert(0) += 1;
        }

        let mut levels: Vec<MaterialLevel> = materials
            .iter()
            .map(|m| MaterialLevel {
                name: m.name.clone(),
                quantity: (m.quantity * 100.0).round() / 100.0,
            })
            .collect();
        levels.sort_by(|a, b| b.quantity.total_cmp(&a.quantity));
        levels.truncate(TOP_MATERIALS);

        Self {
            role,
            cards,
            missions_by_status,
            transmutations_by_status,
            materials: levels,
        }
    }

    /// Count shown on the card for `resource`, if that card is visible.
    pub fn count(&self, resource: ResourceKind) -> Option<usize> {
        self.cards
            .iter()
            .find(|c| c.resource == resource)
            .map(|c| c.count)
    }

    /// One-line human rendering.
    pub fn to_line(&self) -> String {
        self.cards
            .iter()
            .map(|c| format!("{}={}", c.resource, c.count))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
