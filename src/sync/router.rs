//! Event router: maps a push event to the stores that must reload.
//!
//! Routing is pure. It returns intents; the hub turns them into reloads.

use std::collections::BTreeSet;

use super::events::{EventKind, PushEvent};
use crate::models::{ResourceKind, Role};

/// Set of stores to reload for one event.
pub type ReloadSet = BTreeSet<ResourceKind>;

/// Stores affected by an event discriminant.
pub fn route_kind(kind: &EventKind) -> ReloadSet {
    let target = match kind {
        EventKind::AuditCreated | EventKind::AuditUpdated => Some(ResourceKind::Audits),
        EventKind::TransmutationUpdated | EventKind::TransmutationDeleted => {
            Some(ResourceKind::Transmutations)
        }
        EventKind::MissionCreated | EventKind::MissionUpdated => Some(ResourceKind::Missions),
        EventKind::Connection | EventKind::Unknown(_) => None,
    };
    target.into_iter().collect()
}

/// Stores affected by an event.
pub fn route(event: &PushEvent) -> ReloadSet {
    route_kind(&event.kind)
}

/// Stores affected by an event that `role` may actually load.
pub fn route_for_role(event: &PushEvent, role: Role) -> ReloadSet {
    route(event)
        .into_iter()
        .filter(|kind| kind.is_visible_to(role))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn event(discriminant: &str) -> PushEvent {
        PushEvent::new(EventKind::from_discriminant(discriminant), Value::Null)
    }

    #[test]
    fn test_audit_events_route_to_audits() {
        assert_eq!(
            route(&event("audit.created")),
            ReloadSet::from([ResourceKind::Audits])
        );
        assert_eq!(
            route(&event("audit.updated")),
            ReloadSet::from([ResourceKind::Audits])
        );
    }

    #[test]
    fn test_transmutation_events_route_to_transmutations() {
        for discriminant in ["transmutation.updated", "transmutation.deleted"] {
            assert_eq!(
                route(&event(discriminant)),
                ReloadSet::from([ResourceKind::Transmutations])
            );
        }
    }

    #[test]
    fn test_mission_events_route_to_missions() {
        for discriminant in ["mission_created", "mission_updated"] {
            assert_eq!(
                route(&event(discriminant)),
                ReloadSet::from([ResourceKind::Missions])
            );
        }
    }

    #[test]
    fn test_unknown_and_welcome_route_nowhere() {
        assert!(route(&event("connection")).is_empty());
        assert!(route(&event("mission.created")).is_empty());
        assert!(route(&event("")).is_empty());
    }

    #[test]
    fn test_role_filter_drops_audits_for_alchemists() {
        assert!(route_for_role(&event("audit.created"), Role::Alchemist).is_empty());
        assert_eq!(
            route_for_role(&event("audit.created"), Role::Supervisor),
            ReloadSet::from([ResourceKind::Audits])
        );
        assert_eq!(
            route_for_role(&event("mission_created"), Role::Alchemist),
            ReloadSet::from([ResourceKind::Missions])
        );
    }
}
