//! Registry of live routines.
//!
//! A routine is registered exactly while it is active; removal is the only
//! termination signal a runner observes.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{NewRoutine, Routine, RoutineId, RoutineSnapshot};
use crate::{observability::metrics, store::ChannelId};

/// Shared, insertion-ordered collection of active routines.
#[derive(Clone, Default)]
pub struct RoutineRegistry {
    routines: Arc<RwLock<Vec<Arc<Routine>>>>,
}

impl RoutineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a routine with a fresh id and zeroed counters.
    pub fn add(&self, new: NewRoutine) -> Arc<Routine> {
        let routine = Arc::new(Routine::new(new));
        let mut routines = self.routines.write();
        routines.push(routine.clone());
        metrics::set_active_routines(routines.len());
        routine
    }

    pub fn is_active(&self, id: &RoutineId) -> bool {
        self.routines.read().iter().any(|r| r.id == *id)
    }

    pub fn get(&self, id: &RoutineId) -> Option<Arc<Routine>> {
        self.routines.read().iter().find(|r| r.id == *id).cloned()
    }

    /// Ids of active routines starting with `prefix`, e.g. a short id from the status table.
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<RoutineId> {
        self.routines
            .read()
            .iter()
            .filter(|r| r.id.has_prefix(prefix))
            .map(|r| r.id)
            .collect()
    }

    /// Deregister one routine. Returns whether anything was removed.
    pub fn remove_by_id(&self, id: &RoutineId) -> bool {
        let mut routines = self.routines.write();
        let Some(index) = routines.iter().position(|r| r.id == *id) else {
            return false;
        };
        let routine = routines.remove(index);
        routine.cancel();
        metrics::set_active_routines(routines.len());
        true
    }

    /// Deregister every routine purging `channel`. Returns how many were removed.
    pub fn remove_by_channel(&self, channel: &ChannelId) -> usize {
        self.remove_where(|r| r.channel_id == *channel)
    }

    /// Deregister every routine. Returns how many were removed.
    pub fn clear(&self) -> usize {
        self.remove_where(|_| true)
    }

    fn remove_where(&self, predicate: impl Fn(&Routine) -> bool) -> usize {
        let mut routines = self.routines.write();
        let before = routines.len();
        routines.retain(|r| {
            if predicate(r) {
                r.cancel();
                false
            } else {
                true
            }
        });
        metrics::set_active_routines(routines.len());
        before - routines.len()
    }

    /// Point-in-time snapshots, in registration order.
    pub fn list(&self) -> Vec<RoutineSnapshot> {
        self.routines.read().iter().map(|r| r.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.routines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::Threshold,
        store::{ChannelInfo, ChannelKind},
    };

    fn new_routine(channel: &str, threshold: Threshold) -> NewRoutine {
        NewRoutine {
            channel: ChannelInfo {
                id: ChannelId::new(channel),
                name: channel.to_string(),
                kind: ChannelKind::Text,
            },
            report_to: ChannelId::new("requests"),
            threshold,
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let registry = RoutineRegistry::new();
        let routine = registry.add(new_routine("a", Threshold::max_age(30).unwrap()));

        assert!(registry.is_active(&routine.id));
        assert_eq!(registry.get(&routine.id).unwrap().channel_id.as_str(), "a");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_by_id_is_idempotent() {
        let registry = RoutineRegistry::new();
        let routine = registry.add(new_routine("a", Threshold::max_age(30).unwrap()));

        assert!(registry.remove_by_id(&routine.id));
        assert!(!registry.is_active(&routine.id));
        assert!(routine.cancel_token().is_cancelled());
        assert!(!registry.remove_by_id(&routine.id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_by_channel_counts_both_modes() {
        let registry = RoutineRegistry::new();
        registry.add(new_routine("a", Threshold::max_age(30).unwrap()));
        registry.add(new_routine("a", Threshold::interval(100, 200)));
        let other = registry.add(new_routine("b", Threshold::max_age(7).unwrap()));

        let channel = ChannelId::new("a");
        assert_eq!(registry.remove_by_channel(&channel), 2);
        assert_eq!(registry.remove_by_channel(&channel), 0);
        assert!(registry.is_active(&other.id));
    }

    #[test]
    fn test_find_by_short_id() {
        let registry = RoutineRegistry::new();
        let a = registry.add(new_routine("a", Threshold::max_age(1).unwrap()));
        registry.add(new_routine("b", Threshold::max_age(1).unwrap()));

        assert_eq!(registry.find_by_prefix(&a.id.short()), vec![a.id]);
        assert_eq!(
            registry.find_by_prefix(&a.id.short().to_uppercase()),
            vec![a.id]
        );
        assert_eq!(registry.find_by_prefix("").len(), 0);
        assert_eq!(registry.find_by_prefix("-").len(), 0);

        registry.remove_by_id(&a.id);
        assert!(registry.find_by_prefix(&a.id.short()).is_empty());
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let registry = RoutineRegistry::new();
        for channel in ["c", "a", "b"] {
            registry.add(new_routine(channel, Threshold::max_age(1).unwrap()));
        }
        let channels: Vec<String> = registry
            .list()
            .into_iter()
            .map(|s| s.channel_id.to_string())
            .collect();
        assert_eq!(channels, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_clear_cancels_everything() {
        let registry = RoutineRegistry::new();
        let a = registry.add(new_routine("a", Threshold::max_age(1).unwrap()));
        let b = registry.add(new_routine("b", Threshold::interval(1, 2)));

        assert_eq!(registry.clear(), 2);
        assert!(a.cancel_token().is_cancelled());
        assert!(b.cancel_token().is_cancelled());
        assert_eq!(registry.clear(), 0);
    }

    #[test]
    fn test_concurrent_adds_and_removes() {
        let registry = RoutineRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let routine = registry.add(new_routine(
                            &format!("c{i}"),
                            Threshold::max_age(1).unwrap(),
                        ));
                        assert!(registry.remove_by_id(&routine.id));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
