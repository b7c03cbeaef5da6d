use std::collections::HashSet;
use std::rc::Rc;

use crate::ornament::{Fingerprint, Ornament};

pub const POLL_INTERVAL_MS: u32 = 5_000;

/// What started a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    Mount,
    Timer,
    Manual,
    AfterSave,
    AfterDelete,
}

impl PollTrigger {
    /// Timer cycles run under the `updating` flag and never surface errors.
    pub fn is_silent(self) -> bool {
        matches!(self, PollTrigger::Timer)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncFlags {
    pub loading: bool,
    pub updating: bool,
}

impl SyncFlags {
    pub fn busy(&self) -> bool {
        self.loading || self.updating
    }

    /// Marks the cycle as started; `false` means the trigger must be skipped.
    pub fn try_begin(&mut self, trigger: PollTrigger) -> bool {
        if trigger.is_silent() {
            if self.busy() {
                return false;
            }
            self.updating = true;
        } else {
            self.loading = true;
        }
        true
    }

    pub fn finish(&mut self, trigger: PollTrigger) {
        if trigger.is_silent() {
            self.updating = false;
        } else {
            self.loading = false;
        }
    }
}

/// Keeps the first ornament seen for each fingerprint, preserving order.
pub fn dedupe_ornaments(ornaments: Vec<Ornament>) -> Vec<Ornament> {
    let mut seen = HashSet::with_capacity(ornaments.len());
    ornaments
        .into_iter()
        .filter(|ornament| seen.insert(ornament.fingerprint()))
        .collect()
}

pub fn count_for_user(ornaments: &[Ornament], user_id: &str) -> usize {
    ornaments
        .iter()
        .filter(|ornament| ornament.belongs_to(user_id))
        .count()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixedOrnament {
    pub fingerprint: Fingerprint,
    pub ornament: Ornament,
}

/// The rendered set of persisted ornaments. The editing node is never part of it.
#[derive(Debug, Clone, Default)]
pub struct FixedLayer {
    nodes: Rc<Vec<FixedOrnament>>,
    revision: u64,
}

impl FixedLayer {
    pub fn nodes(&self) -> Rc<Vec<FixedOrnament>> {
        Rc::clone(&self.nodes)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.nodes.iter().any(|node| &node.fingerprint == fingerprint)
    }

    /// Clears every fixed node and renders `ornaments`, skipping fingerprints
    /// already present (either earlier in this pass or in `occupied`).
    fn rebuild(&mut self, ornaments: &[Ornament], occupied: Option<&Fingerprint>) -> RenderStats {
        let removed = self.nodes.len();
        let mut present: HashSet<Fingerprint> = occupied.cloned().into_iter().collect();
        let mut nodes = Vec::with_capacity(ornaments.len());
        let mut skipped = 0;
        for ornament in ornaments {
            let fingerprint = ornament.fingerprint();
            if !present.insert(fingerprint.clone()) {
                skipped += 1;
                continue;
            }
            nodes.push(FixedOrnament {
                fingerprint,
                ornament: ornament.clone(),
            });
        }
        let inserted = nodes.len();
        self.nodes = Rc::new(nodes);
        self.revision = self.revision.wrapping_add(1);
        RenderStats {
            removed,
            inserted,
            skipped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub removed: usize,
    pub inserted: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Unchanged,
    Changed {
        stats: RenderStats,
        own_count: usize,
        total: usize,
    },
}

/// Last known list plus the layer rendered from it.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    last_known: Vec<Ornament>,
    layer: FixedLayer,
    own_count: usize,
    last_update_ms: Option<i64>,
}

impl SyncState {
    pub fn layer(&self) -> &FixedLayer {
        &self.layer
    }

    pub fn last_known(&self) -> &[Ornament] {
        &self.last_known
    }

    pub fn own_count(&self) -> usize {
        self.own_count
    }

    pub fn total(&self) -> usize {
        self.last_known.len()
    }

    pub fn last_update_ms(&self) -> Option<i64> {
        self.last_update_ms
    }

    pub(crate) fn set_own_count(&mut self, count: usize) {
        self.own_count = count;
    }

    /// Re-renders the last known list with `held` left to the editing node.
    pub(crate) fn hold(&mut self, held: Option<&Fingerprint>) -> RenderStats {
        let list = std::mem::take(&mut self.last_known);
        let stats = self.layer.rebuild(&list, held);
        self.last_known = list;
        stats
    }

    pub fn find(&self, fingerprint: &Fingerprint) -> Option<&Ornament> {
        self.layer
            .nodes
            .iter()
            .find(|node| &node.fingerprint == fingerprint)
            .map(|node| &node.ornament)
    }

    /// Applies one fetched list. `editing` is the fingerprint carried by the
    /// editing node, if any; that ornament is left to the editing node.
    pub fn reconcile(
        &mut self,
        fetched: Vec<Ornament>,
        user_id: &str,
        editing: Option<&Fingerprint>,
        now_ms: i64,
    ) -> Reconciled {
        let unique = dedupe_ornaments(fetched);
        if unique == self.last_known {
            return Reconciled::Unchanged;
        }
        let stats = self.layer.rebuild(&unique, editing);
        self.own_count = count_for_user(&unique, user_id);
        self.last_known = unique;
        self.last_update_ms = Some(now_ms);
        Reconciled::Changed {
            stats,
            own_count: self.own_count,
            total: self.last_known.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ornament(user: &str, x: &str, src: &str) -> Ornament {
        Ornament {
            user_id: user.into(),
            src: src.into(),
            x: x.into(),
            y: "0px".into(),
            width: "120px".into(),
            height: "120px".into(),
            transform: String::new(),
            timestamp: 1,
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let first = ornament("a", "1px", "data:one");
        let mut dup = first.clone();
        dup.timestamp = 99;
        let other = ornament("b", "1px", "data:one");
        let out = dedupe_ornaments(vec![first.clone(), dup, other.clone()]);
        assert_eq!(out, vec![first, other]);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let list = vec![
            ornament("a", "1px", "data:one"),
            ornament("a", "1px", "data:one"),
            ornament("a", "2px", "data:one"),
        ];
        let once = dedupe_ornaments(list);
        let twice = dedupe_ornaments(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn timer_skips_while_busy() {
        let mut flags = SyncFlags::default();
        assert!(flags.try_begin(PollTrigger::Manual));
        assert!(!flags.try_begin(PollTrigger::Timer));
        assert!(flags.try_begin(PollTrigger::Manual));
        flags.finish(PollTrigger::Manual);
        assert!(flags.try_begin(PollTrigger::Timer));
        assert!(!flags.try_begin(PollTrigger::Timer));
        flags.finish(PollTrigger::Timer);
        assert!(!flags.busy());
    }

    #[test]
    fn identical_poll_leaves_layer_untouched() {
        let mut state = SyncState::default();
        let list = vec![ornament("a", "1px", "data:one"), ornament("b", "2px", "data:two")];
        let first = state.reconcile(list.clone(), "a", None, 10);
        assert!(matches!(first, Reconciled::Changed { own_count: 1, total: 2, .. }));
        let revision = state.layer().revision();
        let nodes = state.layer().nodes();

        let second = state.reconcile(list, "a", None, 20);
        assert_eq!(second, Reconciled::Unchanged);
        assert_eq!(state.layer().revision(), revision);
        assert!(Rc::ptr_eq(&nodes, &state.layer().nodes()));
        assert_eq!(state.last_update_ms(), Some(10));
    }

    #[test]
    fn duplicates_in_response_do_not_count_as_change() {
        let mut state = SyncState::default();
        let a = ornament("a", "1px", "data:one");
        state.reconcile(vec![a.clone()], "a", None, 1);
        let outcome = state.reconcile(vec![a.clone(), a], "a", None, 2);
        assert_eq!(outcome, Reconciled::Unchanged);
    }

    #[test]
    fn changed_list_replaces_every_fixed_node() {
        let mut state = SyncState::default();
        state.reconcile(vec![ornament("a", "1px", "data:one")], "a", None, 1);
        let outcome = state.reconcile(
            vec![ornament("a", "1px", "data:one"), ornament("a", "3px", "data:three")],
            "a",
            None,
            2,
        );
        match outcome {
            Reconciled::Changed { stats, own_count, total } => {
                assert_eq!(stats.removed, 1);
                assert_eq!(stats.inserted, 2);
                assert_eq!(own_count, 2);
                assert_eq!(total, 2);
            }
            Reconciled::Unchanged => panic!("expected change"),
        }
    }

    #[test]
    fn ornament_held_by_editing_node_is_not_rendered_twice() {
        let mut state = SyncState::default();
        let held = ornament("a", "1px", "data:one");
        let fp = held.fingerprint();
        let outcome = state.reconcile(
            vec![held, ornament("b", "5px", "data:two")],
            "a",
            Some(&fp),
            1,
        );
        let Reconciled::Changed { stats, own_count, .. } = outcome else {
            panic!("expected change");
        };
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(own_count, 1);
        assert!(!state.layer().contains(&fp));
    }

    #[test]
    fn hold_hides_and_restores_one_node() {
        let mut state = SyncState::default();
        let held = ornament("a", "1px", "data:one");
        let fp = held.fingerprint();
        state.reconcile(vec![held, ornament("b", "2px", "data:two")], "a", None, 1);
        state.hold(Some(&fp));
        assert!(!state.layer().contains(&fp));
        assert_eq!(state.total(), 2);
        state.hold(None);
        assert!(state.layer().contains(&fp));
        assert_eq!(state.layer().len(), 2);
    }
}
