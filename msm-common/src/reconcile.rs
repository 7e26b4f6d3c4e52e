//! Many-to-many association reconciliation
//!
//! Edit forms submit the full set of related keys a parent should end up with
//! (the checked boxes of a checkbox group, or the right-hand side of a dual
//! listbox). The reconciler diffs that selection against the links that exist
//! right now and applies only the additions and removals needed to make the
//! two equal, through whichever [`LinkStore`] owns the relation.
//!
//! Two relations in this workspace go through it:
//! - Instrument ↔ Musician, stored as explicit `plays` rows
//!   ([`crate::db::plays::PlayLinks`])
//! - User ↔ Role, realised through the identity manager
//!   ([`crate::db::users::UserRoleLinks`])
//!
//! # Example
//!
//! ```
//! use msm_common::reconcile::{EmptySelection, Reconciler};
//! use std::collections::BTreeSet;
//!
//! let universe: Vec<i64> = vec![1, 2, 3, 4];
//! let current = BTreeSet::from([1, 3]);
//! let selected = BTreeSet::from([2, 3, 4]);
//!
//! let delta = Reconciler::new(EmptySelection::ClearAll).plan(&universe, &current, Some(&selected));
//! assert_eq!(delta.adds, vec![2, 4]);
//! assert_eq!(delta.removes, vec![1]);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::str::FromStr;
use tracing::debug;

use crate::Result;

/// An entity that can be offered as a selectable option
///
/// Equality of [`Candidate::key`] is the only identity the reconciler uses,
/// on both the read side ([`partition`]) and the write side ([`Reconciler::plan`]).
pub trait Candidate {
    type Key: Ord + Clone + Debug + Send + Sync;

    fn key(&self) -> Self::Key;
}

impl Candidate for i64 {
    type Key = i64;

    fn key(&self) -> i64 {
        *self
    }
}

impl Candidate for String {
    type Key = String;

    fn key(&self) -> String {
        self.clone()
    }
}

/// What an empty (or absent) selection means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptySelection {
    /// Remove every current link
    #[default]
    ClearAll,
    /// Leave the relation untouched
    Ignore,
}

/// One mutation of a parent's link collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp<K> {
    Add(K),
    Remove(K),
}

/// Minimal set of mutations turning the current links into the selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDelta<K> {
    /// `selected \ current`, in universe order
    pub adds: Vec<K>,
    /// `current \ selected`, in universe order
    pub removes: Vec<K>,
}

impl<K> Default for LinkDelta<K> {
    fn default() -> Self {
        Self {
            adds: Vec::new(),
            removes: Vec::new(),
        }
    }
}

impl<K: Clone> LinkDelta<K> {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.removes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adds.len() + self.removes.len()
    }

    /// Operations in application order: removals first, then additions
    pub fn ops(&self) -> impl Iterator<Item = LinkOp<K>> + '_ {
        self.removes
            .iter()
            .cloned()
            .map(LinkOp::Remove)
            .chain(self.adds.iter().cloned().map(LinkOp::Add))
    }
}

/// Persistence gateway for one many-to-many relation
///
/// Implementations hold whatever transactional scope they write through.
/// Nothing is durable until [`LinkStore::commit`]; dropping the store without
/// committing discards every applied operation.
#[async_trait]
pub trait LinkStore: Send {
    type ParentKey: Debug + Send + Sync;
    type RelatedKey: Ord + Clone + Debug + Send + Sync;

    /// Keys currently linked to `parent`
    async fn list_links(&mut self, parent: &Self::ParentKey) -> Result<BTreeSet<Self::RelatedKey>>;

    async fn add_link(&mut self, parent: &Self::ParentKey, related: &Self::RelatedKey) -> Result<()>;

    async fn remove_link(
        &mut self,
        parent: &Self::ParentKey,
        related: &Self::RelatedKey,
    ) -> Result<()>;

    async fn commit(self) -> Result<()>
    where
        Self: Sized;
}

/// Diffs and applies link selections
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    empty_selection: EmptySelection,
}

impl Reconciler {
    pub fn new(empty_selection: EmptySelection) -> Self {
        Self { empty_selection }
    }

    pub fn empty_selection(&self) -> EmptySelection {
        self.empty_selection
    }

    /// Compute the delta from `current` to `selected`
    ///
    /// Selected keys that are not in `universe` are dropped first, so a
    /// selection made only of unknown keys counts as empty. `universe` is
    /// walked in its own order so the result never depends on the order the
    /// client submitted keys in.
    pub fn plan<C: Candidate>(
        &self,
        universe: &[C],
        current: &BTreeSet<C::Key>,
        selected: Option<&BTreeSet<C::Key>>,
    ) -> LinkDelta<C::Key> {
        let known: BTreeSet<C::Key> = match selected {
            Some(selected) => universe
                .iter()
                .map(Candidate::key)
                .filter(|key| selected.contains(key))
                .collect(),
            None => BTreeSet::new(),
        };

        if known.is_empty() {
            return match self.empty_selection {
                EmptySelection::Ignore => LinkDelta::default(),
                EmptySelection::ClearAll => clear_all(universe, current),
            };
        }

        let mut delta = LinkDelta::default();
        for key in universe.iter().map(Candidate::key) {
            match (known.contains(&key), current.contains(&key)) {
                (true, false) => delta.adds.push(key),
                (false, true) => delta.removes.push(key),
                _ => {}
            }
        }
        delta
    }

    /// Apply a planned delta through `store` without committing
    ///
    /// Stops at the first gateway error; the caller must treat the whole
    /// reconciliation as failed and drop the store to roll back.
    pub async fn apply<S>(
        &self,
        store: &mut S,
        parent: &S::ParentKey,
        delta: &LinkDelta<S::RelatedKey>,
    ) -> Result<()>
    where
        S: LinkStore + ?Sized,
    {
        for op in delta.ops() {
            debug!(?parent, ?op, "Applying link operation");
            match op {
                LinkOp::Add(key) => store.add_link(parent, &key).await?,
                LinkOp::Remove(key) => store.remove_link(parent, &key).await?,
            }
        }
        Ok(())
    }

    /// Read the current links fresh, plan against `selected` and apply
    pub async fn reconcile<S, C>(
        &self,
        store: &mut S,
        parent: &S::ParentKey,
        universe: &[C],
        selected: Option<&BTreeSet<C::Key>>,
    ) -> Result<LinkDelta<C::Key>>
    where
        S: LinkStore<RelatedKey = C::Key> + ?Sized,
        C: Candidate + Sync,
    {
        let current = store.list_links(parent).await?;
        let delta = self.plan(universe, &current, selected);
        self.apply(store, parent, &delta).await?;

        debug!(
            ?parent,
            adds = delta.adds.len(),
            removes = delta.removes.len(),
            "Reconciled links"
        );
        Ok(delta)
    }
}

// Universe order first, then stale links the universe no longer offers.
fn clear_all<C: Candidate>(universe: &[C], current: &BTreeSet<C::Key>) -> LinkDelta<C::Key> {
    let mut removes: Vec<C::Key> = universe
        .iter()
        .map(Candidate::key)
        .filter(|key| current.contains(key))
        .collect();
    let seen: BTreeSet<C::Key> = removes.iter().cloned().collect();
    removes.extend(current.iter().filter(|key| !seen.contains(*key)).cloned());

    LinkDelta {
        adds: Vec::new(),
        removes,
    }
}

/// Universe split into the options a parent has and the ones it could add
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition<T> {
    pub assigned: Vec<T>,
    pub available: Vec<T>,
}

impl<T> Partition<T> {
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Partition<U> {
        Partition {
            assigned: self.assigned.into_iter().map(&mut f).collect(),
            available: self.available.into_iter().map(f).collect(),
        }
    }
}

/// Split `universe` by membership in `current`, keeping universe order
pub fn partition<C>(universe: &[C], current: &BTreeSet<C::Key>) -> Partition<C>
where
    C: Candidate + Clone,
{
    let (assigned, available) = universe
        .iter()
        .cloned()
        .partition(|candidate| current.contains(&candidate.key()));
    Partition {
        assigned,
        available,
    }
}

/// Parse string-encoded form keys into the relation's key type
///
/// `None` stays `None` (nothing submitted). Entries that fail to parse are
/// dropped.
pub fn parse_selection<K>(raw: Option<&[String]>) -> Option<BTreeSet<K>>
where
    K: FromStr + Ord,
{
    let raw = raw?;
    Some(
        raw.iter()
            .filter_map(|value| match value.trim().parse::<K>() {
                Ok(key) => Some(key),
                Err(_) => {
                    debug!("Dropping unparsable selection key {:?}", value);
                    None
                }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    /// In-memory gateway recording every call
    #[derive(Default)]
    struct MemoryLinks {
        links: BTreeSet<(u32, i64)>,
        applied: Vec<LinkOp<i64>>,
        fail_on_add: Option<i64>,
    }

    impl MemoryLinks {
        fn with(parent: u32, keys: &[i64]) -> Self {
            Self {
                links: keys.iter().map(|k| (parent, *k)).collect(),
                ..Default::default()
            }
        }

        fn keys(&self, parent: u32) -> BTreeSet<i64> {
            self.links
                .iter()
                .filter(|(p, _)| *p == parent)
                .map(|(_, k)| *k)
                .collect()
        }
    }

    #[async_trait]
    impl LinkStore for MemoryLinks {
        type ParentKey = u32;
        type RelatedKey = i64;

        async fn list_links(&mut self, parent: &u32) -> Result<BTreeSet<i64>> {
            Ok(self.keys(*parent))
        }

        async fn add_link(&mut self, parent: &u32, related: &i64) -> Result<()> {
            if self.fail_on_add == Some(*related) {
                return Err(Error::Integrity {
                    kind: crate::IntegrityKind::Unique,
                    message: "UNIQUE constraint failed: plays".to_string(),
                });
            }
            self.applied.push(LinkOp::Add(*related));
            self.links.insert((*parent, *related));
            Ok(())
        }

        async fn remove_link(&mut self, parent: &u32, related: &i64) -> Result<()> {
            self.applied.push(LinkOp::Remove(*related));
            self.links.remove(&(*parent, *related));
            Ok(())
        }

        async fn commit(self) -> Result<()> {
            Ok(())
        }
    }

    fn set(keys: &[i64]) -> BTreeSet<i64> {
        keys.iter().copied().collect()
    }

    #[test]
    fn test_plan_mixed_selection() {
        let delta = Reconciler::default().plan(&[1i64, 2, 3, 4], &set(&[1, 3]), Some(&set(&[2, 3, 4])));

        assert_eq!(delta.adds, vec![2, 4]);
        assert_eq!(delta.removes, vec![1]);
    }

    #[test]
    fn test_plan_empty_selection_clears_all() {
        let delta = Reconciler::new(EmptySelection::ClearAll).plan(&[1i64, 2, 3], &set(&[1, 2, 3]), Some(&set(&[])));

        assert!(delta.adds.is_empty());
        assert_eq!(delta.removes, vec![1, 2, 3]);
    }

    #[test]
    fn test_plan_absent_selection_matches_empty() {
        let reconciler = Reconciler::new(EmptySelection::ClearAll);
        let current = set(&[2, 3]);

        assert_eq!(
            reconciler.plan(&[1i64, 2, 3], &current, None),
            reconciler.plan(&[1i64, 2, 3], &current, Some(&set(&[]))),
        );
    }

    #[test]
    fn test_plan_ignore_policy_leaves_links() {
        let reconciler = Reconciler::new(EmptySelection::Ignore);

        assert!(reconciler.plan(&[1i64, 2, 3], &set(&[1, 2]), None).is_empty());
        assert!(reconciler.plan(&[1i64, 2, 3], &set(&[1, 2]), Some(&set(&[]))).is_empty());
    }

    #[test]
    fn test_plan_unknown_keys_are_ignored() {
        let universe = [1i64, 2, 3];
        let current = set(&[1]);

        for policy in [EmptySelection::ClearAll, EmptySelection::Ignore] {
            let reconciler = Reconciler::new(policy);
            assert_eq!(
                reconciler.plan(&universe, &current, Some(&set(&[2, 99]))),
                reconciler.plan(&universe, &current, Some(&set(&[2]))),
            );
            // Only unknown keys behaves like nothing submitted
            assert_eq!(
                reconciler.plan(&universe, &current, Some(&set(&[99, 100]))),
                reconciler.plan(&universe, &current, None),
            );
        }
    }

    #[test]
    fn test_plan_follows_universe_order() {
        let universe = [4i64, 1, 3, 2];
        let delta = Reconciler::default().plan(&universe, &set(&[3, 2]), Some(&set(&[1, 4])));

        assert_eq!(delta.adds, vec![4, 1]);
        assert_eq!(delta.removes, vec![3, 2]);
    }

    #[test]
    fn test_clear_all_removes_stale_links_outside_universe() {
        let delta = Reconciler::default().plan(&[2i64, 1], &set(&[1, 2, 7]), None);

        assert_eq!(delta.removes, vec![2, 1, 7]);
    }

    #[test]
    fn test_plan_is_minimal_and_complete() {
        let universe = [1i64, 2, 3, 4];
        let subsets: Vec<BTreeSet<i64>> = (0u8..16)
            .map(|mask| universe.iter().copied().filter(|k| mask & (1 << (k - 1)) != 0).collect())
            .collect();

        let reconciler = Reconciler::default();
        for current in &subsets {
            for selected in &subsets {
                let delta = reconciler.plan(&universe, current, Some(selected));

                let adds: BTreeSet<i64> = delta.adds.iter().copied().collect();
                let removes: BTreeSet<i64> = delta.removes.iter().copied().collect();
                assert_eq!(adds, selected - current);
                assert_eq!(removes, current - selected);

                let after: BTreeSet<i64> = &(current - &removes) | &adds;
                assert_eq!(&after, selected);
            }
        }
    }

    #[test]
    fn test_partition_round_trip() {
        let universe = [5i64, 6, 7, 8];
        let current = set(&[5, 7]);

        let partition = partition(&universe, &current);
        assert_eq!(partition.assigned, vec![5, 7]);
        assert_eq!(partition.available, vec![6, 8]);

        let resubmitted: BTreeSet<i64> = partition.assigned.iter().copied().collect();
        assert!(Reconciler::default()
            .plan(&universe, &current, Some(&resubmitted))
            .is_empty());
    }

    #[test]
    fn test_parse_selection_drops_garbage() {
        let raw = vec!["3".to_string(), " 1 ".to_string(), "abc".to_string(), String::new()];

        assert_eq!(parse_selection::<i64>(Some(raw.as_slice())), Some(set(&[1, 3])));
        assert_eq!(parse_selection::<i64>(None), None);
    }

    #[tokio::test]
    async fn test_reconcile_applies_delta() {
        let mut store = MemoryLinks::with(9, &[1, 3]);

        let delta = Reconciler::default()
            .reconcile(&mut store, &9, &[1i64, 2, 3, 4], Some(&set(&[2, 3, 4])))
            .await
            .unwrap();

        assert_eq!(delta.len(), 3);
        assert_eq!(store.keys(9), set(&[2, 3, 4]));
        assert_eq!(
            store.applied,
            vec![LinkOp::Remove(1), LinkOp::Add(2), LinkOp::Add(4)]
        );
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let mut store = MemoryLinks::with(1, &[1]);
        let reconciler = Reconciler::default();
        let selected = set(&[2, 3]);

        reconciler
            .reconcile(&mut store, &1, &[1i64, 2, 3], Some(&selected))
            .await
            .unwrap();
        let second = reconciler
            .reconcile(&mut store, &1, &[1i64, 2, 3], Some(&selected))
            .await
            .unwrap();

        assert!(second.is_empty());
        assert_eq!(store.keys(1), selected);
    }

    #[tokio::test]
    async fn test_reconcile_leaves_other_parents_alone() {
        let mut store = MemoryLinks::with(1, &[1, 2]);
        store.links.insert((2, 1));

        Reconciler::default()
            .reconcile(&mut store, &1, &[1i64, 2], None)
            .await
            .unwrap();

        assert!(store.keys(1).is_empty());
        assert_eq!(store.keys(2), set(&[1]));
    }

    #[tokio::test]
    async fn test_reconcile_propagates_gateway_error() {
        let mut store = MemoryLinks::with(1, &[]);
        store.fail_on_add = Some(2);

        let err = Reconciler::default()
            .reconcile(&mut store, &1, &[1i64, 2, 3], Some(&set(&[1, 2, 3])))
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
        // Stopped at the failing op
        assert_eq!(store.applied, vec![LinkOp::Add(1)]);
    }
}
