use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Writes needed to move an observed state to a desired one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDiff<K: Eq + Hash, V> {
    /// Entries missing from the observed state or holding a different value.
    pub to_put: HashMap<K, V>,
    /// Observed keys the desired state does not contain.
    pub to_delete: HashSet<K>,
}

impl<K: Eq + Hash, V> Default for StateDiff<K, V> {
    fn default() -> Self {
        Self {
            to_put: HashMap::new(),
            to_delete: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> StateDiff<K, V> {
    pub fn is_empty(&self) -> bool {
        self.to_put.is_empty() && self.to_delete.is_empty()
    }

    /// Apply to a local copy of the state: deletions first, then puts.
    pub fn apply_to(&self, state: &mut HashMap<K, V>) {
        for key in &self.to_delete {
            state.remove(key);
        }
        for (key, value) in &self.to_put {
            state.insert(key.clone(), value.clone());
        }
    }
}

/// Diff two key/value states. Pure; no I/O.
pub fn compute_overlap<K, V>(desired: &HashMap<K, V>, observed: &HashMap<K, V>) -> StateDiff<K, V>
where
    K: Eq + Hash + Clone,
    V: PartialEq + Clone,
{
    let to_put = desired
        .iter()
        .filter(|(k, v)| observed.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let to_delete = observed
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect();
    StateDiff { to_put, to_delete }
}

/// Project `desired` through `key_fn`/`value_fn` and diff against `observed`.
/// On duplicate keys the later item wins.
pub fn diff_projected<T, K, V, FK, FV>(
    desired: &[T],
    key_fn: FK,
    value_fn: FV,
    observed: &HashMap<K, V>,
) -> StateDiff<K, V>
where
    K: Eq + Hash + Clone,
    V: PartialEq + Clone,
    FK: Fn(&T) -> K,
    FV: Fn(&T) -> V,
{
    let desired: HashMap<K, V> = desired.iter().map(|t| (key_fn(t), value_fn(t))).collect();
    compute_overlap(&desired, observed)
}
