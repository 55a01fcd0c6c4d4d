//! # Topological Sort
//!
//! Orders a set of keys so that every key comes after the keys it depends on.
//! Client classes use this so that a class whose test references
//! `member('other')` is always evaluated after `other`.
//!
//! Keys with no ordering constraint between them keep the order in which they
//! were added, so the result is deterministic.
//!
//! ```rust
//! use topo_sort::DependencyTree;
//!
//! let mut tree = DependencyTree::new();
//! tree.add("c", ["a", "b"]);
//! tree.add("a", []);
//! tree.add("b", ["a"]);
//! assert_eq!(tree.topological_sort().unwrap(), vec!["a", "b", "c"]);
//! ```
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::{
    collections::{BTreeSet, HashMap},
    fmt::Debug,
    hash::Hash,
};

use thiserror::Error;

/// keeps track of # of unresolved parents and the nodes waiting on this one
#[derive(Debug)]
struct Node {
    num_parents: usize,
    children: Vec<usize>,
}

/// Holds keys and the keys each one depends on
#[derive(Debug)]
pub struct DependencyTree<K> {
    keys: Vec<K>,
    deps: Vec<Vec<K>>,
    index: HashMap<K, usize>,
}

impl<K> Default for DependencyTree<K> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            deps: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<K> DependencyTree<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create a new `DependencyTree`
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` with the list of keys it depends on. Adding the same key
    /// twice replaces its dependency list. A key depending on itself is ignored.
    pub fn add<U>(&mut self, key: K, deps: U)
    where
        U: IntoIterator<Item = K>,
    {
        let deps = deps.into_iter().filter(|d| d != &key).collect::<Vec<_>>();
        match self.index.get(&key) {
            Some(&i) => self.deps[i] = deps,
            None => {
                self.index.insert(key.clone(), self.keys.len());
                self.keys.push(key);
                self.deps.push(deps);
            }
        }
    }

    /// number of keys added
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// true if no keys were added
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Sort the keys so that dependencies come first.
    /// Returns Err if a dependency was never added or if there is a cycle.
    pub fn topological_sort(self) -> Result<Vec<K>, TopoSortError> {
        let DependencyTree { keys, deps, index } = self;
        let mut nodes = (0..keys.len())
            .map(|_| Node {
                num_parents: 0,
                children: Vec::new(),
            })
            .collect::<Vec<_>>();

        for (child, parents) in deps.iter().enumerate() {
            for parent in parents {
                let parent = *index
                    .get(parent)
                    .ok_or_else(|| TopoSortError::MissingEntry(format!("{parent:?}")))?;
                nodes[parent].children.push(child);
                nodes[child].num_parents += 1;
            }
        }

        // lowest insertion index first, keeps unconstrained keys in order
        let mut ready = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.num_parents == 0)
            .map(|(i, _)| i)
            .collect::<BTreeSet<_>>();
        let mut sorted = Vec::with_capacity(keys.len());

        while let Some(cur) = ready.pop_first() {
            let children = std::mem::take(&mut nodes[cur].children);
            for child in children {
                nodes[child].num_parents -= 1;
                if nodes[child].num_parents == 0 {
                    ready.insert(child);
                }
            }
            sorted.push(cur);
        }

        if sorted.len() != keys.len() {
            let stuck = nodes
                .iter()
                .position(|n| n.num_parents > 0)
                .map(|i| format!("{:?}", keys[i]))
                .unwrap_or_default();
            return Err(TopoSortError::CycleDetected(stuck));
        }

        let mut keys = keys.into_iter().map(Some).collect::<Vec<_>>();
        Ok(sorted.into_iter().filter_map(|i| keys[i].take()).collect())
    }
}

/// Error type for topological sort
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TopoSortError {
    /// cycle found, includes one of the keys taking part in it
    #[error("cycle detected in dependency map at {0}")]
    CycleDetected(String),
    /// a dependency was referenced but never added
    #[error("entry {0} not found in dependency map")]
    MissingEntry(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_tree() {
        let mut tree = DependencyTree::new();
        tree.add("a", []);
        tree.add("b", ["a"]);
        tree.add("c", ["a"]);
        tree.add("d", ["b", "c"]);
        assert_eq!(tree.topological_sort().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn insertion_order_kept_for_independent_keys() {
        let mut tree = DependencyTree::new();
        tree.add("d", ["b", "c", "e"]);
        tree.add("a", []);
        tree.add("c", ["a"]);
        tree.add("e", ["a", "c"]);
        tree.add("b", ["a"]);
        assert_eq!(
            tree.topological_sort().unwrap(),
            vec!["a", "c", "e", "b", "d"]
        );
    }

    #[test]
    fn find_cycle() {
        let mut tree = DependencyTree::new();
        tree.add("a", []);
        tree.add("b", ["a"]);
        // cycle with d
        tree.add("c", ["a", "d"]);
        tree.add("d", ["b", "c"]);
        assert!(matches!(
            tree.topological_sort(),
            Err(TopoSortError::CycleDetected(_))
        ));
    }

    #[test]
    fn missing_dependency() {
        let mut tree = DependencyTree::new();
        tree.add("a", ["nope"]);
        assert_eq!(
            tree.topological_sort(),
            Err(TopoSortError::MissingEntry("\"nope\"".to_owned()))
        );
    }

    #[test]
    fn self_reference_ignored() {
        let mut tree = DependencyTree::new();
        tree.add("a", ["a"]);
        assert_eq!(tree.topological_sort().unwrap(), vec!["a"]);
    }
}
