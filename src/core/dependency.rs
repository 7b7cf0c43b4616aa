//! Node prerequisites as a nested tree.
//!
//! `{auditorium: {box_office: None}}` reads "the auditorium requires the
//! box office". Everything below a node, at any depth, is required before
//! that node may be entered.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyTree(BTreeMap<String, Option<DependencyTree>>);

impl DependencyTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Record that `node` requires `requirement`.
    pub fn add(&mut self, node: &str, requirement: &str) {
        let subtree = self
            .0
            .entry(node.to_string())
            .or_insert(None)
            .get_or_insert_with(DependencyTree::new);
        subtree.0.entry(requirement.to_string()).or_insert(None);
    }

    /// Merge `other` into this tree. Subtrees under the same key are merged
    /// recursively.
    pub fn merge(&mut self, other: DependencyTree) {
        for (key, theirs) in other.0 {
            let slot = self.0.entry(key).or_insert(None);
            match slot {
                Some(mine) => {
                    if let Some(theirs) = theirs {
                        mine.merge(theirs);
                    }
                }
                None => *slot = theirs,
            }
        }
    }

    /// Every key in the tree, at any depth.
    pub fn keys(&self) -> FxHashSet<String> {
        let mut out = FxHashSet::default();
        self.collect_keys(&mut out);
        out
    }

    fn collect_keys(&self, out: &mut FxHashSet<String>) {
        for (key, sub) in &self.0 {
            out.insert(key.clone());
            if let Some(sub) = sub {
                sub.collect_keys(out);
            }
        }
    }

    /// Every node that must be visited before `node`, gathered from all
    /// places `node` appears in the tree.
    pub fn requirements(&self, node: &str) -> FxHashSet<String> {
        let mut out = FxHashSet::default();
        self.collect_requirements(node, &mut out);
        out
    }

    fn collect_requirements(&self, node: &str, out: &mut FxHashSet<String>) {
        for (key, sub) in &self.0 {
            if let Some(sub) = sub {
                if key == node {
                    sub.collect_keys(out);
                }
                sub.collect_requirements(node, out);
            }
        }
    }

    /// Direct `(dependent, requirement)` pairs at every level.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        let mut out = Vec::new();
        self.collect_pairs(&mut out);
        out
    }

    fn collect_pairs<'a>(&'a self, out: &mut Vec<(&'a str, &'a str)>) {
        for (key, sub) in &self.0 {
            if let Some(sub) = sub {
                for child in sub.0.keys() {
                    out.push((key.as_str(), child.as_str()));
                }
                sub.collect_pairs(out);
            }
        }
    }

    /// A node that (transitively) requires itself, if there is one.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut graph: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for (from, to) in self.pairs() {
            graph.entry(from).or_default().push(to);
        }

        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            graph: &FxHashMap<&'a str, Vec<&'a str>>,
            marks: &mut FxHashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(node) {
                Some(Mark::Done) => return None,
                Some(Mark::Active) => {
                    let start = path.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                None => {}
            }
            marks.insert(node, Mark::Active);
            path.push(node);
            for &next in graph.get(node).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(cycle) = visit(next, graph, marks, path) {
                    return Some(cycle);
                }
            }
            path.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut roots: Vec<&str> = graph.keys().copied().collect();
        roots.sort_unstable();
        let mut marks = FxHashMap::default();
        let mut path = Vec::new();
        roots
            .into_iter()
            .find_map(|root| visit(root, &graph, &mut marks, &mut path))
    }
}
