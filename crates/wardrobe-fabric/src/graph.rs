use std::collections::{BTreeMap, BTreeSet};

use crate::error::{FabricError, Result};

/// A declared "source mutation forces target refresh" edge.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CascadeLink {
    pub source: String,
    pub target: String,
}

/// Directed acyclic graph of cascade links between stores.
///
/// Edges are only ever added; a declaration that would close a cycle is
/// rejected so that a refresh can never re-trigger itself.
#[derive(Clone, Debug, Default)]
pub struct CascadeGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl CascadeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a link. Returns `false` if it was already declared.
    pub fn declare(&mut self, source: &str, target: &str) -> Result<bool> {
        if source == target {
            return Err(FabricError::SelfLink(source.to_string()));
        }
        if self.reaches(target, source) {
            return Err(FabricError::CascadeCycle {
                source_store: source.to_string(),
                target: target.to_string(),
            });
        }
        Ok(self
            .edges
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string()))
    }

    /// Direct dependents of `source`.
    pub fn targets_of(&self, source: &str) -> Vec<String> {
        self.edges
            .get(source)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All declared links, sorted.
    pub fn links(&self) -> Vec<CascadeLink> {
        self.edges
            .iter()
            .flat_map(|(source, targets)| {
                targets.iter().map(move |target| CascadeLink {
                    source: source.clone(),
                    target: target.clone(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(next) = self.edges.get(node) {
                stack.extend(next.iter().map(String::as_str));
            }
        }
        false
    }
}
