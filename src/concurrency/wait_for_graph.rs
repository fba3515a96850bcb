use std::collections::{HashMap, HashSet};

use crate::common::WorkerId;

/// Directed graph whose edge `a -> b` means worker `a` waits for a page
/// held by worker `b`. A cycle is a deadlock.
#[derive(Debug, Clone, Default)]
pub struct WaitForGraph {
    edges: HashMap<WorkerId, HashSet<WorkerId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `from -> to`. Self edges are ignored: a worker never waits on
    /// itself.
    pub fn add_edge(&mut self, from: WorkerId, to: WorkerId) {
        if from != to {
            self.edges.entry(from).or_default().insert(to);
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(HashSet::len).sum()
    }

    /// Depth-first search keeping the current path on a recursion stack; a
    /// back edge into the stack closes a cycle.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut workers: Vec<&WorkerId> = self.edges.keys().collect();
        workers.sort();
        workers
            .into_iter()
            .any(|worker| self.visit(*worker, &mut visited, &mut on_stack))
    }

    fn visit(
        &self,
        worker: WorkerId,
        visited: &mut HashSet<WorkerId>,
        on_stack: &mut HashSet<WorkerId>,
    ) -> bool {
        if on_stack.contains(&worker) {
            return true;
        }
        if !visited.insert(worker) {
            return false;
        }
        on_stack.insert(worker);
        if let Some(targets) = self.edges.get(&worker) {
            for target in targets {
                if self.visit(*target, visited, on_stack) {
                    return true;
                }
            }
        }
        on_stack.remove(&worker);
        false
    }

    /// Whether adding `from -> to` for every `to` in `targets` would close
    /// a cycle.
    pub fn would_form_cycle(&self, from: WorkerId, targets: &[WorkerId]) -> bool {
        let mut combined = self.clone();
        for to in targets {
            combined.add_edge(from, *to);
        }
        combined.has_cycle()
    }
}
