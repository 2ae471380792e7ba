//! Step dependency graph and topological ordering
//!
//! Steps are nodes keyed by [`StepId`]; `depends_on` declares edges.
//! Ordering is deterministic: among steps whose dependencies are all
//! satisfied, the one declared first comes first.

use crate::error::{GraphError, Result};
use crate::step::{SharedStep, StepId};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Steps keyed by identifier, in declaration order
#[derive(Debug, Default, Clone)]
pub struct StepGraph {
    steps: Vec<SharedStep>,
    index: HashMap<StepId, usize>,
}

impl StepGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from steps in declaration order
    pub fn from_steps<I>(steps: I) -> Result<Self>
    where
        I: IntoIterator<Item = SharedStep>,
    {
        let mut graph = Self::new();
        for step in steps {
            graph.add(step)?;
        }
        Ok(graph)
    }

    /// Add a step, rejecting a repeated identifier
    pub fn add(&mut self, step: SharedStep) -> Result<()> {
        let id = step.id();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateStep { id });
        }
        self.index.insert(id, self.steps.len());
        self.steps.push(step);
        Ok(())
    }

    pub fn get(&self, id: &StepId) -> Option<&SharedStep> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.index.contains_key(id)
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[SharedStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Order steps so every step follows all of its dependencies
    ///
    /// Ties between independent steps break by declaration order, so the
    /// same input always yields the same order.
    pub fn topo_sort(&self) -> Result<Vec<SharedStep>> {
        let deps = self.resolve_edges()?;
        let n = self.steps.len();

        let mut indegree: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (node, node_deps) in deps.iter().enumerate() {
            for &dep in node_deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &dependent in &dependents[node] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < n {
            return Err(GraphError::Cycle {
                members: self.find_cycle(&deps, &indegree),
            });
        }

        log::debug!(
            "Step order: {}",
            order
                .iter()
                .map(|&i| self.steps[i].id().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(order.into_iter().map(|i| self.steps[i].clone()).collect())
    }

    /// Identifiers of every step that transitively depends on `id`
    pub fn transitive_dependents(&self, id: &StepId) -> Result<BTreeSet<StepId>> {
        let deps = self.resolve_edges()?;
        let Some(&start) = self.index.get(id) else {
            return Ok(BTreeSet::new());
        };

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        for (node, node_deps) in deps.iter().enumerate() {
            for &dep in node_deps {
                dependents[dep].push(node);
            }
        }

        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &dependent in &dependents[node] {
                if seen.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }

        Ok(seen.into_iter().map(|i| self.steps[i].id()).collect())
    }

    /// Dependency indices per step, deduplicated, with unknown targets rejected
    fn resolve_edges(&self) -> Result<Vec<Vec<usize>>> {
        self.steps
            .iter()
            .map(|step| {
                let mut resolved = Vec::new();
                for dep in step.depends_on() {
                    let &target = self.index.get(&dep).ok_or_else(|| {
                        GraphError::UnknownDependency {
                            step: step.id(),
                            dependency: dep.clone(),
                        }
                    })?;
                    if !resolved.contains(&target) {
                        resolved.push(target);
                    }
                }
                Ok(resolved)
            })
            .collect()
    }

    /// Walk unresolved dependencies until a node repeats
    ///
    /// Every step left with a non-zero indegree has at least one unresolved
    /// dependency, so the walk always closes a loop.
    fn find_cycle(&self, deps: &[Vec<usize>], indegree: &[usize]) -> Vec<StepId> {
        let stuck = |i: usize| indegree[i] > 0;
        let Some(start) = (0..self.steps.len()).find(|&i| stuck(i)) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
        let mut current = start;

        loop {
            let Some(&next) = deps[current].iter().find(|&&d| stuck(d)) else {
                break;
            };
            if let Some(&at) = position.get(&next) {
                // Edges point from dependent to dependency; report the
                // cycle in dependency order.
                let mut members: Vec<StepId> =
                    path[at..].iter().map(|&i| self.steps[i].id()).collect();
                members.reverse();
                return members;
            }
            position.insert(next, path.len());
            path.push(next);
            current = next;
        }

        path.iter().map(|&i| self.steps[i].id()).collect()
    }
}
