//! Import ordering
//!
//! Builds a dependency graph over the selected entity types from their
//! by-name references and orders them with Kahn's algorithm. References to
//! types outside the selection are treated as already present.

use std::collections::{BTreeMap, BTreeSet};

use super::types::EntityKind;

/// Dependency graph over a selection of entity types
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// entity -> selected entities it references
    pub dependencies: BTreeMap<EntityKind, BTreeSet<EntityKind>>,
    /// entity -> selected entities that reference it
    pub dependents: BTreeMap<EntityKind, BTreeSet<EntityKind>>,
}

impl DependencyGraph {
    /// Build the graph for `selection` (duplicates ignored)
    pub fn build(selection: &[EntityKind]) -> Self {
        let selected: BTreeSet<EntityKind> = selection.iter().copied().collect();
        let mut graph = DependencyGraph::default();

        for kind in &selected {
            graph.dependents.entry(*kind).or_default();
            let deps: BTreeSet<EntityKind> = kind
                .dependencies()
                .into_iter()
                .filter(|d| d != kind && selected.contains(d))
                .collect();
            for dep in &deps {
                graph.dependents.entry(*dep).or_default().insert(*kind);
            }
            graph.dependencies.insert(*kind, deps);
        }

        graph
    }

    /// Order entity types so dependencies come first
    ///
    /// Among types that are ready at the same time the declaration order of
    /// [`EntityKind`] wins, so the full selection yields [`EntityKind::ALL`].
    pub fn topological_sort(&self) -> Result<Vec<EntityKind>, CycleError> {
        let mut in_degree: BTreeMap<EntityKind, usize> = self
            .dependencies
            .iter()
            .map(|(kind, deps)| (*kind, deps.len()))
            .collect();

        let mut ready: BTreeSet<EntityKind> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(kind, _)| *kind)
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(kind) = ready.pop_first() {
            order.push(kind);
            if let Some(dependents) = self.dependents.get(&kind) {
                for dependent in dependents {
                    if let Some(count) = in_degree.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(*dependent);
                        }
                    }
                }
            }
        }

        if order.len() != self.dependencies.len() {
            let remaining = self
                .dependencies
                .keys()
                .filter(|k| !order.contains(k))
                .copied()
                .collect();
            return Err(CycleError { entities: remaining });
        }

        Ok(order)
    }
}

/// Order `selection` for import
pub fn import_order(selection: &[EntityKind]) -> Result<Vec<EntityKind>, CycleError> {
    DependencyGraph::build(selection).topological_sort()
}

/// Error when a cycle is detected in the dependency graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("circular dependency detected involving: {}", slugs(.entities))]
pub struct CycleError {
    pub entities: Vec<EntityKind>,
}

fn slugs(kinds: &[EntityKind]) -> String {
    kinds.iter().map(|k| k.slug()).collect::<Vec<_>>().join(", ")
}
