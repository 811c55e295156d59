//! Static reachability of exit classifications.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

use super::TRACING_TARGET;
use crate::definition::{Classification, ElementId, Workplan};
use crate::{Error, Result};

/// Exit classifications reachable from every element of a workplan.
///
/// Edges run from a connector to each step consuming it and from a step to
/// each connector it produces. Exit connectors have no outgoing edges since
/// a run ends there. Every element gets its own depth-first search with a
/// visited set, so cycles neither recurse forever nor hide exits that are
/// only reachable after looping back.
#[derive(Debug, Clone, Default)]
pub(crate) struct Reachability {
    exits: HashMap<ElementId, BTreeSet<Classification>>,
}

impl Reachability {
    pub(crate) fn build(workplan: &Workplan) -> Result<Self> {
        let mut graph: DiGraph<ElementId, ()> = DiGraph::new();
        let mut nodes: HashMap<ElementId, NodeIndex> = HashMap::new();
        let mut classifications: HashMap<NodeIndex, Classification> = HashMap::new();

        for connector in &workplan.connectors {
            let node = graph.add_node(connector.id);
            nodes.insert(connector.id, node);
            if connector.is_exit() {
                classifications.insert(node, connector.classification);
            }
        }
        for step in &workplan.steps {
            nodes.insert(step.id, graph.add_node(step.id));
        }

        let node_of = |step: ElementId, connector: ElementId| {
            nodes.get(&connector).copied().ok_or_else(|| {
                Error::InvalidDefinition(format!(
                    "step {step} references missing connector {connector}"
                ))
            })
        };

        for step in &workplan.steps {
            let step_node = nodes[&step.id];
            for &input in step.inputs.iter().flatten() {
                let node = node_of(step.id, input)?;
                if !classifications.contains_key(&node) {
                    graph.update_edge(node, step_node, ());
                }
            }
            for &output in step.outputs.iter().flatten() {
                let node = node_of(step.id, output)?;
                graph.update_edge(step_node, node, ());
            }
        }

        let mut exits = HashMap::with_capacity(graph.node_count());
        for start in graph.node_indices() {
            let mut reachable = BTreeSet::new();
            let mut dfs = Dfs::new(&graph, start);
            while let Some(node) = dfs.next(&graph) {
                if let Some(classification) = classifications.get(&node) {
                    reachable.insert(*classification);
                }
            }
            exits.insert(graph[start], reachable);
        }

        tracing::debug!(
            target: TRACING_TARGET,
            workplan = %workplan.name,
            elements = graph.node_count(),
            cyclic = is_cyclic_directed(&graph),
            "Computed exit reachability"
        );
        Ok(Self { exits })
    }

    pub(crate) fn get(&self, element: ElementId) -> Option<&BTreeSet<Classification>> {
        self.exits.get(&element)
    }
}
