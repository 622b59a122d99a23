use crate::models::{BodyRef, Cell, Direction};
use crate::state::GameState;
use std::collections::HashMap;

/// "Rests upon" relationships for one motion step. Node `n` has an edge to
/// `m` when a part of `n` would move into a cell held by `m`.
#[derive(Debug, Clone, Default)]
pub struct SupportGraph {
    pub nodes: Vec<BodyRef>,
    pub edges: Vec<Vec<usize>>,
    /// Held in place by terrain or by the caller.
    pub pinned: Vec<bool>,
    index: HashMap<BodyRef, usize>,
}

impl SupportGraph {
    pub fn node_of(&self, body: BodyRef) -> Option<usize> {
        self.index.get(&body).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if from != to && !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }
}

/// Whether terrain-like `cell` holds `body` in place when it moves into it.
fn holds(body: BodyRef, cell: Cell) -> bool {
    match cell {
        Cell::Obstacle | Cell::Fruit => true,
        // Snakes fall onto spikes and die there; blocks rest on them.
        Cell::Spike => matches!(body, BodyRef::Block(_)),
        _ => false,
    }
}

/// Builds the support graph of every live body for a step in `direction`.
/// Bodies in `pinned` are treated as immovable.
pub fn build(
    state: &GameState,
    direction: Direction,
    wrap: bool,
    pinned: &[BodyRef],
) -> SupportGraph {
    let mut graph = SupportGraph::default();
    for body in state.live_bodies() {
        graph.index.insert(body, graph.nodes.len());
        graph.nodes.push(body);
        graph.edges.push(Vec::new());
        graph.pinned.push(false);
    }

    for node in 0..graph.nodes.len() {
        let body = graph.nodes[node];
        if pinned.contains(&body) {
            graph.pinned[node] = true;
            continue;
        }
        for part in state.body_parts(body) {
            // Leaving the board is free movement.
            let Some((_, cell)) = state.lookup(part.step(direction), wrap) else {
                continue;
            };
            if holds(body, cell) {
                graph.pinned[node] = true;
                break;
            }
            if let Some(other) = cell.body() {
                if let Some(target) = graph.node_of(other) {
                    graph.add_edge(node, target);
                }
            }
        }
    }

    graph
}
