use crate::engine::EngineError;
use crate::models::{BodyRef, Direction, Position, Terrain};
use crate::state::GameState;
use crate::support::{self, SupportGraph};

/// Which bodies a resolution step may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every body that is not held up (gravity).
    All,
    /// Only `root` and what it transitively presses against (a push).
    From(BodyRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    OffBoard,
    Spike,
}

/// Positions of one body before and after a step. `to` is empty when the
/// body left play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyShift {
    pub body: BodyRef,
    pub from: Vec<Position>,
    pub to: Vec<Position>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallReport {
    pub shifts: Vec<BodyShift>,
    pub deaths: Vec<(usize, DeathCause)>,
    pub consumed: Vec<usize>,
    pub vanished: Vec<usize>,
    pub teleport_blocked: Vec<(BodyRef, Position)>,
}

impl FallReport {
    /// Nothing moved: the board is at rest in this direction.
    pub fn is_static(&self) -> bool {
        self.shifts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teleport {
    Done,
    Blocked(Position),
}

const UNVISITED: usize = usize::MAX;

/// Tarjan's algorithm without recursion. Components come out in reverse
/// topological order: a component appears after everything it points to.
pub fn strongly_connected(edges: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let count = edges.len();
    let mut index = vec![UNVISITED; count];
    let mut low = vec![0; count];
    let mut on_stack = vec![false; count];
    let mut stack = Vec::new();
    let mut work: Vec<(usize, usize)> = Vec::new();
    let mut components = Vec::new();
    let mut next_index = 0;

    for root in 0..count {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        low[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        work.push((root, 0));

        while let Some(&(node, cursor)) = work.last() {
            if let Some(&next) = edges[node].get(cursor) {
                if let Some(top) = work.last_mut() {
                    top.1 += 1;
                }
                if index[next] == UNVISITED {
                    index[next] = next_index;
                    low[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    work.push((next, 0));
                } else if on_stack[next] {
                    low[node] = low[node].min(index[next]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}

/// Contracts the graph's components and decides which nodes stay put.
/// A component is static if a member is pinned or it leans on a static one.
fn static_nodes(graph: &SupportGraph, components: &[Vec<usize>]) -> (Vec<bool>, Vec<usize>) {
    let mut component_of = vec![0; graph.len()];
    for (id, component) in components.iter().enumerate() {
        for &member in component {
            component_of[member] = id;
        }
    }

    let mut component_static = vec![false; components.len()];
    for (id, component) in components.iter().enumerate() {
        component_static[id] = component.iter().any(|&member| {
            graph.pinned[member]
                || graph.edges[member].iter().any(|&next| {
                    component_of[next] != id && component_static[component_of[next]]
                })
        });
    }

    let node_static = (0..graph.len())
        .map(|node| component_static[component_of[node]])
        .collect();
    (node_static, component_of)
}

/// Nodes reachable from `root` along support edges, `root` included.
fn closure(graph: &SupportGraph, root: usize) -> Vec<bool> {
    let mut seen = vec![false; graph.len()];
    let mut pending = vec![root];
    seen[root] = true;
    while let Some(node) = pending.pop() {
        for &next in &graph.edges[node] {
            if !seen[next] {
                seen[next] = true;
                pending.push(next);
            }
        }
    }
    seen
}

/// Advances every movable body in scope by one cell in `direction`.
pub fn resolve_step(
    state: &mut GameState,
    direction: Direction,
    wrap: bool,
    pinned: &[BodyRef],
    scope: Scope,
) -> Result<FallReport, EngineError> {
    let graph = support::build(state, direction, wrap, pinned);
    let components = strongly_connected(&graph.edges);
    let (node_static, _) = static_nodes(&graph, &components);

    let moving: Vec<BodyRef> = match scope {
        Scope::All => graph
            .nodes
            .iter()
            .zip(&node_static)
            .filter(|(_, is_static)| !**is_static)
            .map(|(body, _)| *body)
            .collect(),
        Scope::From(root) => {
            let Some(root) = graph.node_of(root) else {
                return Ok(FallReport::default());
            };
            if node_static[root] {
                Vec::new()
            } else {
                let reach = closure(&graph, root);
                graph
                    .nodes
                    .iter()
                    .zip(reach)
                    .filter(|(_, reached)| *reached)
                    .map(|(body, _)| *body)
                    .collect()
            }
        },
    };

    advance(state, &moving, direction, wrap)
}

fn advance(
    state: &mut GameState,
    moving: &[BodyRef],
    direction: Direction,
    wrap: bool,
) -> Result<FallReport, EngineError> {
    let mut report = FallReport::default();
    if moving.is_empty() {
        return Ok(report);
    }

    let before: Vec<Vec<Position>> = moving.iter().map(|body| state.body_parts(*body)).collect();
    for body in moving {
        state.lift_body(*body);
    }

    let mut portal_entries = Vec::new();
    for (&body, from) in moving.iter().zip(before) {
        let destination: Option<Vec<Position>> = from
            .iter()
            .map(|part| state.normalize(part.step(direction), wrap))
            .collect();

        let Some(to) = destination else {
            state.remove_body(body);
            match body {
                BodyRef::Snake(id) => report.deaths.push((id, DeathCause::OffBoard)),
                BodyRef::Block(id) => report.vanished.push(id),
            }
            report.shifts.push(BodyShift {
                body,
                from,
                to: Vec::new(),
            });
            continue;
        };

        if let Some(clash) = state.place_body(body, to.clone()) {
            return Err(EngineError::InvariantViolation(format!(
                "{body:?} moved into {clash:?}, which another body holds"
            )));
        }
        let on_spike = to.iter().any(|pos| state.terrain(*pos) == Terrain::Spike);
        match body {
            BodyRef::Block(id) if on_spike => {
                return Err(EngineError::InvariantViolation(format!(
                    "block {id} came to rest on a spike"
                )));
            },
            BodyRef::Snake(id) if on_spike => {
                state.remove_body(body);
                report.deaths.push((id, DeathCause::Spike));
                report.shifts.push(BodyShift {
                    body,
                    from,
                    to: Vec::new(),
                });
                continue;
            },
            _ => {},
        }

        // Only a portal the body did not already cover counts as entered.
        if let Some(portal) = to
            .iter()
            .copied()
            .find(|pos| state.terrain(*pos) == Terrain::Portal && !from.contains(pos))
        {
            portal_entries.push((body, portal));
        }
        report.shifts.push(BodyShift { body, from, to });

        if let BodyRef::Snake(id) = body {
            if consume_if_on_target(state, id) {
                report.consumed.push(id);
            }
        }
    }

    for (body, portal) in portal_entries {
        if !state.is_alive(body) {
            continue;
        }
        let from = state.body_parts(body);
        match teleport(state, body, portal, wrap) {
            Some(Teleport::Done) => {
                report.shifts.push(BodyShift {
                    body,
                    from,
                    to: state.body_parts(body),
                });
                if let BodyRef::Snake(id) = body {
                    if consume_if_on_target(state, id) {
                        report.consumed.push(id);
                    }
                }
            },
            Some(Teleport::Blocked(at)) => report.teleport_blocked.push((body, at)),
            None => {},
        }
    }

    Ok(report)
}

/// Moves `body` through `portal` by the fixed offset to its partner. The
/// whole footprint must land on free cells or nothing happens.
pub fn teleport(
    state: &mut GameState,
    body: BodyRef,
    portal: Position,
    wrap: bool,
) -> Option<Teleport> {
    let (_, (dx, dy)) = state.portal_exit(portal)?;
    let parts = state.body_parts(body);

    let mut destination = Vec::with_capacity(parts.len());
    for part in &parts {
        let raw = part.offset(dx, dy);
        let Some(pos) = state.normalize(raw, wrap) else {
            log::warn!("{body:?} cannot teleport: {raw:?} is off the board");
            return Some(Teleport::Blocked(raw));
        };
        let free_terrain = matches!(
            state.terrain(pos),
            Terrain::Empty | Terrain::Portal | Terrain::Target
        );
        let free_cell = state.occupant(pos).map_or(true, |other| other == body);
        if !free_terrain || !free_cell {
            log::warn!("{body:?} cannot teleport: {pos:?} is blocked");
            return Some(Teleport::Blocked(pos));
        }
        destination.push(pos);
    }

    state.lift_body(body);
    state.place_body(body, destination);
    Some(Teleport::Done)
}

/// Removes snake `id` when its head sits on the target and no fruit is left.
pub fn consume_if_on_target(state: &mut GameState, id: usize) -> bool {
    let snake = &state.snakes()[id];
    if !snake.alive || state.fruit_remaining() > 0 || snake.head() != Some(state.target()) {
        return false;
    }
    state.remove_body(BodyRef::Snake(id));
    true
}
