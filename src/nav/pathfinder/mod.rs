use bevy::math::{DVec2, DVec3};
use bevy::prelude::*;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, OnceLock};

use crate::nav::crossover::TerminalLinks;
use crate::nav::overlay::{NodeId, TerrainOverlayNetwork};

/// Search state: the source, a crossover point on a node, or destination `k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum PathState {
    Source,
    Crossover(NodeId, usize),
    Destination(usize),
}

#[derive(Clone, Copy, Debug)]
struct SearchEntry {
    cost: f64,
    state: PathState,
}

impl PartialEq for SearchEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}

impl Eq for SearchEntry {}

impl Ord for SearchEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost)
    }
}

impl PartialOrd for SearchEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A located terminal point and its links into the node's crossovers.
#[derive(Debug)]
struct Terminal {
    node: NodeId,
    links: TerminalLinks,
}

/// Result of one multi-destination search.
///
/// Holds the predecessor map and materializes each destination's polyline
/// on first request.
#[derive(Debug)]
pub struct PathfinderResultContext {
    network: Arc<TerrainOverlayNetwork>,
    source: DVec2,
    source_terminal: Option<Terminal>,
    destinations: Vec<DVec2>,
    destination_terminals: Vec<Option<Terminal>>,
    costs: FxHashMap<PathState, f64>,
    predecessors: FxHashMap<PathState, PathState>,
    roadmaps: Vec<OnceLock<Option<Vec<DVec2>>>>,
}

impl PathfinderResultContext {
    pub fn source(&self) -> DVec2 {
        self.source
    }

    pub fn destinations(&self) -> &[DVec2] {
        &self.destinations
    }

    /// Travel cost to destination `k`, if reachable.
    pub fn cost(&self, k: usize) -> Option<f64> {
        self.costs.get(&PathState::Destination(k)).copied()
    }

    /// Polyline to destination `k`, starting at the exact source and ending
    /// at the exact destination. `None` when unreachable.
    pub fn roadmap(&self, k: usize) -> Option<&[DVec2]> {
        self.roadmaps.get(k)?.get_or_init(|| self.backtrack(k)).as_deref()
    }

    /// [`Self::roadmap`] with heights taken from the ground.
    pub fn roadmap_3d(&self, k: usize) -> Option<Vec<DVec3>> {
        self.roadmap(k).map(|points| points.iter().map(|&p| p.extend(self.network.lift(p))).collect())
    }

    fn backtrack(&self, k: usize) -> Option<Vec<DVec2>> {
        let source = self.source_terminal.as_ref()?;
        let destination = self.destination_terminals.get(k)?.as_ref()?;

        let mut states = vec![PathState::Destination(k)];
        let mut current = PathState::Destination(k);
        while current != PathState::Source {
            current = *self.predecessors.get(&current)?;
            states.push(current);
        }
        states.reverse();

        let mut points: Vec<DVec2> = Vec::new();
        for pair in states.windows(2) {
            let piece = match (pair[0], pair[1]) {
                (PathState::Source, PathState::Destination(_)) => {
                    let manager = &self.network.node(source.node).crossovers;
                    manager.terminal_route(&source.links, &destination.links)?.1
                }
                (PathState::Source, PathState::Crossover(node, c)) => {
                    self.network.node(node).crossovers.terminal_to_crossover_route(&source.links, c)
                }
                (PathState::Crossover(a, ca), PathState::Crossover(b, cb)) if a == b => {
                    self.network.node(a).crossovers.crossover_route(ca, cb)
                }
                (PathState::Crossover(a, ca), PathState::Crossover(b, cb)) => {
                    vec![self.network.node(a).crossovers.point(ca), self.network.node(b).crossovers.point(cb)]
                }
                (PathState::Crossover(node, c), PathState::Destination(_)) => {
                    let mut piece = self.network.node(node).crossovers.terminal_to_crossover_route(&destination.links, c);
                    piece.reverse();
                    piece
                }
                (from, to) => {
                    warn!("[PATHFINDER] Unexpected transition {:?} -> {:?}", from, to);
                    return None;
                }
            };
            for p in piece {
                if points.last() != Some(&p) {
                    points.push(p);
                }
            }
        }

        if let Some(first) = points.first_mut() {
            *first = self.source;
        }
        if let Some(last) = points.last_mut() {
            *last = self.destinations[k];
        }
        if points.len() == 1 {
            points.push(self.destinations[k]);
        }
        Some(points)
    }
}

/// Shortest paths from `source` to every destination over `network`.
///
/// Points off land are snapped `inset` inside the nearest land; the
/// returned polylines still start and end at the exact input points.
pub fn find_paths(
    network: &Arc<TerrainOverlayNetwork>,
    source: DVec2,
    destinations: &[DVec2],
    inset: f64,
) -> PathfinderResultContext {
    let locate = |p: DVec2| {
        network
            .locate_or_snap(p, inset)
            .map(|(node, q)| Terminal { node, links: network.node(node).crossovers.find_optimal_links(q) })
    };
    let source_terminal = locate(source);
    let destination_terminals: Vec<Option<Terminal>> = destinations.iter().map(|&d| locate(d)).collect();

    let mut context = PathfinderResultContext {
        network: network.clone(),
        source,
        source_terminal: None,
        destinations: destinations.to_vec(),
        destination_terminals: Vec::new(),
        costs: FxHashMap::default(),
        predecessors: FxHashMap::default(),
        roadmaps: destinations.iter().map(|_| OnceLock::new()).collect(),
    };

    if let Some(source) = &source_terminal {
        search(network, source, &destination_terminals, &mut context.costs, &mut context.predecessors);
    } else {
        warn!("[PATHFINDER] No land to start from at {:?}", source);
    }
    context.source_terminal = source_terminal;
    context.destination_terminals = destination_terminals;
    context
}

/// Single-destination convenience over [`find_paths`], lifted to 3D.
pub fn find_path(network: &Arc<TerrainOverlayNetwork>, source: DVec3, destination: DVec3, inset: f64) -> Option<Vec<DVec3>> {
    let context = find_paths(network, source.truncate(), &[destination.truncate()], inset);
    let mut path = context.roadmap_3d(0)?;
    if let Some(first) = path.first_mut() {
        *first = source;
    }
    if let Some(last) = path.last_mut() {
        *last = destination;
    }
    Some(path)
}

fn search(
    network: &TerrainOverlayNetwork,
    source: &Terminal,
    destinations: &[Option<Terminal>],
    costs: &mut FxHashMap<PathState, f64>,
    predecessors: &mut FxHashMap<PathState, PathState>,
) {
    let mut destinations_by_node: FxHashMap<NodeId, Vec<usize>> = FxHashMap::default();
    for (k, terminal) in destinations.iter().enumerate() {
        if let Some(terminal) = terminal {
            destinations_by_node.entry(terminal.node).or_default().push(k);
        }
    }
    let mut remaining = destinations.iter().filter(|d| d.is_some()).count();

    let mut heap = BinaryHeap::new();
    costs.insert(PathState::Source, 0.0);
    heap.push(SearchEntry { cost: 0.0, state: PathState::Source });

    let mut relax = |heap: &mut BinaryHeap<SearchEntry>, from: PathState, to: PathState, cost: f64| {
        if cost.is_finite() && cost < costs.get(&to).copied().unwrap_or(f64::INFINITY) {
            costs.insert(to, cost);
            predecessors.insert(to, from);
            heap.push(SearchEntry { cost, state: to });
        }
    };

    let mut settled: FxHashMap<PathState, f64> = FxHashMap::default();
    while let Some(SearchEntry { cost, state }) = heap.pop() {
        if settled.contains_key(&state) {
            continue;
        }
        settled.insert(state, cost);

        match state {
            PathState::Destination(_) => {
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
            PathState::Source => {
                let manager = &network.node(source.node).crossovers;
                for (c, link) in source.links.to_crossovers.iter().enumerate() {
                    relax(&mut heap, state, PathState::Crossover(source.node, c), link.total_cost);
                }
                for &k in destinations_by_node.get(&source.node).into_iter().flatten() {
                    if let Some(destination) = &destinations[k] {
                        if let Some((direct, _)) = manager.terminal_route(&source.links, &destination.links) {
                            relax(&mut heap, state, PathState::Destination(k), direct);
                        }
                    }
                }
            }
            PathState::Crossover(node, c) => {
                let here = network.node(node);
                for other in 0..here.crossovers.len() {
                    if other != c {
                        let step = here.crossovers.link_between(c, other).total_cost;
                        relax(&mut heap, state, PathState::Crossover(node, other), cost + step);
                    }
                }
                for &(group, pair) in here.exits(c) {
                    let group = network.edge_group(group);
                    let next = PathState::Crossover(group.destination, group.destination_crossovers[pair]);
                    relax(&mut heap, state, next, cost);
                }
                for &k in destinations_by_node.get(&node).into_iter().flatten() {
                    if let Some(destination) = &destinations[k] {
                        let step = destination.links.to_crossovers[c].total_cost;
                        relax(&mut heap, state, PathState::Destination(k), cost + step);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
