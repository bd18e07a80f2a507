pub mod jobs;

use bevy::math::DVec2;
use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::{Arc, Mutex};

use crate::nav::crossover::CrossoverPointManager;
use crate::nav::geometry::{Bvh, Segment2};
use crate::nav::visibility::LandPolygon;

pub use jobs::{crossover_samples, emit_edge_jobs, EdgeJob, EdgeJobCache, EdgeJobKey};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// Index of a node in a [`TerrainOverlayNetwork`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// A portal: a segment on the border of one region that is glued to a
/// segment of another. Both segments are in world coordinates and are walked
/// in step, so parameter `t` on one matches parameter `t` on the other.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionEdgeDescription {
    pub id: EdgeId,
    pub source: RegionId,
    pub destination: RegionId,
    pub source_segment: Segment2,
    pub destination_segment: Segment2,
}

/// A region's land at one dilation radius.
#[derive(Clone, Debug)]
pub struct RegionGeometry {
    pub region: RegionId,
    pub version: u64,
    pub polygons: Vec<Arc<LandPolygon>>,
}

/// One land polygon of one region, with its crossover points.
#[derive(Debug)]
pub struct TerrainOverlayNetworkNode {
    pub region: RegionId,
    pub polygon_index: usize,
    pub crossovers: CrossoverPointManager,
    outbound: SmallVec<[usize; 4]>,
    /// Per crossover point: `(edge group, pair)` leaving through it.
    exits: Vec<SmallVec<[(usize, usize); 2]>>,
}

impl TerrainOverlayNetworkNode {
    pub fn polygon(&self) -> &Arc<LandPolygon> {
        self.crossovers.polygon()
    }

    /// Edge groups leaving this node.
    pub fn outbound_groups(&self) -> &[usize] {
        &self.outbound
    }

    /// Edge group pairs that leave through crossover `crossover`.
    pub fn exits(&self, crossover: usize) -> &[(usize, usize)] {
        self.exits.get(crossover).map_or(&[][..], |e| e.as_slice())
    }
}

/// Directed link between two nodes: pair `i` joins crossover
/// `source_crossovers[i]` on the source node to `destination_crossovers[i]`
/// on the destination node at zero cost.
#[derive(Clone, Debug)]
pub struct TerrainOverlayNetworkEdgeGroup {
    pub source: NodeId,
    pub destination: NodeId,
    pub source_crossovers: Vec<usize>,
    pub destination_crossovers: Vec<usize>,
}

impl TerrainOverlayNetworkEdgeGroup {
    pub fn len(&self) -> usize {
        self.source_crossovers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_crossovers.is_empty()
    }
}

/// Graph of land polygons across all regions at one dilation radius.
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct TerrainOverlayNetwork {
    nodes: Vec<TerrainOverlayNetworkNode>,
    edge_groups: Vec<TerrainOverlayNetworkEdgeGroup>,
    node_index: Bvh<NodeId>,
}

impl TerrainOverlayNetwork {
    pub fn build(
        regions: &[RegionGeometry],
        edges: &[RegionEdgeDescription],
        cache: &Mutex<EdgeJobCache>,
        dilation: f64,
        crossover_spacing: f64,
    ) -> Self {
        let mut nodes = Vec::new();
        let mut region_nodes: FxHashMap<RegionId, (usize, &RegionGeometry)> = FxHashMap::default();
        for geometry in regions {
            region_nodes.insert(geometry.region, (nodes.len(), geometry));
            for (polygon_index, polygon) in geometry.polygons.iter().enumerate() {
                nodes.push(TerrainOverlayNetworkNode {
                    region: geometry.region,
                    polygon_index,
                    crossovers: CrossoverPointManager::new(polygon.clone()),
                    outbound: SmallVec::new(),
                    exits: Vec::new(),
                });
            }
        }

        let mut edge_groups: Vec<TerrainOverlayNetworkEdgeGroup> = Vec::new();
        let mut group_lookup: FxHashMap<(NodeId, NodeId), usize> = FxHashMap::default();
        let mut link = |source: NodeId, destination: NodeId, from: &[usize], to: &[usize]| {
            let group = *group_lookup.entry((source, destination)).or_insert_with(|| {
                edge_groups.push(TerrainOverlayNetworkEdgeGroup {
                    source,
                    destination,
                    source_crossovers: Vec::new(),
                    destination_crossovers: Vec::new(),
                });
                edge_groups.len() - 1
            });
            let g = &mut edge_groups[group];
            for (&s, &d) in from.iter().zip(to) {
                let known = g.source_crossovers.iter().zip(&g.destination_crossovers).any(|(&a, &b)| a == s && b == d);
                if !known {
                    g.source_crossovers.push(s);
                    g.destination_crossovers.push(d);
                }
            }
        };

        for edge in edges {
            let (Some(&(source_base, source)), Some(&(destination_base, destination))) =
                (region_nodes.get(&edge.source), region_nodes.get(&edge.destination))
            else {
                warn!("[OVERLAY] Edge {:?} joins unknown region, skipping", edge.id);
                continue;
            };
            let key = EdgeJobKey::new(edge.id, source.version, destination.version, dilation);
            // Held for the lookup only, so builds at other radii can share the cache.
            let jobs = cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_or_emit(key, || emit_edge_jobs(edge, &source.polygons, &destination.polygons));

            for job in jobs.iter() {
                let source_node = NodeId(source_base + job.source_polygon);
                let destination_node = NodeId(destination_base + job.destination_polygon);
                let (source_points, destination_points) = crossover_samples(job, crossover_spacing);
                let from = nodes[source_node.0].crossovers.add_many(job.source_segment, &source_points);
                let to = nodes[destination_node.0].crossovers.add_many(job.destination_segment, &destination_points);
                link(source_node, destination_node, &from, &to);
                link(destination_node, source_node, &to, &from);
            }
        }

        for (gi, group) in edge_groups.iter().enumerate() {
            let node = &mut nodes[group.source.0];
            node.outbound.push(gi);
            if node.exits.len() < node.crossovers.len() {
                node.exits.resize(node.crossovers.len(), SmallVec::new());
            }
            for (pair, &c) in group.source_crossovers.iter().enumerate() {
                node.exits[c].push((gi, pair));
            }
        }

        let node_index = Bvh::build(nodes.iter().enumerate().map(|(i, n)| (n.polygon().bounds(), NodeId(i))).collect());
        debug!(
            "[OVERLAY] Network built: {} nodes, {} edge groups, {} crossover points",
            nodes.len(),
            edge_groups.len(),
            nodes.iter().map(|n| n.crossovers.len()).sum::<usize>()
        );
        Self { nodes, edge_groups, node_index }
    }

    pub fn nodes(&self) -> &[TerrainOverlayNetworkNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &TerrainOverlayNetworkNode {
        &self.nodes[id.0]
    }

    pub fn edge_groups(&self) -> &[TerrainOverlayNetworkEdgeGroup] {
        &self.edge_groups
    }

    pub fn edge_group(&self, index: usize) -> &TerrainOverlayNetworkEdgeGroup {
        &self.edge_groups[index]
    }

    /// Node whose land contains `p`.
    pub fn locate(&self, p: DVec2) -> Option<NodeId> {
        let mut found = None;
        self.node_index.visit_point(p, |&id| {
            if found.is_none() && self.nodes[id.0].polygon().contains(p) {
                found = Some(id);
            }
        });
        found
    }

    /// Node containing `p`, or the node with the closest land and the point
    /// on it `inset` inside the boundary.
    pub fn locate_or_snap(&self, p: DVec2, inset: f64) -> Option<(NodeId, DVec2)> {
        if let Some(id) = self.locate(p) {
            return Some((id, p));
        }
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let (q, d) = node.polygon().island().nearest_land_point(p, inset);
                (NodeId(i), q, d)
            })
            .filter(|(_, _, d)| d.is_finite())
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(id, q, _)| (id, q))
    }

    /// Ground height under `p`, or zero off land.
    pub fn lift(&self, p: DVec2) -> f64 {
        self.locate(p)
            .and_then(|id| {
                let island = self.nodes[id.0].polygon().island();
                island.try_locate(p).map(|t| island.triangle(t).z_at(p))
            })
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests;
