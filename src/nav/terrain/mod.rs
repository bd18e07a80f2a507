pub mod compile;

use bevy::math::{DVec2, DVec3};
use bevy::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use crate::nav::config::NavConfig;
use crate::nav::geometry::{Bounds2, Segment2};
use crate::nav::overlay::{EdgeId, EdgeJobCache, RegionEdgeDescription, RegionGeometry, RegionId, TerrainOverlayNetwork};
use crate::nav::pathfinder;
use crate::nav::triangulation::{Triangulation, TriangulationIsland};
use crate::nav::visibility::LandPolygon;

// ============================================================================
// Snapshot interface
// ============================================================================

/// Read-only view of the terrain at one version.
///
/// Every query is a pure function of `(version, dilation_radius)`, so
/// results may be cached under that key.
pub trait TerrainSnapshot: Send + Sync {
    fn version(&self) -> u64;

    /// Land that an agent of radius `dilation_radius` can stand on.
    fn compute_triangulation(&self, dilation_radius: f64) -> Arc<Triangulation>;

    /// Cross-region search graph at `dilation_radius`.
    fn compute_overlay_network(&self, dilation_radius: f64) -> Arc<TerrainOverlayNetwork>;

    /// `(in_hole, point)`: the point itself when on land, otherwise the
    /// nearest land point. `None` when there is no land at this radius.
    fn find_nearest_land_point(&self, dilation_radius: f64, point: DVec3) -> Option<(bool, DVec3)>;

    /// Edge buffer used to nudge snapped points inside land.
    fn edge_buffer_radius(&self) -> f64;

    /// Shortest path at `dilation_radius`, starting exactly at `source` and
    /// ending exactly at `destination`.
    fn find_path(&self, dilation_radius: f64, source: DVec3, destination: DVec3) -> Option<Vec<DVec3>> {
        let network = self.compute_overlay_network(dilation_radius);
        pathfinder::find_path(&network, source, destination, self.edge_buffer_radius())
    }
}

// ============================================================================
// Descriptions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HoleId(pub u32);

/// Axis-aligned obstacle in world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerrainHole {
    pub id: HoleId,
    pub bounds: Bounds2,
}

impl TerrainHole {
    /// Whether an agent at `point` would overlap the hole grown by `dilation`.
    pub fn contains_point(&self, dilation: f64, point: DVec3) -> bool {
        self.bounds.expanded(dilation).contains_strictly(point.truncate())
    }
}

/// Static layout of a region type, in local coordinates with the origin at
/// the lower-left corner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionPreset {
    pub size: DVec2,
    pub holes: Vec<Bounds2>,
}

impl RegionPreset {
    pub fn blank() -> Self {
        Self { size: DVec2::splat(1000.0), holes: Vec::new() }
    }

    pub fn test_2d() -> Self {
        let holes = [
            (100.0, 600.0, 300.0, 300.0),
            (400.0, 700.0, 100.0, 100.0),
            (200.0, 900.0, 100.0, 150.0),
            (600.0, 100.0, 300.0, 300.0),
            (700.0, 400.0, 100.0, 100.0),
            (200.0, 200.0, 100.0, 100.0),
            (600.0, 850.0, 300.0, 50.0),
            (600.0, 650.0, 50.0, 200.0),
            (850.0, 650.0, 50.0, 200.0),
            (600.0, 600.0, 300.0, 50.0),
            (700.0, 700.0, 100.0, 100.0),
        ];
        Self {
            size: DVec2::splat(1000.0),
            holes: holes.iter().map(|&(x, y, w, h)| Bounds2::from_rect(x, y, w, h)).collect(),
        }
    }

    pub fn four_squares() -> Self {
        let holes = [(200.0, 200.0), (200.0, 600.0), (600.0, 200.0), (600.0, 600.0)];
        Self {
            size: DVec2::splat(1000.0),
            holes: holes.iter().map(|&(x, y)| Bounds2::from_rect(x, y, 200.0, 200.0)).collect(),
        }
    }
}

/// One placed region.
#[derive(Clone, Debug)]
pub struct RegionDescription {
    pub id: RegionId,
    pub origin: DVec2,
    pub bounds: Bounds2,
    pub static_holes: Vec<Bounds2>,
    pub version: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainSettings {
    pub edge_buffer_radius: f64,
    pub crossover_point_spacing: f64,
    pub max_cell_size: f64,
}

impl From<&NavConfig> for TerrainSettings {
    fn from(config: &NavConfig) -> Self {
        Self {
            edge_buffer_radius: config.edge_buffer_radius,
            crossover_point_spacing: config.crossover_point_spacing,
            max_cell_size: config.max_cell_size,
        }
    }
}

// ============================================================================
// Service
// ============================================================================

/// Owns the terrain descriptions and hands out immutable snapshots.
///
/// Any change (new region, portal or hole) replaces the current snapshot;
/// readers holding the old `Arc` keep a consistent view.
#[derive(Resource)]
pub struct TerrainService {
    settings: TerrainSettings,
    regions: Vec<RegionDescription>,
    edges: Vec<RegionEdgeDescription>,
    temporary_holes: Vec<TerrainHole>,
    next_hole: u32,
    version: u64,
    edge_jobs: Arc<Mutex<EdgeJobCache>>,
    snapshot: Arc<CompiledTerrainSnapshot>,
}

impl TerrainService {
    pub fn new(settings: TerrainSettings) -> Self {
        let edge_jobs = Arc::new(Mutex::new(EdgeJobCache::default()));
        let snapshot = Arc::new(CompiledTerrainSnapshot::empty(settings, edge_jobs.clone()));
        Self {
            settings,
            regions: Vec::new(),
            edges: Vec::new(),
            temporary_holes: Vec::new(),
            next_hole: 0,
            version: 0,
            edge_jobs,
            snapshot,
        }
    }

    pub fn from_config(config: &NavConfig) -> Self {
        Self::new(TerrainSettings::from(config))
    }

    pub fn settings(&self) -> TerrainSettings {
        self.settings
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn regions(&self) -> &[RegionDescription] {
        &self.regions
    }

    pub fn edges(&self) -> &[RegionEdgeDescription] {
        &self.edges
    }

    pub fn temporary_holes(&self) -> &[TerrainHole] {
        &self.temporary_holes
    }

    pub fn snapshot(&self) -> Arc<dyn TerrainSnapshot> {
        self.snapshot.clone()
    }

    /// Place `preset` with its lower-left corner at `origin`.
    pub fn add_region(&mut self, preset: &RegionPreset, origin: DVec2) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(RegionDescription {
            id,
            origin,
            bounds: Bounds2::new(origin, origin + preset.size),
            static_holes: preset.holes.iter().map(|h| h.translated(origin)).collect(),
            version: 0,
        });
        info!("[TERRAIN] Added region {:?} at {:?}", id, origin);
        self.rebuild_snapshot();
        id
    }

    /// Glue `source_local` on `source` to `destination_local` on
    /// `destination`. Segments are in each region's local coordinates.
    pub fn add_portal(
        &mut self,
        source: RegionId,
        destination: RegionId,
        source_local: Segment2,
        destination_local: Segment2,
    ) -> Option<EdgeId> {
        let source_origin = self.region(source)?.origin;
        let destination_origin = self.region(destination)?.origin;
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(RegionEdgeDescription {
            id,
            source,
            destination,
            source_segment: source_local.translated(source_origin),
            destination_segment: destination_local.translated(destination_origin),
        });
        self.rebuild_snapshot();
        Some(id)
    }

    pub fn region(&self, id: RegionId) -> Option<&RegionDescription> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Add an obstacle in world coordinates. Only regions it overlaps are
    /// recompiled.
    pub fn add_temporary_hole(&mut self, bounds: Bounds2) -> TerrainHole {
        let hole = TerrainHole { id: HoleId(self.next_hole), bounds };
        self.next_hole += 1;
        self.temporary_holes.push(hole);
        self.touch_regions(&bounds);
        info!("[TERRAIN] Added temporary hole {:?} at {:?}", hole.id, bounds);
        self.rebuild_snapshot();
        hole
    }

    pub fn remove_temporary_hole(&mut self, id: HoleId) -> Option<TerrainHole> {
        let index = self.temporary_holes.iter().position(|h| h.id == id)?;
        let hole = self.temporary_holes.remove(index);
        self.touch_regions(&hole.bounds);
        info!("[TERRAIN] Removed temporary hole {:?}", id);
        self.rebuild_snapshot();
        Some(hole)
    }

    fn touch_regions(&mut self, bounds: &Bounds2) {
        for region in &mut self.regions {
            if region.bounds.intersects(bounds) {
                region.version += 1;
            }
        }
    }

    fn rebuild_snapshot(&mut self) {
        self.version += 1;
        let regions = self
            .regions
            .iter()
            .map(|r| RegionSnapshot {
                id: r.id,
                version: r.version,
                bounds: r.bounds,
                holes: r
                    .static_holes
                    .iter()
                    .copied()
                    .chain(self.temporary_holes.iter().map(|h| h.bounds).filter(|h| h.intersects(&r.bounds)))
                    .collect(),
            })
            .collect();
        self.snapshot = Arc::new(CompiledTerrainSnapshot {
            version: self.version,
            settings: self.settings,
            regions,
            edges: self.edges.clone(),
            edge_jobs: self.edge_jobs.clone(),
            compiled: RwLock::new(FxHashMap::default()),
        });
    }
}

// ============================================================================
// Compiled snapshot
// ============================================================================

#[derive(Clone, Debug)]
struct RegionSnapshot {
    id: RegionId,
    version: u64,
    bounds: Bounds2,
    holes: Vec<Bounds2>,
}

struct CompiledRadius {
    regions: Vec<(RegionId, u64, Vec<Arc<TriangulationIsland>>)>,
    triangulation: Arc<Triangulation>,
    network: OnceLock<Arc<TerrainOverlayNetwork>>,
}

/// Snapshot of rectangular regions with rectangular holes, compiled lazily
/// per dilation radius.
pub struct CompiledTerrainSnapshot {
    version: u64,
    settings: TerrainSettings,
    regions: Vec<RegionSnapshot>,
    edges: Vec<RegionEdgeDescription>,
    edge_jobs: Arc<Mutex<EdgeJobCache>>,
    compiled: RwLock<FxHashMap<u64, Arc<CompiledRadius>>>,
}

impl CompiledTerrainSnapshot {
    fn empty(settings: TerrainSettings, edge_jobs: Arc<Mutex<EdgeJobCache>>) -> Self {
        Self {
            version: 0,
            settings,
            regions: Vec::new(),
            edges: Vec::new(),
            edge_jobs,
            compiled: RwLock::new(FxHashMap::default()),
        }
    }

    fn compiled(&self, dilation: f64) -> Arc<CompiledRadius> {
        let key = dilation.to_bits();
        {
            let cache = self.compiled.read().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
        }

        let regions: Vec<(RegionId, u64, Vec<Arc<TriangulationIsland>>)> = self
            .regions
            .iter()
            .map(|r| {
                let islands = compile::compile_islands(r.bounds, &r.holes, dilation, self.settings.max_cell_size);
                (r.id, r.version, islands.into_iter().map(Arc::new).collect())
            })
            .collect();
        let triangulation =
            Arc::new(Triangulation::new(regions.iter().flat_map(|(_, _, islands)| islands.iter().cloned()).collect()));
        debug!(
            "[TERRAIN] Compiled v{} at radius {}: {} islands",
            self.version,
            dilation,
            triangulation.islands.len()
        );
        let compiled = Arc::new(CompiledRadius { regions, triangulation, network: OnceLock::new() });

        let mut cache = self.compiled.write().unwrap_or_else(|e| e.into_inner());
        cache.entry(key).or_insert(compiled).clone()
    }
}

impl TerrainSnapshot for CompiledTerrainSnapshot {
    fn version(&self) -> u64 {
        self.version
    }

    fn compute_triangulation(&self, dilation_radius: f64) -> Arc<Triangulation> {
        self.compiled(dilation_radius).triangulation.clone()
    }

    fn compute_overlay_network(&self, dilation_radius: f64) -> Arc<TerrainOverlayNetwork> {
        let compiled = self.compiled(dilation_radius);
        compiled
            .network
            .get_or_init(|| {
                let geometry: Vec<RegionGeometry> = compiled
                    .regions
                    .iter()
                    .map(|(region, version, islands)| RegionGeometry {
                        region: *region,
                        version: *version,
                        polygons: islands.iter().map(|i| Arc::new(LandPolygon::from_island(i.clone()))).collect(),
                    })
                    .collect();
                Arc::new(TerrainOverlayNetwork::build(
                    &geometry,
                    &self.edges,
                    &self.edge_jobs,
                    dilation_radius,
                    self.settings.crossover_point_spacing,
                ))
            })
            .clone()
    }

    fn find_nearest_land_point(&self, dilation_radius: f64, point: DVec3) -> Option<(bool, DVec3)> {
        let triangulation = self.compute_triangulation(dilation_radius);
        let (in_hole, p) = triangulation.find_nearest_land_point(point.truncate(), self.settings.edge_buffer_radius)?;
        if !in_hole {
            return Some((false, point));
        }
        let z = triangulation
            .try_locate(p)
            .and_then(|at| triangulation.island(at.island).map(|island| island.triangle(at.triangle).z_at(p)))
            .unwrap_or(point.z);
        Some((true, p.extend(z)))
    }

    fn edge_buffer_radius(&self) -> f64 {
        self.settings.edge_buffer_radius
    }
}
