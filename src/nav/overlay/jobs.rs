use bevy::math::DVec2;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::{EdgeId, RegionEdgeDescription};
use crate::nav::geometry::Segment2;
use crate::nav::visibility::LandPolygon;

/// Shortest sub-interval worth turning into crossover points.
const MIN_JOB_SPAN: f64 = 1e-6;

/// Identity of one edge's job list: the edge, the versions of both regions
/// it joins, and the dilation radius.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeJobKey {
    pub edge: EdgeId,
    pub source_version: u64,
    pub destination_version: u64,
    pub dilation_bits: u64,
}

impl EdgeJobKey {
    pub fn new(edge: EdgeId, source_version: u64, destination_version: u64, dilation: f64) -> Self {
        Self { edge, source_version, destination_version, dilation_bits: dilation.to_bits() }
    }
}

/// One land-to-land piece of a portal: matching sub-segments of the source
/// and destination segments, each lying on a single land polygon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeJob {
    pub source_polygon: usize,
    pub destination_polygon: usize,
    pub source_segment: Segment2,
    pub destination_segment: Segment2,
}

/// Memoized edge jobs, shared across terrain snapshots so that only edges
/// touching a changed region are recomputed.
#[derive(Debug, Default)]
pub struct EdgeJobCache {
    jobs: FxHashMap<EdgeJobKey, Arc<[EdgeJob]>>,
    hits: u64,
    misses: u64,
}

impl EdgeJobCache {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Cached jobs for `key`, or the result of `emit`. Entries for the same
    /// edge and radius at older region versions are dropped on a miss.
    pub fn get_or_emit(&mut self, key: EdgeJobKey, emit: impl FnOnce() -> Vec<EdgeJob>) -> Arc<[EdgeJob]> {
        if let Some(jobs) = self.jobs.get(&key) {
            self.hits += 1;
            return jobs.clone();
        }
        self.misses += 1;
        self.jobs.retain(|k, _| k.edge != key.edge || k.dilation_bits != key.dilation_bits);
        let jobs: Arc<[EdgeJob]> = emit().into();
        self.jobs.insert(key, jobs.clone());
        jobs
    }
}

/// Split an edge into jobs, one per pair of source and destination polygons
/// whose land overlaps at the same parameters along both segments.
pub fn emit_edge_jobs(
    edge: &RegionEdgeDescription,
    source_polygons: &[Arc<LandPolygon>],
    destination_polygons: &[Arc<LandPolygon>],
) -> Vec<EdgeJob> {
    let source_intervals: Vec<Vec<(f64, f64)>> =
        source_polygons.iter().map(|p| p.land_intervals(&edge.source_segment)).collect();
    let destination_intervals: Vec<Vec<(f64, f64)>> =
        destination_polygons.iter().map(|p| p.land_intervals(&edge.destination_segment)).collect();

    let mut jobs = Vec::new();
    for (si, source) in source_intervals.iter().enumerate() {
        for (di, destination) in destination_intervals.iter().enumerate() {
            for &(s0, s1) in source {
                for &(d0, d1) in destination {
                    let (t0, t1) = (s0.max(d0), s1.min(d1));
                    if t1 - t0 <= MIN_JOB_SPAN {
                        continue;
                    }
                    jobs.push(EdgeJob {
                        source_polygon: si,
                        destination_polygon: di,
                        source_segment: sub_segment(&edge.source_segment, t0, t1),
                        destination_segment: sub_segment(&edge.destination_segment, t0, t1),
                    });
                }
            }
        }
    }
    jobs
}

fn sub_segment(segment: &Segment2, t0: f64, t1: f64) -> Segment2 {
    Segment2::new(segment.point_at(t0), segment.point_at(t1))
}

/// Paired crossover samples along a job's two segments, at most `spacing`
/// apart on the longer one. Both sides use the same parameters.
pub fn crossover_samples(job: &EdgeJob, spacing: f64) -> (Vec<DVec2>, Vec<DVec2>) {
    let longest = job.source_segment.length().max(job.destination_segment.length());
    let count = if spacing > 0.0 { (longest / spacing).ceil() as usize + 1 } else { 2 };
    let parameters: Vec<f64> = if count <= 1 {
        vec![0.0]
    } else {
        (0..count).map(|k| k as f64 / (count - 1) as f64).collect()
    };
    (
        parameters.iter().map(|&t| job.source_segment.point_at(t)).collect(),
        parameters.iter().map(|&t| job.destination_segment.point_at(t)).collect(),
    )
}
