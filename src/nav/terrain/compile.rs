use bevy::math::{DVec2, DVec3};
use fixedbitset::FixedBitSet;
use std::collections::VecDeque;

use crate::nav::geometry::Bounds2;
use crate::nav::triangulation::{Triangle, TriangulationIsland};

const LINE_MERGE_EPSILON: f64 = 1e-9;

/// Triangulate the land of one rectangular region.
///
/// Holes are grown by `dilation` on every side and clipped to the region.
/// The region border itself stays where it is so portals on it remain
/// reachable. Land is cut along every hole edge into a grid whose cells are
/// at most `max_cell_size` wide, each land cell becomes two triangles, and
/// 4-connected land cells are grouped into islands.
pub fn compile_islands(bounds: Bounds2, holes: &[Bounds2], dilation: f64, max_cell_size: f64) -> Vec<TriangulationIsland> {
    let dilated: Vec<Bounds2> = holes
        .iter()
        .map(|h| h.expanded(dilation).intersection(&bounds))
        .filter(|h| h.size().x > LINE_MERGE_EPSILON && h.size().y > LINE_MERGE_EPSILON)
        .collect();

    let xs = grid_lines(bounds.min.x, bounds.max.x, dilated.iter().flat_map(|h| [h.min.x, h.max.x]), max_cell_size);
    let ys = grid_lines(bounds.min.y, bounds.max.y, dilated.iter().flat_map(|h| [h.min.y, h.max.y]), max_cell_size);
    if xs.len() < 2 || ys.len() < 2 {
        return Vec::new();
    }
    let grid = CellGrid { xs, ys };

    let cell_count = grid.width() * grid.height();
    let mut land = FixedBitSet::with_capacity(cell_count);
    for cell in 0..cell_count {
        let center = grid.cell_bounds(cell).center();
        if !dilated.iter().any(|h| h.contains_strictly(center)) {
            land.insert(cell);
        }
    }

    let mut visited = FixedBitSet::with_capacity(cell_count);
    let mut islands = Vec::new();
    for start in land.ones() {
        if visited.contains(start) {
            continue;
        }
        let cells = flood_fill(&grid, &land, &mut visited, start);
        islands.push(triangulate_cells(&grid, &cells));
    }
    islands
}

/// Sorted, de-duplicated cut lines across `[min, max]`, subdivided so no
/// gap exceeds `max_step`.
fn grid_lines(min: f64, max: f64, cuts: impl Iterator<Item = f64>, max_step: f64) -> Vec<f64> {
    if max - min <= LINE_MERGE_EPSILON {
        return Vec::new();
    }
    let mut lines = vec![min, max];
    lines.extend(cuts.filter(|&c| c > min && c < max));
    lines.sort_by(f64::total_cmp);
    lines.dedup_by(|a, b| (*a - *b).abs() <= LINE_MERGE_EPSILON);

    let step = if max_step > 0.0 { max_step } else { f64::INFINITY };
    let mut out = Vec::with_capacity(lines.len());
    for pair in lines.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let pieces = ((b - a) / step).ceil().max(1.0) as usize;
        for k in 0..pieces {
            out.push(a + (b - a) * k as f64 / pieces as f64);
        }
    }
    out.push(max);
    out
}

struct CellGrid {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl CellGrid {
    fn width(&self) -> usize {
        self.xs.len() - 1
    }

    fn height(&self) -> usize {
        self.ys.len() - 1
    }

    fn coords(&self, cell: usize) -> (usize, usize) {
        (cell % self.width(), cell / self.width())
    }

    fn cell_bounds(&self, cell: usize) -> Bounds2 {
        let (i, j) = self.coords(cell);
        Bounds2::new(DVec2::new(self.xs[i], self.ys[j]), DVec2::new(self.xs[i + 1], self.ys[j + 1]))
    }

    /// Right, up, left, down.
    fn neighbors(&self, cell: usize) -> [Option<usize>; 4] {
        let (i, j) = self.coords(cell);
        let w = self.width();
        [
            (i + 1 < w).then(|| cell + 1),
            (j + 1 < self.height()).then(|| cell + w),
            (i > 0).then(|| cell - 1),
            (j > 0).then(|| cell - w),
        ]
    }
}

fn flood_fill(grid: &CellGrid, land: &FixedBitSet, visited: &mut FixedBitSet, start: usize) -> Vec<usize> {
    let mut cells = Vec::new();
    let mut queue = VecDeque::from([start]);
    visited.insert(start);
    while let Some(cell) = queue.pop_front() {
        cells.push(cell);
        for next in grid.neighbors(cell).into_iter().flatten() {
            if land.contains(next) && !visited.contains(next) {
                visited.insert(next);
                queue.push_back(next);
            }
        }
    }
    cells.sort_unstable();
    cells
}

/// Two triangles per cell:
/// `lower = [p00, p10, p11]` and `upper = [p00, p11, p01]`.
///
/// Across the shared diagonal they neighbor each other. A lower triangle's
/// right and bottom edges meet the upper triangles of the cells to the right
/// and below; an upper triangle's top and left edges meet the lower
/// triangles of the cells above and to the left.
fn triangulate_cells(grid: &CellGrid, cells: &[usize]) -> TriangulationIsland {
    let slot = |cell: usize| cells.binary_search(&cell).ok();
    let mut triangles = Vec::with_capacity(cells.len() * 2);

    for (k, &cell) in cells.iter().enumerate() {
        let b = grid.cell_bounds(cell);
        let p00 = DVec3::new(b.min.x, b.min.y, 0.0);
        let p10 = DVec3::new(b.max.x, b.min.y, 0.0);
        let p11 = DVec3::new(b.max.x, b.max.y, 0.0);
        let p01 = DVec3::new(b.min.x, b.max.y, 0.0);

        let [right, up, left, down] = grid.neighbors(cell).map(|n| n.and_then(slot));
        let lower = 2 * k;
        let upper = 2 * k + 1;

        triangles.push(Triangle::new([p00, p10, p11], [right.map(|s| 2 * s + 1), Some(upper), down.map(|s| 2 * s + 1)]));
        triangles.push(Triangle::new([p00, p11, p01], [up.map(|s| 2 * s), left.map(|s| 2 * s), Some(lower)]));
    }
    TriangulationIsland::new(triangles)
}
