use gvd_core::{DistanceField, Image, OccupancyGrid};
use gvd_morph::open_binary_u8;
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Radius of the square opening applied to the obstacle mask before the
    /// transform. `0` disables the pre-filter.
    pub morph_radius: usize,
    pub parallel: bool,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            morph_radius: 0,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DistanceFieldBuilder {
    cfg: FieldConfig,
}

impl DistanceFieldBuilder {
    pub fn new(cfg: FieldConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.cfg
    }

    pub fn build(&self, grid: &OccupancyGrid) -> DistanceField {
        build_distance_field(grid, &self.cfg)
    }
}

/// Distance from every cell to the nearest occupied cell, in world units.
///
/// Occupied cells are `0`. When the grid holds no obstacle at all every cell
/// is `f32::INFINITY`. An invalid grid yields an empty 0x0 field.
pub fn build_distance_field(grid: &OccupancyGrid, cfg: &FieldConfig) -> DistanceField {
    if let Err(err) = grid.validate() {
        warn!("distance field: rejecting grid: {err}");
        return Image::empty();
    }

    let mut mask = grid.occupied_mask();
    if cfg.morph_radius > 0 {
        mask = open_binary_u8(&mask.as_view(), cfg.morph_radius);
    }

    let (w, h) = (grid.width, grid.height);
    let sq = squared_edt(mask.data(), w, h, cfg.parallel);
    let res = grid.resolution;
    let data: Vec<f32> = sq
        .into_iter()
        .map(|d2| {
            if d2.is_finite() {
                (d2.sqrt() * res) as f32
            } else {
                f32::INFINITY
            }
        })
        .collect();

    debug!(
        "distance field: {w}x{h}, morph_radius={}, parallel={}",
        cfg.morph_radius, cfg.parallel
    );

    Image::from_vec(w, h, data).unwrap_or_else(|_| Image::empty())
}

/// Squared distance in pixels to the nearest non-zero mask cell.
fn squared_edt(mask: &[u8], w: usize, h: usize, parallel: bool) -> Vec<f64> {
    let columns: Vec<Vec<f64>> = if parallel {
        (0..w)
            .into_par_iter()
            .map(|x| column_pass(mask, w, h, x))
            .collect()
    } else {
        (0..w).map(|x| column_pass(mask, w, h, x)).collect()
    };

    let mut out = vec![0.0f64; w * h];
    if parallel {
        out.par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| row_pass(&columns, y, row));
    } else {
        out.chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| row_pass(&columns, y, row));
    }

    out
}

fn column_pass(mask: &[u8], w: usize, h: usize, x: usize) -> Vec<f64> {
    let f: Vec<f64> = (0..h)
        .map(|y| {
            if mask[y * w + x] != 0 {
                0.0
            } else {
                f64::INFINITY
            }
        })
        .collect();

    let mut out = vec![0.0; h];
    lower_envelope_1d(&f, &mut out);
    out
}

fn row_pass(columns: &[Vec<f64>], y: usize, row: &mut [f64]) {
    let f: Vec<f64> = columns.iter().map(|col| col[y]).collect();
    lower_envelope_1d(&f, row);
}

/// 1D squared distance transform of a sampled function:
/// `out[i] = min_q (i - q)^2 + f[q]` over finite `f[q]`.
fn lower_envelope_1d(f: &[f64], out: &mut [f64]) {
    let n = f.len();
    // Parabola apexes and the left boundary of the region each one wins.
    let mut v: Vec<usize> = Vec::with_capacity(n);
    let mut z: Vec<f64> = Vec::with_capacity(n);

    for (q, &fq) in f.iter().enumerate() {
        if !fq.is_finite() {
            continue;
        }

        let hq = fq + (q * q) as f64;
        let mut s = f64::NEG_INFINITY;
        while let Some(&p) = v.last() {
            let hp = f[p] + (p * p) as f64;
            s = (hq - hp) / (2.0 * (q - p) as f64);
            let zk = z.last().copied().unwrap_or(f64::NEG_INFINITY);
            if s <= zk {
                v.pop();
                z.pop();
                s = f64::NEG_INFINITY;
            } else {
                break;
            }
        }

        v.push(q);
        z.push(s);
    }

    if v.is_empty() {
        out.fill(f64::INFINITY);
        return;
    }

    let mut k = 0;
    for (i, o) in out.iter_mut().enumerate() {
        while k + 1 < v.len() && z[k + 1] < i as f64 {
            k += 1;
        }
        let d = i as f64 - v[k] as f64;
        *o = d * d + f[v[k]];
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use gvd_core::{Cell, OccupancyGrid};

    use super::{FieldConfig, build_distance_field, lower_envelope_1d};

    fn free_grid(w: usize, h: usize, res: f64) -> OccupancyGrid {
        let mut g = OccupancyGrid::new(w, h, res);
        g.fill(Cell::Free);
        g
    }

    fn brute_force(grid: &OccupancyGrid) -> Vec<f32> {
        let mut obstacles = Vec::new();
        for y in 0..grid.height {
            for x in 0..grid.width {
                if grid.cell(x, y) == Some(Cell::Occupied) {
                    obstacles.push((x as f64, y as f64));
                }
            }
        }

        let mut out = Vec::with_capacity(grid.width * grid.height);
        for y in 0..grid.height {
            for x in 0..grid.width {
                let best = obstacles
                    .iter()
                    .map(|&(ox, oy)| (ox - x as f64).hypot(oy - y as f64))
                    .fold(f64::INFINITY, f64::min);
                out.push((best * grid.resolution) as f32);
            }
        }
        out
    }

    #[test]
    fn envelope_matches_definition() {
        let f = [f64::INFINITY, 4.0, f64::INFINITY, f64::INFINITY, 0.0, 9.0];
        let mut out = [0.0; 6];
        lower_envelope_1d(&f, &mut out);

        for (i, &o) in out.iter().enumerate() {
            let expected = f
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_finite())
                .map(|(q, v)| (i as f64 - q as f64).powi(2) + v)
                .fold(f64::INFINITY, f64::min);
            assert_relative_eq!(o, expected);
        }
    }

    #[test]
    fn envelope_without_sites_is_infinite() {
        let f = [f64::INFINITY; 4];
        let mut out = [0.0; 4];
        lower_envelope_1d(&f, &mut out);
        assert!(out.iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn exact_against_brute_force() {
        let mut grid = free_grid(23, 17, 0.1);
        for &(x, y) in &[(3, 4), (15, 2), (20, 14), (8, 12), (9, 12), (0, 16)] {
            grid.set(x, y, Cell::Occupied);
        }

        let expected = brute_force(&grid);
        for parallel in [false, true] {
            let cfg = FieldConfig {
                morph_radius: 0,
                parallel,
            };
            let field = build_distance_field(&grid, &cfg);
            assert_eq!(field.width(), 23);
            assert_eq!(field.height(), 17);
            for (got, want) in field.data().iter().zip(&expected) {
                assert_relative_eq!(*got, *want, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn unknown_cells_are_not_obstacles() {
        let mut grid = OccupancyGrid::new(5, 1, 1.0);
        grid.set(0, 0, Cell::Occupied);

        let field = build_distance_field(&grid, &FieldConfig::default());
        assert_eq!(field.data(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn no_obstacles_gives_infinite_field() {
        let grid = free_grid(4, 3, 0.05);
        let field = build_distance_field(&grid, &FieldConfig::default());
        assert!(field.data().iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn morphology_removes_speck_before_transform() {
        let mut grid = free_grid(9, 9, 1.0);
        grid.set(4, 4, Cell::Occupied);
        for x in 0..9 {
            grid.set(x, 0, Cell::Occupied);
            grid.set(x, 1, Cell::Occupied);
            grid.set(x, 2, Cell::Occupied);
        }

        let raw = build_distance_field(&grid, &FieldConfig::default());
        assert_eq!(raw.get(4, 4), Some(&0.0));

        let cfg = FieldConfig {
            morph_radius: 1,
            parallel: false,
        };
        let filtered = build_distance_field(&grid, &cfg);
        assert_relative_eq!(*filtered.get(4, 4).expect("in bounds"), 2.0);
    }

    #[test]
    fn invalid_grid_yields_empty_field() {
        let mut grid = free_grid(4, 4, 0.05);
        grid.cells.truncate(10);
        assert!(build_distance_field(&grid, &FieldConfig::default()).is_empty());

        let grid = free_grid(4, 4, -1.0);
        assert!(build_distance_field(&grid, &FieldConfig::default()).is_empty());
    }
}
