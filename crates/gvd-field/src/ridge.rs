use gvd_core::{DistanceField, Image, SkeletonMask};
use log::debug;
use rayon::prelude::*;

/// Tolerance, in field units, when comparing a cell against its neighbors.
///
/// Equal-valued plateaus (even-width corridors) stay marked instead of
/// breaking up on rounding noise. Fixed; does not scale with resolution.
pub const RIDGE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct RidgeExtractor {
    parallel: bool,
}

impl Default for RidgeExtractor {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl RidgeExtractor {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    pub fn extract(&self, field: &DistanceField) -> SkeletonMask {
        extract_ridges(field, self.parallel)
    }
}

/// Marks (`255`) every interior cell that is a local maximum of `field`.
///
/// A cell qualifies when its value is finite, exceeds [`RIDGE_EPSILON`], and
/// no 8-neighbor exceeds it by more than [`RIDGE_EPSILON`]. The outermost ring
/// is never marked. Each output cell depends only on its own 3x3 window.
pub fn extract_ridges(field: &DistanceField, parallel: bool) -> SkeletonMask {
    let (w, h) = (field.width(), field.height());
    let mut out = Image::new_fill(w, h, 0u8);
    if w < 3 || h < 3 {
        return out;
    }

    let src = field.data();
    if parallel {
        out.data_mut()
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| mark_row(src, w, h, y, row));
    } else {
        out.data_mut()
            .chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| mark_row(src, w, h, y, row));
    }

    debug!(
        "ridges: {} of {} cells marked",
        out.data().iter().filter(|&&v| v != 0).count(),
        w * h
    );

    out
}

fn mark_row(src: &[f32], w: usize, h: usize, y: usize, row: &mut [u8]) {
    if y == 0 || y + 1 >= h {
        return;
    }

    for x in 1..w - 1 {
        if is_local_max(src, w, x, y) {
            row[x] = 255;
        }
    }
}

#[inline]
fn is_local_max(src: &[f32], w: usize, x: usize, y: usize) -> bool {
    let c = src[y * w + x];
    if !c.is_finite() || c <= RIDGE_EPSILON {
        return false;
    }

    for ny in y - 1..=y + 1 {
        let row = &src[ny * w..(ny + 1) * w];
        for nx in x - 1..=x + 1 {
            if (nx, ny) != (x, y) && row[nx] > c + RIDGE_EPSILON {
                return false;
            }
        }
    }

    true
}
